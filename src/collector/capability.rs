//! Region/service capability lookup.
//!
//! Not every AWS service exists in every region, and asking a region for a
//! service it does not host fails noisily. AWS publishes the authoritative
//! service-to-region mapping as public SSM parameters under
//! `/aws/service/global-infrastructure`, so support is resolved there once
//! per run, for exactly the services the task registry might schedule.

use crate::collector::clients::ClientCache;
use crate::collector::pagers::{paginate, Page};
use anyhow::Result;
use std::collections::HashSet;
use tracing::{info, warn};

/// The set of services the target region supports, for the services that
/// were probed.
pub struct RegionSupport {
    supported: HashSet<&'static str>,
}

impl RegionSupport {
    pub fn new(supported: HashSet<&'static str>) -> Self {
        Self { supported }
    }

    /// Everything probed counts as supported; used where capability
    /// filtering does not apply (the pinned CloudFront WAF run).
    pub fn assume_all(services: &[&'static str]) -> Self {
        Self {
            supported: services.iter().copied().collect(),
        }
    }

    pub fn supports(&self, service: &str) -> bool {
        self.supported.contains(service)
    }
}

/// Probes, per service, whether `region` appears in the service's published
/// region list. A failed probe is logged and counted as supported: dropping
/// a resource family on a capability lookup hiccup would silently lose
/// data, whereas a wrongly scheduled task surfaces as one reported failure.
pub async fn region_support(
    clients: &ClientCache,
    region: &str,
    services: &[&'static str],
) -> RegionSupport {
    let ssm = clients.ssm();
    let probes = services.iter().map(|service| {
        let ssm = ssm.clone();
        async move { (*service, service_regions(&ssm, service).await) }
    });

    let mut supported = HashSet::new();
    for (service, regions) in futures::future::join_all(probes).await {
        match regions {
            Ok(regions) if regions.iter().any(|r| r == region) => {
                supported.insert(service);
            }
            Ok(_) => {
                info!(region, service, "region does not support service");
            }
            Err(err) => {
                warn!(
                    region,
                    service,
                    "capability lookup failed, assuming supported: {err:#}"
                );
                supported.insert(service);
            }
        }
    }
    RegionSupport::new(supported)
}

/// The region names AWS advertises for one service.
async fn service_regions(ssm: &aws_sdk_ssm::Client, service: &str) -> Result<Vec<String>> {
    let path = format!("/aws/service/global-infrastructure/services/{service}/regions");
    paginate(|token| {
        let ssm = ssm.clone();
        let path = path.clone();
        async move {
            let resp = ssm
                .get_parameters_by_path()
                .path(path)
                .set_next_token(token)
                .send()
                .await?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.parameters
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|p| p.value)
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_only_probed_members() {
        let support = RegionSupport::new(["ec2", "rds"].into_iter().collect());
        assert!(support.supports("ec2"));
        assert!(support.supports("rds"));
        assert!(!support.supports("inspector"));
    }

    #[test]
    fn assume_all_accepts_everything_listed() {
        let support = RegionSupport::assume_all(&["wafv2"]);
        assert!(support.supports("wafv2"));
        assert!(!support.supports("ec2"));
    }
}
