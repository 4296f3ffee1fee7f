//! Lazily constructed, memoized service clients for one collection run.
//!
//! Many tasks touch the same service; constructing a client per call site
//! wastes connection pools, so exactly one client per service is built and
//! handed out as cheap clones. The single mutex covers the whole
//! check-then-insert so concurrent first use cannot construct duplicates.

use aws_types::SdkConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct Clients {
    ec2: Option<aws_sdk_ec2::Client>,
    elb: Option<aws_sdk_elasticloadbalancing::Client>,
    elbv2: Option<aws_sdk_elasticloadbalancingv2::Client>,
    autoscaling: Option<aws_sdk_autoscaling::Client>,
    rds: Option<aws_sdk_rds::Client>,
    lambda: Option<aws_sdk_lambda::Client>,
    kms: Option<aws_sdk_kms::Client>,
    inspector: Option<aws_sdk_inspector::Client>,
    dynamodb: Option<aws_sdk_dynamodb::Client>,
    ecs: Option<aws_sdk_ecs::Client>,
    ecr: Option<aws_sdk_ecr::Client>,
    apigateway: Option<aws_sdk_apigateway::Client>,
    apigatewayv2: Option<aws_sdk_apigatewayv2::Client>,
    wafv2: Option<aws_sdk_wafv2::Client>,
    guardduty: Option<aws_sdk_guardduty::Client>,
    ssm: Option<aws_sdk_ssm::Client>,
}

pub struct ClientCache {
    config: SdkConfig,
    clients: Mutex<Clients>,
    constructed: AtomicUsize,
}

impl ClientCache {
    pub fn new(config: SdkConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(Clients::default()),
            constructed: AtomicUsize::new(0),
        }
    }

    /// Number of distinct clients constructed so far.
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::Relaxed)
    }

    fn get<T: Clone>(
        &self,
        service: &'static str,
        slot: impl FnOnce(&mut Clients) -> &mut Option<T>,
        construct: impl FnOnce(&SdkConfig) -> T,
    ) -> T {
        let mut clients = match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match slot(&mut clients) {
            Some(client) => client.clone(),
            slot => {
                debug!(service, "constructing client");
                let client = construct(&self.config);
                self.constructed.fetch_add(1, Ordering::Relaxed);
                *slot = Some(client.clone());
                client
            }
        }
    }

    pub fn ec2(&self) -> aws_sdk_ec2::Client {
        self.get("ec2", |c| &mut c.ec2, aws_sdk_ec2::Client::new)
    }

    pub fn elb(&self) -> aws_sdk_elasticloadbalancing::Client {
        self.get("elb", |c| &mut c.elb, aws_sdk_elasticloadbalancing::Client::new)
    }

    pub fn elbv2(&self) -> aws_sdk_elasticloadbalancingv2::Client {
        self.get(
            "elbv2",
            |c| &mut c.elbv2,
            aws_sdk_elasticloadbalancingv2::Client::new,
        )
    }

    pub fn autoscaling(&self) -> aws_sdk_autoscaling::Client {
        self.get(
            "autoscaling",
            |c| &mut c.autoscaling,
            aws_sdk_autoscaling::Client::new,
        )
    }

    pub fn rds(&self) -> aws_sdk_rds::Client {
        self.get("rds", |c| &mut c.rds, aws_sdk_rds::Client::new)
    }

    pub fn lambda(&self) -> aws_sdk_lambda::Client {
        self.get("lambda", |c| &mut c.lambda, aws_sdk_lambda::Client::new)
    }

    pub fn kms(&self) -> aws_sdk_kms::Client {
        self.get("kms", |c| &mut c.kms, aws_sdk_kms::Client::new)
    }

    pub fn inspector(&self) -> aws_sdk_inspector::Client {
        self.get("inspector", |c| &mut c.inspector, aws_sdk_inspector::Client::new)
    }

    pub fn dynamodb(&self) -> aws_sdk_dynamodb::Client {
        self.get("dynamodb", |c| &mut c.dynamodb, aws_sdk_dynamodb::Client::new)
    }

    pub fn ecs(&self) -> aws_sdk_ecs::Client {
        self.get("ecs", |c| &mut c.ecs, aws_sdk_ecs::Client::new)
    }

    pub fn ecr(&self) -> aws_sdk_ecr::Client {
        self.get("ecr", |c| &mut c.ecr, aws_sdk_ecr::Client::new)
    }

    pub fn apigateway(&self) -> aws_sdk_apigateway::Client {
        self.get(
            "apigateway",
            |c| &mut c.apigateway,
            aws_sdk_apigateway::Client::new,
        )
    }

    pub fn apigatewayv2(&self) -> aws_sdk_apigatewayv2::Client {
        self.get(
            "apigatewayv2",
            |c| &mut c.apigatewayv2,
            aws_sdk_apigatewayv2::Client::new,
        )
    }

    pub fn wafv2(&self) -> aws_sdk_wafv2::Client {
        self.get("wafv2", |c| &mut c.wafv2, aws_sdk_wafv2::Client::new)
    }

    pub fn guardduty(&self) -> aws_sdk_guardduty::Client {
        self.get("guardduty", |c| &mut c.guardduty, aws_sdk_guardduty::Client::new)
    }

    pub fn ssm(&self) -> aws_sdk_ssm::Client {
        self.get("ssm", |c| &mut c.ssm, aws_sdk_ssm::Client::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_config::BehaviorVersion;
    use aws_types::region::Region;
    use std::sync::Arc;

    fn test_config() -> SdkConfig {
        SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_constructs_one_client() {
        let cache = Arc::new(ClientCache::new(test_config()));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.ec2() }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.constructed(), 1);
    }

    #[tokio::test]
    async fn distinct_services_get_distinct_clients() {
        let cache = ClientCache::new(test_config());
        cache.ec2();
        cache.ec2();
        cache.rds();
        cache.wafv2();
        assert_eq!(cache.constructed(), 3);
    }
}
