//! The collection engine: sessions, clients, task scheduling, and the
//! per-service collectors.

pub mod capability;
pub mod clients;
pub mod pagers;
pub mod registry;
pub mod results;
pub mod scheduler;
pub mod sdk_errors;
pub mod services;
pub mod session;

pub use aws_credential_types::Credentials;

use anyhow::{anyhow, Context, Result};
use clients::ClientCache;
use registry::TaskFlags;
use scheduler::ExecutionReport;
use serde_json::{Map, Value};
use session::Session;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Collects the inventory of one region and merges it into `region_data`.
///
/// `region_data` must be a JSON object carrying a `"region_name"` string;
/// the collected service trees are inserted next to it. Individual task
/// failures are logged and summarized but do not fail the run; only a
/// broken input object or a broken executor returns an error.
pub async fn collect(
    credentials: Credentials,
    region_data: &mut Value,
    include_inspector: bool,
    include_guardduty: bool,
    threads: Option<usize>,
) -> Result<()> {
    let region = region_data
        .get("region_name")
        .and_then(Value::as_str)
        .context("region_data is missing the \"region_name\" string")?
        .to_string();
    info!(region, "collecting region data");

    let session = Session::new(credentials, &region).await;
    let clients = Arc::new(ClientCache::new(session.config().clone()));
    let flags = TaskFlags {
        include_inspector,
        include_guardduty,
    };

    let support =
        capability::region_support(&clients, session.region(), &registry::candidate_services(flags))
            .await;

    let phase1 = registry::build_phase1_tasks(&clients, &support, flags);
    let mut report = scheduler::execute_tasks(phase1, threads).await?;

    let phase2 = registry::build_phase2_tasks(&clients, &report.data);
    let phase2_report = scheduler::execute_tasks(phase2, threads).await?;
    fold_report(&mut report, phase2_report);

    summarize_failures(&region, &report);
    debug!(
        region,
        clients = clients.constructed(),
        "region collection finished"
    );

    let target = region_data
        .as_object_mut()
        .ok_or_else(|| anyhow!("region_data is not a JSON object"))?;
    results::merge(target, report.data);
    Ok(())
}

/// Collects the globally scoped CloudFront WAF v2 web ACLs and IP sets.
/// Those only exist behind the us-east-1 endpoint, regardless of which
/// regions the account otherwise uses.
pub async fn collect_cloudfront_waf(
    credentials: Credentials,
    threads: Option<usize>,
) -> Result<Value> {
    info!("collecting global CloudFront WAF data");
    let session = Session::new(credentials, "us-east-1").await;
    let clients = Arc::new(ClientCache::new(session.config().clone()));

    let tasks = registry::build_cloudfront_waf_tasks(&clients);
    let report = scheduler::execute_tasks(tasks, threads).await?;
    summarize_failures("us-east-1", &report);
    Ok(Value::Object(report.data))
}

fn fold_report(report: &mut ExecutionReport, other: ExecutionReport) {
    let ExecutionReport { data, failures } = other;
    results::merge(&mut report.data, data);
    report.failures.extend(failures);
}

fn summarize_failures(region: &str, report: &ExecutionReport) {
    if report.failures.is_empty() {
        return;
    }
    let mut counts: Map<String, Value> = Map::new();
    for failure in &report.failures {
        let entry = counts
            .entry(failure.category.label().to_string())
            .or_insert_with(|| Value::from(0));
        if let Some(n) = entry.as_i64() {
            *entry = Value::from(n + 1);
        }
    }
    warn!(
        region,
        failed = report.failures.len(),
        categories = %Value::Object(counts),
        "some collection tasks failed; their data is missing from the result"
    );
}
