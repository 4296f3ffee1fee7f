//! GuardDuty findings across all detectors in the region.
//!
//! Opt-in family: GetFindings charges per call at volume, so the registry
//! only schedules this task when the caller asked for it. Finding ids are
//! hydrated in batches of 50, the GetFindings maximum.

use crate::collector::pagers::{batch, paginate, Page};
use crate::collector::scheduler::TaskOutput;
use anyhow::{Context, Result};
use aws_sdk_guardduty as guardduty;
use serde_json::{json, Value};
use tracing::debug;

const GET_FINDINGS_BATCH: usize = 50;

pub async fn get_findings(client: guardduty::Client) -> Result<TaskOutput> {
    debug!("executing guardduty list-detectors, list-findings, get-findings");
    let detector_ids = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .list_detectors()
                .set_next_token(token)
                .send()
                .await
                .context("guardduty list-detectors failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.detector_ids.unwrap_or_default(),
                resp.next_token,
            ))
        }
    })
    .await?;

    let mut findings = Vec::new();
    for detector_id in &detector_ids {
        let finding_ids = detector_finding_ids(&client, detector_id).await?;
        let detector_findings = batch(&finding_ids, GET_FINDINGS_BATCH, |chunk| {
            let client = client.clone();
            let detector_id = detector_id.clone();
            async move {
                let resp = client
                    .get_findings()
                    .detector_id(detector_id)
                    .set_finding_ids(Some(chunk))
                    .send()
                    .await
                    .context("guardduty get-findings failed")?;
                Ok::<_, anyhow::Error>(
                    resp.findings
                        .unwrap_or_default()
                        .iter()
                        .map(finding_to_json)
                        .collect(),
                )
            }
        })
        .await?;
        findings.extend(detector_findings);
    }
    Ok((&["guardduty", "Findings"], Value::Array(findings)))
}

async fn detector_finding_ids(
    client: &guardduty::Client,
    detector_id: &str,
) -> Result<Vec<String>> {
    paginate(|token| {
        let client = client.clone();
        let detector_id = detector_id.to_string();
        async move {
            let resp = client
                .list_findings()
                .detector_id(detector_id)
                .set_next_token(token)
                .send()
                .await
                .context("guardduty list-findings failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.finding_ids.unwrap_or_default(),
                resp.next_token,
            ))
        }
    })
    .await
}

fn finding_to_json(finding: &guardduty::types::Finding) -> Value {
    json!({
        "AccountId": finding.account_id.clone(),
        "Arn": finding.arn.clone(),
        "Id": finding.id.clone(),
        "Region": finding.region.clone(),
        "Type": finding.r#type.clone(),
        "Severity": finding.severity,
        "Confidence": finding.confidence,
        "Title": finding.title.clone(),
        "Description": finding.description.clone(),
        "CreatedAt": finding.created_at.clone(),
        "UpdatedAt": finding.updated_at.clone(),
        "SchemaVersion": finding.schema_version.clone(),
        "Resource": finding.resource.as_ref().map(resource_to_json),
    })
}

fn resource_to_json(resource: &guardduty::types::Resource) -> Value {
    json!({
        "ResourceType": resource.resource_type.clone(),
        "InstanceDetails": {
            "InstanceId": resource
                .instance_details
                .as_ref()
                .and_then(|d| d.instance_id.clone()),
            "InstanceType": resource
                .instance_details
                .as_ref()
                .and_then(|d| d.instance_type.clone()),
        },
        "AccessKeyDetails": {
            "AccessKeyId": resource
                .access_key_details
                .as_ref()
                .and_then(|d| d.access_key_id.clone()),
            "UserName": resource
                .access_key_details
                .as_ref()
                .and_then(|d| d.user_name.clone()),
        },
    })
}
