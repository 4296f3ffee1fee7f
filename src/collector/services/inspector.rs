//! Inspector Classic assessment findings.
//!
//! Opt-in family. The interesting snapshot is the most recently *completed*
//! assessment run that actually produced findings within the last year, not
//! merely the most recent run; a nightly template with an empty latest run
//! would otherwise hide real results from the run before it. Findings are
//! filtered to the CVE and Network Reachability rules packages and hydrated
//! in batches of 10, the DescribeFindings maximum.

use crate::collector::pagers::{batch, paginate, Page};
use crate::collector::scheduler::TaskOutput;
use anyhow::{Context, Result};
use aws_sdk_inspector as inspector;
use aws_smithy_types::DateTime;
use chrono::{Duration, Utc};
use inspector::types::{AssessmentRunFilter, FindingFilter, TimestampRange};
use serde_json::{json, Value};
use tracing::debug;

const DESCRIBE_BATCH: usize = 10;
const LOOKBACK_DAYS: i64 = 365;

pub async fn describe_findings(client: inspector::Client) -> Result<TaskOutput> {
    debug!(
        "executing inspector list-assessment-runs, describe-assessment-runs, \
         list-rules-packages, describe-rules-packages, list-findings, describe-findings"
    );

    let now = Utc::now();
    let begin = now - Duration::days(LOOKBACK_DAYS);
    let time_range = TimestampRange::builder()
        .begin_date(DateTime::from_secs(begin.timestamp()))
        .end_date(DateTime::from_secs(now.timestamp()))
        .build();

    let runs = assessment_runs(&client, time_range.clone()).await?;
    let Some(run_arn) = latest_run_with_findings(&runs) else {
        return Ok((&["inspector"], Value::Array(Vec::new())));
    };
    let package_arns = supported_rules_package_arns(&client).await?;
    if package_arns.is_empty() {
        return Ok((&["inspector"], Value::Array(Vec::new())));
    }

    let finding_arns = paginate(|token| {
        let client = client.clone();
        let run_arn = run_arn.clone();
        let package_arns = package_arns.clone();
        let time_range = time_range.clone();
        async move {
            let resp = client
                .list_findings()
                .assessment_run_arns(run_arn)
                .filter(
                    FindingFilter::builder()
                        .set_rules_package_arns(Some(package_arns))
                        .creation_time_range(time_range)
                        .build(),
                )
                .set_next_token(token)
                .send()
                .await
                .context("inspector list-findings failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.finding_arns.unwrap_or_default(),
                resp.next_token,
            ))
        }
    })
    .await?;

    let findings = batch(&finding_arns, DESCRIBE_BATCH, |chunk| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_findings()
                .set_finding_arns(Some(chunk))
                .send()
                .await
                .context("inspector describe-findings failed")?;
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

    Ok((&["inspector"], Value::Array(findings)))
}

/// All runs completed within the lookback window, as JSON summaries.
async fn assessment_runs(
    client: &inspector::Client,
    time_range: TimestampRange,
) -> Result<Vec<Value>> {
    let run_arns = paginate(|token| {
        let client = client.clone();
        let time_range = time_range.clone();
        async move {
            let resp = client
                .list_assessment_runs()
                .filter(
                    AssessmentRunFilter::builder()
                        .completion_time_range(time_range)
                        .build(),
                )
                .set_next_token(token)
                .send()
                .await
                .context("inspector list-assessment-runs failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.assessment_run_arns.unwrap_or_default(),
                resp.next_token,
            ))
        }
    })
    .await?;

    batch(&run_arns, DESCRIBE_BATCH, |chunk| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_assessment_runs()
                .set_assessment_run_arns(Some(chunk))
                .send()
                .await
                .context("inspector describe-assessment-runs failed")?;
            Ok::<_, anyhow::Error>(
                resp.assessment_runs
                    .unwrap_or_default()
                    .iter()
                    .map(assessment_run_to_json)
                    .collect(),
            )
        }
    })
    .await
}

/// Picks the arn of the newest completed run whose finding counts are not
/// all zero. Runs that never completed sort last.
pub(crate) fn latest_run_with_findings(runs: &[Value]) -> Option<String> {
    let mut sorted: Vec<&Value> = runs.iter().collect();
    sorted.sort_by_key(|run| {
        std::cmp::Reverse(run.get("completedAt").and_then(Value::as_i64).unwrap_or(i64::MIN))
    });
    for run in sorted {
        let total: i64 = run
            .get("findingCounts")
            .and_then(Value::as_object)
            .map(|counts| counts.values().filter_map(Value::as_i64).sum())
            .unwrap_or(0);
        if total > 0 {
            return run.get("arn").and_then(Value::as_str).map(str::to_string);
        }
    }
    None
}

/// The CVE and Network Reachability packages are the only ones downstream
/// modeling understands.
async fn supported_rules_package_arns(client: &inspector::Client) -> Result<Vec<String>> {
    let package_arns = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .list_rules_packages()
                .set_next_token(token)
                .send()
                .await
                .context("inspector list-rules-packages failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.rules_package_arns.unwrap_or_default(),
                resp.next_token,
            ))
        }
    })
    .await?;
    if package_arns.is_empty() {
        return Ok(Vec::new());
    }

    let packages = batch(&package_arns, DESCRIBE_BATCH, |chunk| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_rules_packages()
                .set_rules_package_arns(Some(chunk))
                .send()
                .await
                .context("inspector describe-rules-packages failed")?;
            Ok::<_, anyhow::Error>(resp.rules_packages.unwrap_or_default())
        }
    })
    .await?;

    Ok(packages
        .iter()
        .filter(|package| {
            package.name.contains("Common Vulnerabilities and Exposures")
                || package.name.contains("Network Reachability")
        })
        .map(|package| package.arn.clone())
        .collect())
}

fn assessment_run_to_json(run: &inspector::types::AssessmentRun) -> Value {
    let counts: serde_json::Map<String, Value> = run
        .finding_counts
        .iter()
        .map(|(severity, count)| (severity.as_str().to_string(), json!(count)))
        .collect();
    json!({
        "arn": run.arn.clone(),
        "name": run.name.clone(),
        "state": run.state.as_str(),
        "completedAt": run.completed_at.map(|t| t.secs()),
        "findingCounts": counts,
    })
}

fn finding_to_json(finding: &inspector::types::Finding) -> Value {
    json!({
        "arn": finding.arn.clone(),
        "id": finding.id.clone(),
        "title": finding.title.clone(),
        "description": finding.description.clone(),
        "recommendation": finding.recommendation.clone(),
        "severity": finding.severity.as_ref().map(|s| s.as_str()),
        "numericSeverity": finding.numeric_severity,
        "serviceAttributes": {
            "assessmentRunArn": finding
                .service_attributes
                .as_ref()
                .and_then(|a| a.assessment_run_arn.clone()),
            "rulesPackageArn": finding
                .service_attributes
                .as_ref()
                .and_then(|a| a.rules_package_arn.clone()),
        },
        "createdAt": finding.created_at.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(arn: &str, completed_at: Option<i64>, high: i64) -> Value {
        json!({
            "arn": arn,
            "completedAt": completed_at,
            "findingCounts": {"High": high, "Low": 0},
        })
    }

    #[test]
    fn newest_run_with_findings_wins_over_newer_empty_run() {
        let runs = vec![
            run("arn:empty-latest", Some(300), 0),
            run("arn:with-findings", Some(200), 4),
            run("arn:older", Some(100), 7),
        ];
        assert_eq!(
            latest_run_with_findings(&runs),
            Some("arn:with-findings".to_string())
        );
    }

    #[test]
    fn runs_without_completion_sort_last() {
        let runs = vec![run("arn:unfinished", None, 9), run("arn:done", Some(50), 1)];
        assert_eq!(latest_run_with_findings(&runs), Some("arn:done".to_string()));
    }

    #[test]
    fn all_empty_runs_yield_none() {
        let runs = vec![run("arn:a", Some(10), 0), run("arn:b", Some(20), 0)];
        assert_eq!(latest_run_with_findings(&runs), None);
    }

    #[test]
    fn no_runs_yield_none() {
        assert_eq!(latest_run_with_findings(&[]), None);
    }
}
