//! End-to-end checks of the task pipeline with synthetic tasks: bounded
//! execution, failure isolation, path-addressed merging, and the phase-1
//! to phase-2 handoff that feeds ECS image digests into the ECR lookup.

use anyhow::anyhow;
use awsinventory::collector::results::{self, TaskPath};
use awsinventory::collector::scheduler::{execute_tasks, CollectionTask};
use awsinventory::collector::sdk_errors::ErrorCategory;
use awsinventory::collector::services::ecr::{referenced_images, ImageRef};
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn as_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[tokio::test]
async fn failed_tasks_are_reported_and_the_rest_of_the_region_survives() {
    init_tracing();
    let tasks = vec![
        CollectionTask::new("instances", &["ec2"], async {
            Ok((
                &["instance", "Reservations"] as TaskPath,
                json!([{"ReservationId": "r-1"}]),
            ))
        }),
        CollectionTask::new("throttled", &["rds"], async {
            Err(anyhow!("ThrottlingException: Rate exceeded"))
        }),
        CollectionTask::new("web_acls", &[], async {
            Ok((&["wafv2", "WebACLs"] as TaskPath, json!([])))
        }),
        CollectionTask::new("ip_sets", &[], async {
            Ok((&["wafv2", "IPSets"] as TaskPath, json!([])))
        }),
    ];

    let report = execute_tasks(tasks, Some(2)).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].task, "throttled");
    assert_eq!(report.failures[0].category, ErrorCategory::Throttled);
    assert_eq!(
        Value::Object(report.data),
        json!({
            "instance": {"Reservations": [{"ReservationId": "r-1"}]},
            "wafv2": {"WebACLs": [], "IPSets": []},
        })
    );
}

#[tokio::test]
async fn phase_one_ecs_output_selects_the_images_phase_two_looks_up() {
    init_tracing();
    let tasks = vec![CollectionTask::new("clusters", &["ecs"], async {
        Ok((
            &["ecs"] as TaskPath,
            json!([{
                "clusterName": "main",
                "tasks": [{
                    "containers": [
                        {
                            "image": "123456789012.dkr.ecr.eu-west-1.amazonaws.com/app:v3",
                            "imageDigest": "sha256:aaa",
                        },
                        {
                            // Docker Hub default namespace, never in ECR.
                            "image": "redis",
                            "imageDigest": "sha256:bbb",
                        },
                        {
                            // No recorded digest, nothing to match on.
                            "image": "123456789012.dkr.ecr.eu-west-1.amazonaws.com/web",
                        },
                    ],
                }],
            }]),
        ))
    })];

    let report = execute_tasks(tasks, None).await.unwrap();
    let images = referenced_images(&report.data);

    assert_eq!(
        images,
        vec![ImageRef {
            digest: "sha256:aaa".to_string(),
            tag: "v3".to_string(),
        }]
    );
}

#[tokio::test]
async fn phase_results_merge_into_one_region_document() {
    init_tracing();
    let phase1 = vec![
        CollectionTask::new("tables", &["dynamodb"], async {
            Ok((
                &["dynamodb", "Tables"] as TaskPath,
                json!([{"TableName": "orders"}]),
            ))
        }),
        CollectionTask::new("clusters", &["ecs"], async {
            Ok((&["ecs"] as TaskPath, json!([])))
        }),
    ];
    let phase2 = vec![CollectionTask::new("repositories", &["ecr"], async {
        Ok((&["ecr"] as TaskPath, json!([{"repositoryName": "app"}])))
    })];

    let mut report = execute_tasks(phase1, None).await.unwrap();
    let second = execute_tasks(phase2, None).await.unwrap();
    results::merge(&mut report.data, second.data);

    let mut region_data = as_map(json!({"region_name": "eu-west-1"}));
    results::merge(&mut region_data, report.data);

    assert_eq!(
        Value::Object(region_data),
        json!({
            "region_name": "eu-west-1",
            "dynamodb": {"Tables": [{"TableName": "orders"}]},
            "ecs": [],
            "ecr": [{"repositoryName": "app"}],
        })
    );
}
