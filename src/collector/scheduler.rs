//! Bounded-concurrency execution of collection tasks.
//!
//! All tasks of one phase run against a shared semaphore capping how many
//! are in flight at once; results are drained from a single
//! `FuturesUnordered`, so the result map is only ever touched from the
//! drain loop. A failing task is recorded and skipped; it cannot cancel or
//! corrupt its siblings. Only the executor itself failing (a closed
//! semaphore) aborts the phase.

use crate::collector::results::{self, TaskPath};
use crate::collector::sdk_errors::ErrorCategory;
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

/// What a task hands back on success: where the value belongs, and the value.
pub type TaskOutput = (TaskPath, Value);

/// One independent unit of collection work. The future captures every
/// client it needs; the required-service list exists so the registry can
/// filter by regional capability before anything is scheduled.
pub struct CollectionTask {
    name: &'static str,
    required_services: &'static [&'static str],
    future: BoxFuture<'static, Result<TaskOutput>>,
}

impl CollectionTask {
    pub fn new<F>(
        name: &'static str,
        required_services: &'static [&'static str],
        future: F,
    ) -> Self
    where
        F: Future<Output = Result<TaskOutput>> + Send + 'static,
    {
        Self {
            name,
            required_services,
            future: future.boxed(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn required_services(&self) -> &'static [&'static str] {
        self.required_services
    }
}

/// A task that failed, with enough context to report it.
pub struct TaskFailure {
    pub task: &'static str,
    pub category: ErrorCategory,
    pub error: anyhow::Error,
}

/// Outcome of one phase: everything that succeeded, merged by path, plus
/// every failure. The policy for failures belongs to the caller; this layer
/// only guarantees isolation.
pub struct ExecutionReport {
    pub data: Map<String, Value>,
    pub failures: Vec<TaskFailure>,
}

enum Completion {
    Finished {
        name: &'static str,
        result: Result<TaskOutput>,
    },
    ExecutorClosed,
}

/// Runs all tasks with at most `max_workers` in flight (default: available
/// parallelism). Returns an error only if the executor itself cannot run.
pub async fn execute_tasks(
    tasks: Vec<CollectionTask>,
    max_workers: Option<usize>,
) -> Result<ExecutionReport> {
    let workers = max_workers
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(4)
        .max(1);
    info!(tasks = tasks.len(), workers, "executing collection tasks");

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut in_flight: FuturesUnordered<_> = tasks
        .into_iter()
        .map(|task| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Completion::ExecutorClosed;
                };
                debug!(task = task.name, "task started");
                let started = Instant::now();
                let result = task.future.await;
                debug!(task = task.name, elapsed_ms = started.elapsed().as_millis() as u64, "task finished");
                Completion::Finished {
                    name: task.name,
                    result,
                }
            }
        })
        .collect();

    let mut data = Map::new();
    let mut failures = Vec::new();
    while let Some(completion) = in_flight.next().await {
        match completion {
            Completion::Finished {
                result: Ok((path, value)),
                ..
            } => results::insert_path(&mut data, path, value),
            Completion::Finished {
                name,
                result: Err(err),
            } => {
                let category = ErrorCategory::from_error(&err);
                error!(task = name, category = category.label(), "task failed: {err:#}");
                failures.push(TaskFailure {
                    task: name,
                    category,
                    error: err,
                });
            }
            Completion::ExecutorClosed => {
                return Err(anyhow!("task executor semaphore closed before completion"));
            }
        }
    }

    Ok(ExecutionReport { data, failures })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn one_failure_does_not_affect_siblings() {
        let tasks = vec![
            CollectionTask::new("vpcs", &["ec2"], async {
                Ok((&["vpc", "Vpcs"] as TaskPath, json!([{"VpcId": "vpc-1"}])))
            }),
            CollectionTask::new("broken", &["rds"], async {
                Err(anyhow!("AccessDeniedException: nope"))
            }),
            CollectionTask::new("subnets", &["ec2"], async {
                Ok((&["subnet", "Subnets"] as TaskPath, json!([])))
            }),
        ];

        let report = execute_tasks(tasks, Some(2)).await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].task, "broken");
        assert_eq!(
            Value::Object(report.data),
            json!({
                "vpc": {"Vpcs": [{"VpcId": "vpc-1"}]},
                "subnet": {"Subnets": []},
            })
        );
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_max_workers() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static RUNNING: AtomicUsize = AtomicUsize::new(0);
        static PEAK: AtomicUsize = AtomicUsize::new(0);

        let tasks: Vec<CollectionTask> = ["a", "b", "c", "d", "e", "f"]
            .into_iter()
            .map(|name| {
                CollectionTask::new(name, &[], async {
                    let now = RUNNING.fetch_add(1, Ordering::SeqCst) + 1;
                    PEAK.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    RUNNING.fetch_sub(1, Ordering::SeqCst);
                    Ok((&["x"] as TaskPath, Value::Null))
                })
            })
            .collect();

        execute_tasks(tasks, Some(2)).await.unwrap();
        assert!(PEAK.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn empty_task_list_yields_empty_report() {
        let report = execute_tasks(Vec::new(), None).await.unwrap();
        assert!(report.data.is_empty());
        assert!(report.failures.is_empty());
    }
}
