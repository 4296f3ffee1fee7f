//! ECS cluster inventory.
//!
//! The deepest pipeline in the collector: clusters, then per cluster its
//! services (with their task arns), container instances (with theirs),
//! and tasks, each task hydrated with its task definition. Describe calls
//! accept bounded id lists, so the listings are replayed through the batch
//! helper: 100 ids per call except DescribeServices, which caps at 10.
//! Container image digests recorded here drive the ECR phase.

use crate::collector::pagers::{batch, paginate, Page};
use crate::collector::scheduler::TaskOutput;
use anyhow::{Context, Result};
use aws_sdk_ecs as ecs;
use ecs::types::{ClusterField, ContainerInstanceField, TaskDefinitionField, TaskField};
use serde_json::{json, Value};
use tracing::debug;

const DESCRIBE_BATCH: usize = 100;
const DESCRIBE_SERVICES_BATCH: usize = 10;

pub async fn describe_clusters(client: ecs::Client) -> Result<TaskOutput> {
    debug!("executing ecs cluster, service, container-instance and task pipeline");

    let cluster_arns = list_arns(&client, None, ListKind::Clusters).await?;
    let described = batch(&cluster_arns, DESCRIBE_BATCH, |chunk| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_clusters()
                .set_clusters(Some(chunk))
                .include(ClusterField::Attachments)
                .include(ClusterField::Settings)
                .include(ClusterField::Statistics)
                .include(ClusterField::Tags)
                .send()
                .await
                .context("ecs describe-clusters failed")?;
            Ok::<_, anyhow::Error>(resp.clusters.unwrap_or_default())
        }
    })
    .await?;

    let mut clusters = Vec::new();
    for cluster in &described {
        let mut value = cluster_to_json(cluster);
        if let (Some(arn), Some(obj)) = (cluster.cluster_arn.as_deref(), value.as_object_mut())
        {
            obj.insert(
                "services".to_string(),
                Value::Array(cluster_services(&client, arn).await?),
            );
            obj.insert(
                "containerInstances".to_string(),
                Value::Array(cluster_container_instances(&client, arn).await?),
            );
            obj.insert(
                "tasks".to_string(),
                Value::Array(cluster_tasks(&client, arn).await?),
            );
        }
        clusters.push(value);
    }
    Ok((&["ecs"], Value::Array(clusters)))
}

enum ListKind<'a> {
    Clusters,
    Services,
    ContainerInstances,
    Tasks {
        service_name: Option<&'a str>,
        container_instance: Option<&'a str>,
    },
}

async fn list_arns(
    client: &ecs::Client,
    cluster_arn: Option<&str>,
    kind: ListKind<'_>,
) -> Result<Vec<String>> {
    let kind = &kind;
    paginate(|token| {
        let client = client.clone();
        let cluster_arn = cluster_arn.map(str::to_string);
        async move {
            match kind {
                ListKind::Clusters => {
                    let resp = client
                        .list_clusters()
                        .set_next_token(token)
                        .send()
                        .await
                        .context("ecs list-clusters failed")?;
                    Ok::<_, anyhow::Error>(Page::new(
                        resp.cluster_arns.unwrap_or_default(),
                        resp.next_token,
                    ))
                }
                ListKind::Services => {
                    let resp = client
                        .list_services()
                        .set_cluster(cluster_arn)
                        .set_next_token(token)
                        .send()
                        .await
                        .context("ecs list-services failed")?;
                    Ok(Page::new(
                        resp.service_arns.unwrap_or_default(),
                        resp.next_token,
                    ))
                }
                ListKind::ContainerInstances => {
                    let resp = client
                        .list_container_instances()
                        .set_cluster(cluster_arn)
                        .set_next_token(token)
                        .send()
                        .await
                        .context("ecs list-container-instances failed")?;
                    Ok(Page::new(
                        resp.container_instance_arns.unwrap_or_default(),
                        resp.next_token,
                    ))
                }
                ListKind::Tasks {
                    service_name,
                    container_instance,
                } => {
                    let resp = client
                        .list_tasks()
                        .set_cluster(cluster_arn)
                        .set_service_name(service_name.map(str::to_string))
                        .set_container_instance(container_instance.map(str::to_string))
                        .set_next_token(token)
                        .send()
                        .await
                        .context("ecs list-tasks failed")?;
                    Ok(Page::new(
                        resp.task_arns.unwrap_or_default(),
                        resp.next_token,
                    ))
                }
            }
        }
    })
    .await
}

async fn cluster_services(client: &ecs::Client, cluster_arn: &str) -> Result<Vec<Value>> {
    let service_arns = list_arns(client, Some(cluster_arn), ListKind::Services).await?;
    let described = batch(&service_arns, DESCRIBE_SERVICES_BATCH, |chunk| {
        let client = client.clone();
        let cluster_arn = cluster_arn.to_string();
        async move {
            let resp = client
                .describe_services()
                .cluster(cluster_arn)
                .set_services(Some(chunk))
                .send()
                .await
                .context("ecs describe-services failed")?;
            Ok::<_, anyhow::Error>(resp.services.unwrap_or_default())
        }
    })
    .await?;

    let mut services = Vec::new();
    for service in &described {
        let mut value = service_to_json(service);
        if let (Some(name), Some(obj)) =
            (service.service_name.as_deref(), value.as_object_mut())
        {
            let task_arns = list_arns(
                client,
                Some(cluster_arn),
                ListKind::Tasks {
                    service_name: Some(name),
                    container_instance: None,
                },
            )
            .await?;
            obj.insert("tasks".to_string(), json!(task_arns));
        }
        services.push(value);
    }
    Ok(services)
}

async fn cluster_container_instances(
    client: &ecs::Client,
    cluster_arn: &str,
) -> Result<Vec<Value>> {
    let instance_arns =
        list_arns(client, Some(cluster_arn), ListKind::ContainerInstances).await?;
    let described = batch(&instance_arns, DESCRIBE_BATCH, |chunk| {
        let client = client.clone();
        let cluster_arn = cluster_arn.to_string();
        async move {
            let resp = client
                .describe_container_instances()
                .cluster(cluster_arn)
                .set_container_instances(Some(chunk))
                .include(ContainerInstanceField::Tags)
                .send()
                .await
                .context("ecs describe-container-instances failed")?;
            Ok::<_, anyhow::Error>(resp.container_instances.unwrap_or_default())
        }
    })
    .await?;

    let mut instances = Vec::new();
    for instance in &described {
        let mut value = container_instance_to_json(instance);
        if let (Some(arn), Some(obj)) = (
            instance.container_instance_arn.as_deref(),
            value.as_object_mut(),
        ) {
            let task_arns = list_arns(
                client,
                Some(cluster_arn),
                ListKind::Tasks {
                    service_name: None,
                    container_instance: Some(arn),
                },
            )
            .await?;
            obj.insert("tasks".to_string(), json!(task_arns));
        }
        instances.push(value);
    }
    Ok(instances)
}

async fn cluster_tasks(client: &ecs::Client, cluster_arn: &str) -> Result<Vec<Value>> {
    let task_arns = list_arns(
        client,
        Some(cluster_arn),
        ListKind::Tasks {
            service_name: None,
            container_instance: None,
        },
    )
    .await?;
    let described = batch(&task_arns, DESCRIBE_BATCH, |chunk| {
        let client = client.clone();
        let cluster_arn = cluster_arn.to_string();
        async move {
            let resp = client
                .describe_tasks()
                .cluster(cluster_arn)
                .set_tasks(Some(chunk))
                .include(TaskField::Tags)
                .send()
                .await
                .context("ecs describe-tasks failed")?;
            Ok::<_, anyhow::Error>(resp.tasks.unwrap_or_default())
        }
    })
    .await?;

    let mut tasks = Vec::new();
    for task in &described {
        let mut value = task_to_json(task);
        if let (Some(arn), Some(obj)) =
            (task.task_definition_arn.as_deref(), value.as_object_mut())
        {
            obj.insert(
                "taskDefinition".to_string(),
                task_definition(client, arn).await?,
            );
        }
        tasks.push(value);
    }
    Ok(tasks)
}

async fn task_definition(client: &ecs::Client, taskdef_arn: &str) -> Result<Value> {
    let resp = client
        .describe_task_definition()
        .task_definition(taskdef_arn)
        .include(TaskDefinitionField::Tags)
        .send()
        .await
        .context("ecs describe-task-definition failed")?;
    Ok(resp
        .task_definition
        .as_ref()
        .map(task_definition_to_json)
        .unwrap_or(Value::Null))
}

fn ecs_tags_to_json(tags: Option<&Vec<ecs::types::Tag>>) -> Value {
    let tags: Vec<Value> = tags
        .into_iter()
        .flatten()
        .map(|tag| {
            json!({
                "key": tag.key.clone(),
                "value": tag.value.clone(),
            })
        })
        .collect();
    Value::Array(tags)
}

fn cluster_to_json(cluster: &ecs::types::Cluster) -> Value {
    json!({
        "clusterArn": cluster.cluster_arn.clone(),
        "clusterName": cluster.cluster_name.clone(),
        "status": cluster.status.clone(),
        "registeredContainerInstancesCount": cluster.registered_container_instances_count,
        "runningTasksCount": cluster.running_tasks_count,
        "pendingTasksCount": cluster.pending_tasks_count,
        "activeServicesCount": cluster.active_services_count,
        "tags": ecs_tags_to_json(cluster.tags.as_ref()),
    })
}

fn service_to_json(service: &ecs::types::Service) -> Value {
    json!({
        "serviceArn": service.service_arn.clone(),
        "serviceName": service.service_name.clone(),
        "status": service.status.clone(),
        "desiredCount": service.desired_count,
        "runningCount": service.running_count,
        "pendingCount": service.pending_count,
        "launchType": service.launch_type.as_ref().map(|t| t.as_str()),
        "taskDefinition": service.task_definition.clone(),
    })
}

fn container_instance_to_json(instance: &ecs::types::ContainerInstance) -> Value {
    json!({
        "containerInstanceArn": instance.container_instance_arn.clone(),
        "ec2InstanceId": instance.ec2_instance_id.clone(),
        "status": instance.status.clone(),
        "runningTasksCount": instance.running_tasks_count,
        "pendingTasksCount": instance.pending_tasks_count,
        "tags": ecs_tags_to_json(instance.tags.as_ref()),
    })
}

fn task_to_json(task: &ecs::types::Task) -> Value {
    json!({
        "taskArn": task.task_arn.clone(),
        "taskDefinitionArn": task.task_definition_arn.clone(),
        "lastStatus": task.last_status.clone(),
        "desiredStatus": task.desired_status.clone(),
        "launchType": task.launch_type.as_ref().map(|t| t.as_str()),
        "group": task.group.clone(),
        "containers": task.containers.iter().flatten().map(|container| json!({
            "containerArn": container.container_arn.clone(),
            "taskArn": container.task_arn.clone(),
            "name": container.name.clone(),
            "image": container.image.clone(),
            "imageDigest": container.image_digest.clone(),
            "lastStatus": container.last_status.clone(),
        })).collect::<Vec<_>>(),
        "tags": ecs_tags_to_json(task.tags.as_ref()),
    })
}

fn task_definition_to_json(taskdef: &ecs::types::TaskDefinition) -> Value {
    json!({
        "taskDefinitionArn": taskdef.task_definition_arn.clone(),
        "family": taskdef.family.clone(),
        "revision": taskdef.revision,
        "status": taskdef.status.as_ref().map(|s| s.as_str()),
        "cpu": taskdef.cpu.clone(),
        "memory": taskdef.memory.clone(),
        "networkMode": taskdef.network_mode.as_ref().map(|m| m.as_str()),
        "containerDefinitions": taskdef.container_definitions.iter().flatten()
            .map(|definition| json!({
                "name": definition.name.clone(),
                "image": definition.image.clone(),
                "essential": definition.essential,
                "portMappings": definition.port_mappings.iter().flatten().map(|mapping| json!({
                    "containerPort": mapping.container_port,
                    "hostPort": mapping.host_port,
                    "protocol": mapping.protocol.as_ref().map(|p| p.as_str()),
                })).collect::<Vec<_>>(),
            }))
            .collect::<Vec<_>>(),
    })
}
