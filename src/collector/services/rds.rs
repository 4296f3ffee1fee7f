//! RDS inventory: instances, subnet groups, clusters.

use crate::collector::pagers::{paginate, Page};
use crate::collector::scheduler::TaskOutput;
use anyhow::{Context, Result};
use aws_sdk_rds as rds;
use serde_json::{json, Value};
use tracing::debug;

pub async fn describe_db_instances(client: rds::Client) -> Result<TaskOutput> {
    debug!("executing rds describe-db-instances");
    let instances = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_db_instances()
                .set_marker(token)
                .send()
                .await
                .context("rds describe-db-instances failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.db_instances
                    .unwrap_or_default()
                    .iter()
                    .map(db_instance_to_json)
                    .collect(),
                resp.marker,
            ))
        }
    })
    .await?;
    Ok((
        &["rds", "Instances", "DBInstances"],
        Value::Array(instances),
    ))
}

pub async fn describe_db_subnet_groups(client: rds::Client) -> Result<TaskOutput> {
    debug!("executing rds describe-db-subnet-groups");
    let groups = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_db_subnet_groups()
                .set_marker(token)
                .send()
                .await
                .context("rds describe-db-subnet-groups failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.db_subnet_groups
                    .unwrap_or_default()
                    .iter()
                    .map(db_subnet_group_to_json)
                    .collect(),
                resp.marker,
            ))
        }
    })
    .await?;
    Ok((
        &["rds", "SubnetGroups", "DBSubnetGroups"],
        Value::Array(groups),
    ))
}

pub async fn describe_db_clusters(client: rds::Client) -> Result<TaskOutput> {
    debug!("executing rds describe-db-clusters");
    let clusters = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_db_clusters()
                .set_marker(token)
                .send()
                .await
                .context("rds describe-db-clusters failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.db_clusters
                    .unwrap_or_default()
                    .iter()
                    .map(db_cluster_to_json)
                    .collect(),
                resp.marker,
            ))
        }
    })
    .await?;
    Ok((&["rds", "DBClusters"], Value::Array(clusters)))
}

fn vpc_security_groups_to_json(
    groups: Option<&Vec<rds::types::VpcSecurityGroupMembership>>,
) -> Value {
    let groups: Vec<Value> = groups
        .into_iter()
        .flatten()
        .map(|membership| {
            json!({
                "VpcSecurityGroupId": membership.vpc_security_group_id.clone(),
                "Status": membership.status.clone(),
            })
        })
        .collect();
    Value::Array(groups)
}

fn db_instance_to_json(instance: &rds::types::DbInstance) -> Value {
    json!({
        "DBInstanceIdentifier": instance.db_instance_identifier.clone(),
        "DBInstanceArn": instance.db_instance_arn.clone(),
        "DBInstanceClass": instance.db_instance_class.clone(),
        "Engine": instance.engine.clone(),
        "EngineVersion": instance.engine_version.clone(),
        "DBInstanceStatus": instance.db_instance_status.clone(),
        "DBClusterIdentifier": instance.db_cluster_identifier.clone(),
        "PubliclyAccessible": instance.publicly_accessible,
        "StorageEncrypted": instance.storage_encrypted,
        "KmsKeyId": instance.kms_key_id.clone(),
        "MultiAZ": instance.multi_az,
        "Endpoint": {
            "Address": instance.endpoint.as_ref().and_then(|e| e.address.clone()),
            "Port": instance.endpoint.as_ref().and_then(|e| e.port),
        },
        "DBSubnetGroup": {
            "DBSubnetGroupName": instance
                .db_subnet_group
                .as_ref()
                .and_then(|g| g.db_subnet_group_name.clone()),
            "VpcId": instance.db_subnet_group.as_ref().and_then(|g| g.vpc_id.clone()),
        },
        "VpcSecurityGroups": vpc_security_groups_to_json(instance.vpc_security_groups.as_ref()),
    })
}

fn db_subnet_group_to_json(group: &rds::types::DbSubnetGroup) -> Value {
    json!({
        "DBSubnetGroupName": group.db_subnet_group_name.clone(),
        "DBSubnetGroupArn": group.db_subnet_group_arn.clone(),
        "VpcId": group.vpc_id.clone(),
        "SubnetGroupStatus": group.subnet_group_status.clone(),
        "Subnets": group.subnets.iter().flatten().map(|subnet| json!({
            "SubnetIdentifier": subnet.subnet_identifier.clone(),
            "SubnetAvailabilityZone": {
                "Name": subnet
                    .subnet_availability_zone
                    .as_ref()
                    .and_then(|zone| zone.name.clone()),
            },
        })).collect::<Vec<_>>(),
    })
}

fn db_cluster_to_json(cluster: &rds::types::DbCluster) -> Value {
    json!({
        "DBClusterIdentifier": cluster.db_cluster_identifier.clone(),
        "DBClusterArn": cluster.db_cluster_arn.clone(),
        "Engine": cluster.engine.clone(),
        "EngineVersion": cluster.engine_version.clone(),
        "Status": cluster.status.clone(),
        "Endpoint": cluster.endpoint.clone(),
        "ReaderEndpoint": cluster.reader_endpoint.clone(),
        "Port": cluster.port,
        "StorageEncrypted": cluster.storage_encrypted,
        "KmsKeyId": cluster.kms_key_id.clone(),
        "DBClusterMembers": cluster.db_cluster_members.iter().flatten().map(|member| json!({
            "DBInstanceIdentifier": member.db_instance_identifier.clone(),
            "IsClusterWriter": member.is_cluster_writer,
        })).collect::<Vec<_>>(),
        "VpcSecurityGroups": vpc_security_groups_to_json(cluster.vpc_security_groups.as_ref()),
    })
}
