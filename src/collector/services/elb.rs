//! Classic load balancer inventory.

use crate::collector::pagers::{paginate, Page};
use crate::collector::scheduler::TaskOutput;
use anyhow::{Context, Result};
use aws_sdk_elasticloadbalancing as elb;
use serde_json::{json, Value};
use tracing::debug;

pub async fn describe_load_balancers(client: elb::Client) -> Result<TaskOutput> {
    debug!("executing elb describe-load-balancers");
    let load_balancers = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_load_balancers()
                .set_marker(token)
                .send()
                .await
                .context("elb describe-load-balancers failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.load_balancer_descriptions
                    .unwrap_or_default()
                    .iter()
                    .map(load_balancer_to_json)
                    .collect(),
                resp.next_marker,
            ))
        }
    })
    .await?;
    Ok((
        &["elb", "LoadBalancerDescriptions"],
        Value::Array(load_balancers),
    ))
}

fn load_balancer_to_json(lb: &elb::types::LoadBalancerDescription) -> Value {
    json!({
        "LoadBalancerName": lb.load_balancer_name.clone(),
        "DNSName": lb.dns_name.clone(),
        "Scheme": lb.scheme.clone(),
        "VPCId": lb.vpc_id.clone(),
        "Subnets": lb.subnets.clone().unwrap_or_default(),
        "SecurityGroups": lb.security_groups.clone().unwrap_or_default(),
        "AvailabilityZones": lb.availability_zones.clone().unwrap_or_default(),
        "Instances": lb.instances.iter().flatten().map(|instance| json!({
            "InstanceId": instance.instance_id.clone(),
        })).collect::<Vec<_>>(),
        "ListenerDescriptions": lb.listener_descriptions.iter().flatten()
            .map(|description| json!({
                "Listener": {
                    "Protocol": description.listener.as_ref()
                        .map(|l| l.protocol.clone()),
                    "LoadBalancerPort": description.listener.as_ref()
                        .map(|l| l.load_balancer_port),
                    "InstanceProtocol": description.listener.as_ref()
                        .and_then(|l| l.instance_protocol.clone()),
                    "InstancePort": description.listener.as_ref()
                        .map(|l| l.instance_port),
                },
            }))
            .collect::<Vec<_>>(),
    })
}
