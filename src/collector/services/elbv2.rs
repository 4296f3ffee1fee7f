//! ELBv2 inventory: load balancers with listeners and rules, target groups
//! with their registered targets.
//!
//! Gateway load balancers are dropped from the output; downstream modeling
//! has no use for them. A listener or target group can be deleted between
//! the listing and its child lookup, so the two exact not-found codes turn
//! into empty child lists.

use crate::collector::pagers::{paginate, Page};
use crate::collector::scheduler::TaskOutput;
use crate::collector::sdk_errors::is_code;
use anyhow::{Context, Result};
use aws_sdk_elasticloadbalancingv2 as elbv2;
use serde_json::{json, Value};
use tracing::debug;

pub async fn describe_load_balancers(client: elbv2::Client) -> Result<TaskOutput> {
    debug!("executing elbv2 describe-load-balancers, describe-listeners, describe-rules");
    let all = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_load_balancers()
                .set_marker(token)
                .send()
                .await
                .context("elbv2 describe-load-balancers failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.load_balancers.unwrap_or_default(),
                resp.next_marker,
            ))
        }
    })
    .await?;

    let mut load_balancers = Vec::new();
    for lb in &all {
        if lb.r#type.as_ref().map(|t| t.as_str()) == Some("gateway") {
            continue;
        }
        let mut value = load_balancer_to_json(lb);
        if let (Some(arn), Some(obj)) = (lb.load_balancer_arn.as_deref(), value.as_object_mut())
        {
            obj.insert(
                "Listeners".to_string(),
                Value::Array(listeners(&client, arn).await?),
            );
        }
        load_balancers.push(value);
    }
    Ok((&["elbv2", "LoadBalancers"], Value::Array(load_balancers)))
}

pub async fn describe_target_groups(client: elbv2::Client) -> Result<TaskOutput> {
    debug!("executing elbv2 describe-target-groups, describe-target-health");
    let all = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_target_groups()
                .set_marker(token)
                .send()
                .await
                .context("elbv2 describe-target-groups failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.target_groups.unwrap_or_default(),
                resp.next_marker,
            ))
        }
    })
    .await?;

    let mut target_groups = Vec::new();
    for group in &all {
        let mut value = target_group_to_json(group);
        if let (Some(arn), Some(obj)) =
            (group.target_group_arn.as_deref(), value.as_object_mut())
        {
            obj.insert(
                "Targets".to_string(),
                Value::Array(targets(&client, arn).await?),
            );
        }
        target_groups.push(value);
    }
    Ok((&["elbv2", "TargetGroups"], Value::Array(target_groups)))
}

async fn listeners(client: &elbv2::Client, load_balancer_arn: &str) -> Result<Vec<Value>> {
    let all = paginate(|token| {
        let client = client.clone();
        let load_balancer_arn = load_balancer_arn.to_string();
        async move {
            let resp = client
                .describe_listeners()
                .load_balancer_arn(load_balancer_arn)
                .set_marker(token)
                .send()
                .await
                .context("elbv2 describe-listeners failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.listeners.unwrap_or_default(),
                resp.next_marker,
            ))
        }
    })
    .await?;

    let mut listeners = Vec::new();
    for listener in &all {
        let mut value = listener_to_json(listener);
        if let (Some(arn), Some(obj)) = (listener.listener_arn.as_deref(), value.as_object_mut())
        {
            obj.insert(
                "Rules".to_string(),
                Value::Array(listener_rules(client, arn).await?),
            );
        }
        listeners.push(value);
    }
    Ok(listeners)
}

async fn listener_rules(client: &elbv2::Client, listener_arn: &str) -> Result<Vec<Value>> {
    let result = paginate(|token| {
        let client = client.clone();
        let listener_arn = listener_arn.to_string();
        async move {
            let resp = client
                .describe_rules()
                .listener_arn(listener_arn)
                .set_marker(token)
                .send()
                .await?;
            Ok(Page::new(
                resp.rules
                    .unwrap_or_default()
                    .iter()
                    .map(rule_to_json)
                    .collect(),
                resp.next_marker,
            ))
        }
    })
    .await;
    match result {
        Ok(rules) => Ok(rules),
        Err(err) if is_code(&err, "ListenerNotFound") => Ok(Vec::new()),
        Err(err) => Err(err).context("elbv2 describe-rules failed"),
    }
}

/// Registered targets of a group, reduced to the target descriptions the
/// health report carries.
async fn targets(client: &elbv2::Client, target_group_arn: &str) -> Result<Vec<Value>> {
    let result = client
        .describe_target_health()
        .target_group_arn(target_group_arn)
        .send()
        .await;
    match result {
        Ok(resp) => Ok(resp
            .target_health_descriptions
            .unwrap_or_default()
            .iter()
            .filter_map(|description| description.target.as_ref())
            .map(|target| {
                json!({
                    "Id": target.id.clone(),
                    "Port": target.port,
                    "AvailabilityZone": target.availability_zone.clone(),
                })
            })
            .collect()),
        Err(err) if is_code(&err, "TargetGroupNotFound") => Ok(Vec::new()),
        Err(err) => Err(err).context("elbv2 describe-target-health failed"),
    }
}

fn load_balancer_to_json(lb: &elbv2::types::LoadBalancer) -> Value {
    json!({
        "LoadBalancerArn": lb.load_balancer_arn.clone(),
        "LoadBalancerName": lb.load_balancer_name.clone(),
        "DNSName": lb.dns_name.clone(),
        "Type": lb.r#type.as_ref().map(|t| t.as_str()),
        "Scheme": lb.scheme.as_ref().map(|s| s.as_str()),
        "VpcId": lb.vpc_id.clone(),
        "State": {
            "Code": lb.state.as_ref().and_then(|s| s.code.as_ref()).map(|c| c.as_str()),
        },
        "SecurityGroups": lb.security_groups.clone().unwrap_or_default(),
        "AvailabilityZones": lb.availability_zones.iter().flatten().map(|zone| json!({
            "ZoneName": zone.zone_name.clone(),
            "SubnetId": zone.subnet_id.clone(),
        })).collect::<Vec<_>>(),
    })
}

fn listener_to_json(listener: &elbv2::types::Listener) -> Value {
    json!({
        "ListenerArn": listener.listener_arn.clone(),
        "Port": listener.port,
        "Protocol": listener.protocol.as_ref().map(|p| p.as_str()),
        "DefaultActions": listener.default_actions.iter().flatten().map(action_to_json)
            .collect::<Vec<_>>(),
    })
}

fn action_to_json(action: &elbv2::types::Action) -> Value {
    json!({
        "Type": action.r#type.as_str(),
        "TargetGroupArn": action.target_group_arn.clone(),
    })
}

fn rule_to_json(rule: &elbv2::types::Rule) -> Value {
    json!({
        "RuleArn": rule.rule_arn.clone(),
        "Priority": rule.priority.clone(),
        "IsDefault": rule.is_default,
        "Conditions": rule.conditions.iter().flatten().map(|condition| json!({
            "Field": condition.field.clone(),
            "Values": condition.values.clone().unwrap_or_default(),
        })).collect::<Vec<_>>(),
        "Actions": rule.actions.iter().flatten().map(action_to_json).collect::<Vec<_>>(),
    })
}

fn target_group_to_json(group: &elbv2::types::TargetGroup) -> Value {
    json!({
        "TargetGroupArn": group.target_group_arn.clone(),
        "TargetGroupName": group.target_group_name.clone(),
        "Protocol": group.protocol.as_ref().map(|p| p.as_str()),
        "Port": group.port,
        "VpcId": group.vpc_id.clone(),
        "TargetType": group.target_type.as_ref().map(|t| t.as_str()),
        "LoadBalancerArns": group.load_balancer_arns.clone().unwrap_or_default(),
    })
}
