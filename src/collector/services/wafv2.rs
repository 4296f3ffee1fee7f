//! WAF v2 web ACLs and IP sets.
//!
//! Both collectors are parameterized by scope: the regional registry runs
//! them with `REGIONAL`, the global CloudFront entry point with
//! `CLOUDFRONT` against us-east-1. Only the regional scope supports
//! listing the ALB and API Gateway resources an ACL protects. The listing
//! summaries are merged with the full get-call detail and the tag info,
//! mirroring how consumers expect one flat object per ACL.

use crate::collector::results;
use crate::collector::scheduler::TaskOutput;
use anyhow::{Context, Result};
use aws_sdk_wafv2 as wafv2;
use wafv2::types::{ResourceType, Scope};
use serde_json::{json, Map, Value};
use tracing::debug;

pub async fn web_acls(client: wafv2::Client, scope: Scope) -> Result<TaskOutput> {
    debug!(scope = scope.as_str(), "executing wafv2 list-web-acls and detail calls");
    let resp = client
        .list_web_acls()
        .scope(scope.clone())
        .send()
        .await
        .context("wafv2 list-web-acls failed")?;
    let summaries = resp.web_acls.unwrap_or_default();

    let mut acls = Vec::new();
    for summary in &summaries {
        let mut acl = summary_fields(
            summary.name.as_deref(),
            summary.id.as_deref(),
            summary.arn.as_deref(),
            summary.description.as_deref(),
        );
        if let Some(arn) = summary.arn.as_deref() {
            let (alb_arns, apigw_arns) = if scope == Scope::Regional {
                (
                    protected_resources(&client, arn, ResourceType::ApplicationLoadBalancer)
                        .await?,
                    protected_resources(&client, arn, ResourceType::ApiGateway).await?,
                )
            } else {
                (Vec::new(), Vec::new())
            };
            acl.insert("ALBResourceArns".to_string(), json!(alb_arns));
            acl.insert("APIGWResourceArns".to_string(), json!(apigw_arns));
            results::merge(&mut acl, tag_info(&client, arn).await?);
        }
        if let (Some(name), Some(id)) = (summary.name.as_deref(), summary.id.as_deref()) {
            results::merge(&mut acl, web_acl_detail(&client, name, id, scope.clone()).await?);
        }
        acls.push(Value::Object(acl));
    }
    Ok((&["wafv2", "WebACLs"], Value::Array(acls)))
}

pub async fn ip_sets(client: wafv2::Client, scope: Scope) -> Result<TaskOutput> {
    debug!(scope = scope.as_str(), "executing wafv2 list-ip-sets and detail calls");
    let resp = client
        .list_ip_sets()
        .scope(scope.clone())
        .send()
        .await
        .context("wafv2 list-ip-sets failed")?;
    let summaries = resp.ip_sets.unwrap_or_default();

    let mut sets = Vec::new();
    for summary in &summaries {
        let mut set = summary_fields(
            summary.name.as_deref(),
            summary.id.as_deref(),
            summary.arn.as_deref(),
            summary.description.as_deref(),
        );
        if let (Some(name), Some(id)) = (summary.name.as_deref(), summary.id.as_deref()) {
            results::merge(&mut set, ip_set_detail(&client, name, id, scope.clone()).await?);
        }
        if let Some(arn) = summary.arn.as_deref() {
            results::merge(&mut set, tag_info(&client, arn).await?);
        }
        sets.push(Value::Object(set));
    }
    Ok((&["wafv2", "IPSets"], Value::Array(sets)))
}

fn summary_fields(
    name: Option<&str>,
    id: Option<&str>,
    arn: Option<&str>,
    description: Option<&str>,
) -> Map<String, Value> {
    let Value::Object(map) = json!({
        "Name": name,
        "Id": id,
        "ARN": arn,
        "Description": description,
    }) else {
        unreachable!()
    };
    map
}

async fn protected_resources(
    client: &wafv2::Client,
    web_acl_arn: &str,
    resource_type: ResourceType,
) -> Result<Vec<String>> {
    let resp = client
        .list_resources_for_web_acl()
        .web_acl_arn(web_acl_arn)
        .resource_type(resource_type)
        .send()
        .await
        .context("wafv2 list-resources-for-web-acl failed")?;
    Ok(resp.resource_arns.unwrap_or_default())
}

async fn web_acl_detail(
    client: &wafv2::Client,
    name: &str,
    id: &str,
    scope: Scope,
) -> Result<Map<String, Value>> {
    let resp = client
        .get_web_acl()
        .name(name)
        .id(id)
        .scope(scope)
        .send()
        .await
        .context("wafv2 get-web-acl failed")?;
    let Some(acl) = resp.web_acl else {
        return Ok(Map::new());
    };
    let Value::Object(map) = json!({
        "Name": acl.name.clone(),
        "Id": acl.id.clone(),
        "ARN": acl.arn.clone(),
        "Description": acl.description.clone(),
        "Capacity": acl.capacity,
        "ManagedByFirewallManager": acl.managed_by_firewall_manager,
        "Rules": acl.rules.iter().flatten().map(|rule| json!({
            "Name": rule.name.clone(),
            "Priority": rule.priority,
        })).collect::<Vec<_>>(),
    }) else {
        unreachable!()
    };
    Ok(map)
}

async fn ip_set_detail(
    client: &wafv2::Client,
    name: &str,
    id: &str,
    scope: Scope,
) -> Result<Map<String, Value>> {
    let resp = client
        .get_ip_set()
        .name(name)
        .id(id)
        .scope(scope)
        .send()
        .await
        .context("wafv2 get-ip-set failed")?;
    let Some(set) = resp.ip_set else {
        return Ok(Map::new());
    };
    let Value::Object(map) = json!({
        "Name": set.name.clone(),
        "Id": set.id.clone(),
        "ARN": set.arn.clone(),
        "Description": set.description.clone(),
        "IPAddressVersion": set.ip_address_version.as_str(),
        "Addresses": set.addresses.clone(),
    }) else {
        unreachable!()
    };
    Ok(map)
}

async fn tag_info(client: &wafv2::Client, resource_arn: &str) -> Result<Map<String, Value>> {
    let resp = client
        .list_tags_for_resource()
        .resource_arn(resource_arn)
        .send()
        .await
        .context("wafv2 list-tags-for-resource failed")?;
    Ok(tag_info_fields(resp.tag_info_for_resource.as_ref()))
}

/// The tag info object as the wire shape carries it: the ARN it was listed
/// for plus the tag list.
fn tag_info_fields(info: Option<&wafv2::types::TagInfoForResource>) -> Map<String, Value> {
    let tags: Vec<Value> = info
        .iter()
        .flat_map(|info| info.tag_list.iter().flatten())
        .map(|tag| {
            json!({
                "Key": tag.key.clone(),
                "Value": tag.value.clone(),
            })
        })
        .collect();
    let Value::Object(map) = json!({
        "ResourceARN": info.and_then(|info| info.resource_arn.clone()),
        "TagList": tags,
    }) else {
        unreachable!()
    };
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tag_info_carries_the_resource_arn() {
        let info = wafv2::types::TagInfoForResource::builder()
            .resource_arn("arn:aws:wafv2:eu-west-1:123456789012:regional/webacl/acl/1")
            .build();

        let fields = tag_info_fields(Some(&info));

        assert_eq!(
            fields["ResourceARN"],
            json!("arn:aws:wafv2:eu-west-1:123456789012:regional/webacl/acl/1")
        );
        assert_eq!(fields["TagList"], json!([]));
    }

    #[test]
    fn missing_tag_info_yields_the_empty_shape() {
        let fields = tag_info_fields(None);
        assert_eq!(fields["ResourceARN"], Value::Null);
        assert_eq!(fields["TagList"], json!([]));
    }
}
