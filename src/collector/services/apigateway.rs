//! API Gateway REST API inventory and usage plans.
//!
//! Each REST API is hydrated with its authorizers, deployments, request
//! validators, stages, resources and per-resource methods, plus the
//! account's VPC links. All the listing calls share API Gateway's
//! `position`/`items` pagination convention.

use crate::collector::pagers::{paginate, Page};
use crate::collector::scheduler::TaskOutput;
use anyhow::{Context, Result};
use aws_sdk_apigateway as apigateway;
use serde_json::{json, Value};
use tracing::debug;

pub async fn get_rest_apis(client: apigateway::Client) -> Result<TaskOutput> {
    debug!(
        "executing apigateway get-rest-apis, get-authorizers, get-deployments, \
         get-request-validators, get-stages, get-resources, get-method, get-vpc-links"
    );
    let all = paginate(|position| {
        let client = client.clone();
        async move {
            let resp = client
                .get_rest_apis()
                .set_position(position)
                .send()
                .await
                .context("apigateway get-rest-apis failed")?;
            Ok::<_, anyhow::Error>(Page::new(resp.items.unwrap_or_default(), resp.position))
        }
    })
    .await?;

    let vpc_links = vpc_links(&client).await?;
    let mut apis = Vec::new();
    for api in &all {
        let mut value = rest_api_to_json(api);
        if let (Some(id), Some(obj)) = (api.id.as_deref(), value.as_object_mut()) {
            obj.insert("vpcLinks".to_string(), json!(vpc_links));
            obj.insert(
                "authorizers".to_string(),
                Value::Array(authorizers(&client, id).await?),
            );
            obj.insert(
                "deployments".to_string(),
                Value::Array(deployments(&client, id).await?),
            );
            obj.insert(
                "requestValidators".to_string(),
                Value::Array(request_validators(&client, id).await?),
            );
            obj.insert("stages".to_string(), Value::Array(stages(&client, id).await?));
            obj.insert(
                "resources".to_string(),
                Value::Array(resources(&client, id).await?),
            );
        }
        apis.push(value);
    }
    Ok((&["apigateway", "Apis"], Value::Array(apis)))
}

pub async fn get_usage_plans(client: apigateway::Client) -> Result<TaskOutput> {
    debug!("executing apigateway get-usage-plans, get-usage-plan-keys");
    let all = paginate(|position| {
        let client = client.clone();
        async move {
            let resp = client
                .get_usage_plans()
                .set_position(position)
                .send()
                .await
                .context("apigateway get-usage-plans failed")?;
            Ok::<_, anyhow::Error>(Page::new(resp.items.unwrap_or_default(), resp.position))
        }
    })
    .await?;

    let mut plans = Vec::new();
    for plan in &all {
        let mut value = usage_plan_to_json(plan);
        if let (Some(id), Some(obj)) = (plan.id.as_deref(), value.as_object_mut()) {
            obj.insert(
                "keys".to_string(),
                Value::Array(usage_plan_keys(&client, id).await?),
            );
        }
        plans.push(value);
    }
    Ok((&["apigateway", "UsagePlans"], Value::Array(plans)))
}

async fn vpc_links(client: &apigateway::Client) -> Result<Vec<Value>> {
    paginate(|position| {
        let client = client.clone();
        async move {
            let resp = client
                .get_vpc_links()
                .set_position(position)
                .send()
                .await
                .context("apigateway get-vpc-links failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.items
                    .unwrap_or_default()
                    .iter()
                    .map(|link| {
                        json!({
                            "id": link.id.clone(),
                            "name": link.name.clone(),
                            "status": link.status.as_ref().map(|s| s.as_str()),
                            "targetArns": link.target_arns.clone().unwrap_or_default(),
                        })
                    })
                    .collect(),
                resp.position,
            ))
        }
    })
    .await
}

async fn authorizers(client: &apigateway::Client, rest_api_id: &str) -> Result<Vec<Value>> {
    paginate(|position| {
        let client = client.clone();
        let rest_api_id = rest_api_id.to_string();
        async move {
            let resp = client
                .get_authorizers()
                .rest_api_id(rest_api_id)
                .set_position(position)
                .send()
                .await
                .context("apigateway get-authorizers failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.items
                    .unwrap_or_default()
                    .iter()
                    .map(|authorizer| {
                        json!({
                            "id": authorizer.id.clone(),
                            "name": authorizer.name.clone(),
                            "type": authorizer.r#type.as_ref().map(|t| t.as_str()),
                            "providerARNs": authorizer.provider_arns.clone().unwrap_or_default(),
                            "authorizerUri": authorizer.authorizer_uri.clone(),
                        })
                    })
                    .collect(),
                resp.position,
            ))
        }
    })
    .await
}

async fn deployments(client: &apigateway::Client, rest_api_id: &str) -> Result<Vec<Value>> {
    paginate(|position| {
        let client = client.clone();
        let rest_api_id = rest_api_id.to_string();
        async move {
            let resp = client
                .get_deployments()
                .rest_api_id(rest_api_id)
                .set_position(position)
                .send()
                .await
                .context("apigateway get-deployments failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.items
                    .unwrap_or_default()
                    .iter()
                    .map(|deployment| {
                        json!({
                            "id": deployment.id.clone(),
                            "description": deployment.description.clone(),
                            "createdDate": deployment.created_date.map(|t| t.to_string()),
                        })
                    })
                    .collect(),
                resp.position,
            ))
        }
    })
    .await
}

async fn request_validators(
    client: &apigateway::Client,
    rest_api_id: &str,
) -> Result<Vec<Value>> {
    paginate(|position| {
        let client = client.clone();
        let rest_api_id = rest_api_id.to_string();
        async move {
            let resp = client
                .get_request_validators()
                .rest_api_id(rest_api_id)
                .set_position(position)
                .send()
                .await
                .context("apigateway get-request-validators failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.items
                    .unwrap_or_default()
                    .iter()
                    .map(|validator| {
                        json!({
                            "id": validator.id.clone(),
                            "name": validator.name.clone(),
                            "validateRequestBody": validator.validate_request_body,
                            "validateRequestParameters": validator.validate_request_parameters,
                        })
                    })
                    .collect(),
                resp.position,
            ))
        }
    })
    .await
}

/// GetStages is not paginated; the full list comes back under `item`.
async fn stages(client: &apigateway::Client, rest_api_id: &str) -> Result<Vec<Value>> {
    let resp = client
        .get_stages()
        .rest_api_id(rest_api_id)
        .send()
        .await
        .context("apigateway get-stages failed")?;
    Ok(resp
        .item
        .unwrap_or_default()
        .iter()
        .map(|stage| {
            json!({
                "stageName": stage.stage_name.clone(),
                "deploymentId": stage.deployment_id.clone(),
                "webAclArn": stage.web_acl_arn.clone(),
                "variables": stage.variables.clone().unwrap_or_default(),
                "createdDate": stage.created_date.map(|t| t.to_string()),
                "lastUpdatedDate": stage.last_updated_date.map(|t| t.to_string()),
            })
        })
        .collect())
}

async fn resources(client: &apigateway::Client, rest_api_id: &str) -> Result<Vec<Value>> {
    let all = paginate(|position| {
        let client = client.clone();
        let rest_api_id = rest_api_id.to_string();
        async move {
            let resp = client
                .get_resources()
                .rest_api_id(rest_api_id)
                .set_position(position)
                .send()
                .await
                .context("apigateway get-resources failed")?;
            Ok::<_, anyhow::Error>(Page::new(resp.items.unwrap_or_default(), resp.position))
        }
    })
    .await?;

    let mut resources = Vec::new();
    for resource in &all {
        let mut methods = Vec::new();
        if let Some(resource_id) = resource.id.as_deref() {
            for http_method in resource.resource_methods.iter().flat_map(|m| m.keys()) {
                methods.push(method(client, rest_api_id, resource_id, http_method).await?);
            }
        }
        resources.push(json!({
            "id": resource.id.clone(),
            "parentId": resource.parent_id.clone(),
            "pathPart": resource.path_part.clone(),
            "path": resource.path.clone(),
            "methods": methods,
        }));
    }
    Ok(resources)
}

async fn method(
    client: &apigateway::Client,
    rest_api_id: &str,
    resource_id: &str,
    http_method: &str,
) -> Result<Value> {
    let resp = client
        .get_method()
        .rest_api_id(rest_api_id)
        .resource_id(resource_id)
        .http_method(http_method)
        .send()
        .await
        .context("apigateway get-method failed")?;
    Ok(json!({
        "httpMethod": resp.http_method.clone(),
        "authorizationType": resp.authorization_type.clone(),
        "apiKeyRequired": resp.api_key_required,
        "methodIntegration": {
            "type": resp
                .method_integration
                .as_ref()
                .and_then(|i| i.r#type.as_ref())
                .map(|t| t.as_str()),
            "uri": resp.method_integration.as_ref().and_then(|i| i.uri.clone()),
            "integrationHttpMethod": resp
                .method_integration
                .as_ref()
                .and_then(|i| i.http_method.clone()),
            "connectionType": resp
                .method_integration
                .as_ref()
                .and_then(|i| i.connection_type.as_ref())
                .map(|t| t.as_str()),
            "connectionId": resp
                .method_integration
                .as_ref()
                .and_then(|i| i.connection_id.clone()),
        },
    }))
}

async fn usage_plan_keys(client: &apigateway::Client, usage_plan_id: &str) -> Result<Vec<Value>> {
    paginate(|position| {
        let client = client.clone();
        let usage_plan_id = usage_plan_id.to_string();
        async move {
            let resp = client
                .get_usage_plan_keys()
                .usage_plan_id(usage_plan_id)
                .set_position(position)
                .send()
                .await
                .context("apigateway get-usage-plan-keys failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.items
                    .unwrap_or_default()
                    .iter()
                    .map(|key| {
                        json!({
                            "id": key.id.clone(),
                            "type": key.r#type.clone(),
                            "name": key.name.clone(),
                        })
                    })
                    .collect(),
                resp.position,
            ))
        }
    })
    .await
}

fn rest_api_to_json(api: &apigateway::types::RestApi) -> Value {
    json!({
        "id": api.id.clone(),
        "name": api.name.clone(),
        "description": api.description.clone(),
        "createdDate": api.created_date.map(|t| t.to_string()),
        "apiKeySource": api.api_key_source.as_ref().map(|s| s.as_str()),
        "policy": api.policy.clone(),
        "endpointConfiguration": {
            "types": api
                .endpoint_configuration
                .as_ref()
                .and_then(|c| c.types.as_ref())
                .map(|types| types.iter().map(|t| t.as_str()).collect::<Vec<_>>())
                .unwrap_or_default(),
        },
        "tags": api.tags.clone().unwrap_or_default(),
    })
}

fn usage_plan_to_json(plan: &apigateway::types::UsagePlan) -> Value {
    json!({
        "id": plan.id.clone(),
        "name": plan.name.clone(),
        "description": plan.description.clone(),
        "apiStages": plan.api_stages.iter().flatten().map(|stage| json!({
            "apiId": stage.api_id.clone(),
            "stage": stage.stage.clone(),
        })).collect::<Vec<_>>(),
        "throttle": {
            "rateLimit": plan.throttle.as_ref().map(|t| t.rate_limit),
            "burstLimit": plan.throttle.as_ref().map(|t| t.burst_limit),
        },
    })
}
