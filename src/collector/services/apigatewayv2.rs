//! API Gateway v2 (HTTP and WebSocket) inventory.

use crate::collector::pagers::{paginate, Page};
use crate::collector::scheduler::TaskOutput;
use anyhow::{Context, Result};
use aws_sdk_apigatewayv2 as apigatewayv2;
use serde_json::{json, Value};
use tracing::debug;

pub async fn get_apis(client: apigatewayv2::Client) -> Result<TaskOutput> {
    debug!("executing apigatewayv2 get-apis, get-routes, get-integrations, get-authorizers");
    let all = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .get_apis()
                .set_next_token(token)
                .send()
                .await
                .context("apigatewayv2 get-apis failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.items.unwrap_or_default(),
                resp.next_token,
            ))
        }
    })
    .await?;

    let vpc_links = vpc_links(&client).await?;
    let mut apis = Vec::new();
    for api in &all {
        let mut value = api_to_json(api);
        if let (Some(id), Some(obj)) = (api.api_id.as_deref(), value.as_object_mut()) {
            obj.insert("Routes".to_string(), Value::Array(routes(&client, id).await?));
            obj.insert(
                "Authorizers".to_string(),
                Value::Array(authorizers(&client, id).await?),
            );
            obj.insert(
                "Integrations".to_string(),
                Value::Array(integrations(&client, id).await?),
            );
            obj.insert("VpcLinks".to_string(), json!(vpc_links));
        }
        apis.push(value);
    }
    Ok((&["apigatewayv2", "Apis"], Value::Array(apis)))
}

/// A single call suffices; accounts do not accumulate enough v2 VPC links
/// to page through.
async fn vpc_links(client: &apigatewayv2::Client) -> Result<Vec<Value>> {
    let resp = client
        .get_vpc_links()
        .send()
        .await
        .context("apigatewayv2 get-vpc-links failed")?;
    Ok(resp
        .items
        .unwrap_or_default()
        .iter()
        .map(|link| {
            json!({
                "VpcLinkId": link.vpc_link_id.clone(),
                "Name": link.name.clone(),
                "SubnetIds": link.subnet_ids.clone(),
                "SecurityGroupIds": link.security_group_ids.clone(),
            })
        })
        .collect())
}

async fn routes(client: &apigatewayv2::Client, api_id: &str) -> Result<Vec<Value>> {
    paginate(|token| {
        let client = client.clone();
        let api_id = api_id.to_string();
        async move {
            let resp = client
                .get_routes()
                .api_id(api_id)
                .set_next_token(token)
                .send()
                .await
                .context("apigatewayv2 get-routes failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.items
                    .unwrap_or_default()
                    .iter()
                    .map(|route| {
                        json!({
                            "RouteId": route.route_id.clone(),
                            "RouteKey": route.route_key.clone(),
                            "Target": route.target.clone(),
                            "AuthorizerId": route.authorizer_id.clone(),
                            "AuthorizationType": route
                                .authorization_type
                                .as_ref()
                                .map(|t| t.as_str()),
                        })
                    })
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await
}

async fn authorizers(client: &apigatewayv2::Client, api_id: &str) -> Result<Vec<Value>> {
    paginate(|token| {
        let client = client.clone();
        let api_id = api_id.to_string();
        async move {
            let resp = client
                .get_authorizers()
                .api_id(api_id)
                .set_next_token(token)
                .send()
                .await
                .context("apigatewayv2 get-authorizers failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.items
                    .unwrap_or_default()
                    .iter()
                    .map(|authorizer| {
                        json!({
                            "AuthorizerId": authorizer.authorizer_id.clone(),
                            "Name": authorizer.name.clone(),
                            "AuthorizerType": authorizer
                                .authorizer_type
                                .as_ref()
                                .map(|t| t.as_str()),
                            "AuthorizerUri": authorizer.authorizer_uri.clone(),
                            "IdentitySource": authorizer
                                .identity_source
                                .clone()
                                .unwrap_or_default(),
                        })
                    })
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await
}

async fn integrations(client: &apigatewayv2::Client, api_id: &str) -> Result<Vec<Value>> {
    paginate(|token| {
        let client = client.clone();
        let api_id = api_id.to_string();
        async move {
            let resp = client
                .get_integrations()
                .api_id(api_id)
                .set_next_token(token)
                .send()
                .await
                .context("apigatewayv2 get-integrations failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.items
                    .unwrap_or_default()
                    .iter()
                    .map(|integration| {
                        json!({
                            "IntegrationId": integration.integration_id.clone(),
                            "IntegrationType": integration
                                .integration_type
                                .as_ref()
                                .map(|t| t.as_str()),
                            "IntegrationUri": integration.integration_uri.clone(),
                            "IntegrationMethod": integration.integration_method.clone(),
                            "ConnectionType": integration
                                .connection_type
                                .as_ref()
                                .map(|t| t.as_str()),
                            "ConnectionId": integration.connection_id.clone(),
                        })
                    })
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await
}

fn api_to_json(api: &apigatewayv2::types::Api) -> Value {
    json!({
        "ApiId": api.api_id.clone(),
        "Name": api.name.clone(),
        "ProtocolType": api.protocol_type.as_ref().map(|t| t.as_str()),
        "ApiEndpoint": api.api_endpoint.clone(),
        "RouteSelectionExpression": api.route_selection_expression.clone(),
        "CreatedDate": api.created_date.map(|t| t.to_string()),
    })
}
