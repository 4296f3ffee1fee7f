//! Transit gateway tree enrichment.
//!
//! One task, many calls: every gateway is decorated with its associated
//! attachments (and their propagations), peering attachments, route tables
//! (with default routes, prefix-list references, associations and
//! propagations) and VPC attachments, all grouped by gateway id. An
//! attachment can disappear between the listing and the propagation lookup;
//! that exact not-found code is treated as an empty list.

use crate::collector::pagers::{paginate, Page};
use crate::collector::scheduler::TaskOutput;
use crate::collector::sdk_errors::is_code;
use anyhow::{Context, Result};
use aws_sdk_ec2 as ec2;
use ec2::types::Filter;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

pub async fn describe_transit_gateways(client: ec2::Client) -> Result<TaskOutput> {
    debug!(
        "executing ec2 describe-transit-gateways and the attachment, \
         peering, route-table and vpc-attachment lookups"
    );

    let mut gateways = list_gateways(&client).await?;
    let attachments = attachments_by_gateway(&client).await?;
    let peerings = peering_attachments(&client).await?;
    let route_tables = route_tables_by_gateway(&client).await?;
    let vpc_attachments = vpc_attachments_by_gateway(&client).await?;

    for gateway in &mut gateways {
        let Some(tgw_id) = gateway
            .get("TransitGatewayId")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            continue;
        };
        let gateway_attachments = attachments.get(&tgw_id);
        let peering_values: Vec<Value> = gateway_attachments
            .into_iter()
            .flatten()
            .filter_map(|(attachment_id, _)| peerings.get(attachment_id).cloned())
            .collect();
        let attachment_values: Vec<Value> = gateway_attachments
            .into_iter()
            .flatten()
            .map(|(_, attachment)| attachment.clone())
            .collect();
        let Some(obj) = gateway.as_object_mut() else {
            continue;
        };
        obj.insert("Attachments".to_string(), Value::Array(attachment_values));
        obj.insert("PeeringAttachments".to_string(), Value::Array(peering_values));
        obj.insert(
            "RouteTables".to_string(),
            Value::Array(route_tables.get(&tgw_id).cloned().unwrap_or_default()),
        );
        obj.insert(
            "VpcAttachments".to_string(),
            Value::Array(vpc_attachments.get(&tgw_id).cloned().unwrap_or_default()),
        );
    }

    Ok((&["ec2", "TransitGateways"], Value::Array(gateways)))
}

async fn list_gateways(client: &ec2::Client) -> Result<Vec<Value>> {
    paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_transit_gateways()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-transit-gateways failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.transit_gateways
                    .unwrap_or_default()
                    .iter()
                    .map(gateway_to_json)
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await
}

/// Associated, available attachments keyed by gateway id, each carrying its
/// route-table propagations. Values keep the attachment id alongside so the
/// peering join can reuse it.
async fn attachments_by_gateway(
    client: &ec2::Client,
) -> Result<HashMap<String, Vec<(String, Value)>>> {
    let attachments = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_transit_gateway_attachments()
                .filters(
                    Filter::builder()
                        .name("association.state")
                        .values("associated")
                        .build(),
                )
                .filters(Filter::builder().name("state").values("available").build())
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-transit-gateway-attachments failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.transit_gateway_attachments.unwrap_or_default(),
                resp.next_token,
            ))
        }
    })
    .await?;

    let mut grouped: HashMap<String, Vec<(String, Value)>> = HashMap::new();
    for attachment in attachments {
        let (Some(tgw_id), Some(attachment_id)) = (
            attachment.transit_gateway_id.clone(),
            attachment.transit_gateway_attachment_id.clone(),
        ) else {
            continue;
        };
        let propagations = attachment_propagations(client, &attachment_id).await?;
        let mut value = attachment_to_json(&attachment);
        if let Some(obj) = value.as_object_mut() {
            obj.insert("Propagations".to_string(), Value::Array(propagations));
        }
        grouped
            .entry(tgw_id)
            .or_default()
            .push((attachment_id, value));
    }
    Ok(grouped)
}

async fn attachment_propagations(
    client: &ec2::Client,
    attachment_id: &str,
) -> Result<Vec<Value>> {
    let result = paginate(|token| {
        let client = client.clone();
        let attachment_id = attachment_id.to_string();
        async move {
            let resp = client
                .get_transit_gateway_attachment_propagations()
                .transit_gateway_attachment_id(attachment_id)
                .set_next_token(token)
                .send()
                .await?;
            Ok(Page::new(
                resp.transit_gateway_attachment_propagations
                    .unwrap_or_default()
                    .iter()
                    .map(|propagation| {
                        json!({
                            "TransitGatewayRouteTableId":
                                propagation.transit_gateway_route_table_id.clone(),
                            "State": propagation.state.as_ref().map(|s| s.as_str()),
                        })
                    })
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await;
    match result {
        Ok(propagations) => Ok(propagations),
        // Attachment deleted mid-collection.
        Err(err) if is_code(&err, "InvalidTransitGatewayAttachmentID.NotFound") => {
            Ok(Vec::new())
        }
        Err(err) => {
            Err(err).context("ec2 get-transit-gateway-attachment-propagations failed")
        }
    }
}

async fn peering_attachments(client: &ec2::Client) -> Result<HashMap<String, Value>> {
    let peerings = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_transit_gateway_peering_attachments()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-transit-gateway-peering-attachments failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.transit_gateway_peering_attachments.unwrap_or_default(),
                resp.next_token,
            ))
        }
    })
    .await?;

    let mut by_attachment = HashMap::new();
    for peering in &peerings {
        if let Some(attachment_id) = peering.transit_gateway_attachment_id.clone() {
            by_attachment.insert(attachment_id, peering_to_json(peering));
        }
    }
    Ok(by_attachment)
}

async fn route_tables_by_gateway(
    client: &ec2::Client,
) -> Result<HashMap<String, Vec<Value>>> {
    let route_tables = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_transit_gateway_route_tables()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-transit-gateway-route-tables failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.transit_gateway_route_tables.unwrap_or_default(),
                resp.next_token,
            ))
        }
    })
    .await?;

    let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
    for route_table in route_tables {
        let (Some(tgw_id), Some(route_table_id)) = (
            route_table.transit_gateway_id.clone(),
            route_table.transit_gateway_route_table_id.clone(),
        ) else {
            continue;
        };
        let mut value = route_table_to_json(&route_table);
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "Routes".to_string(),
                Value::Array(default_routes(client, &route_table_id).await?),
            );
            obj.insert(
                "PrefixListReferences".to_string(),
                Value::Array(prefix_list_references(client, &route_table_id).await?),
            );
            obj.insert(
                "Associations".to_string(),
                Value::Array(route_table_associations(client, &route_table_id).await?),
            );
            obj.insert(
                "Propagations".to_string(),
                Value::Array(route_table_propagations(client, &route_table_id).await?),
            );
        }
        grouped.entry(tgw_id).or_default().push(value);
    }
    Ok(grouped)
}

/// Routes covering the default destinations. SearchTransitGatewayRoutes is
/// not paginated; it sets a flag when results were truncated instead.
async fn default_routes(client: &ec2::Client, route_table_id: &str) -> Result<Vec<Value>> {
    let resp = client
        .search_transit_gateway_routes()
        .transit_gateway_route_table_id(route_table_id)
        .filters(
            Filter::builder()
                .name("route-search.subnet-of-match")
                .values("0.0.0.0/0")
                .values("::/0")
                .build(),
        )
        .send()
        .await
        .context("ec2 search-transit-gateway-routes failed")?;
    Ok(resp
        .routes
        .unwrap_or_default()
        .iter()
        .map(|route| {
            json!({
                "DestinationCidrBlock": route.destination_cidr_block.clone(),
                "State": route.state.as_ref().map(|s| s.as_str()),
                "Type": route.r#type.as_ref().map(|t| t.as_str()),
                "TransitGatewayAttachments": route.transit_gateway_attachments.iter().flatten()
                    .map(|attachment| json!({
                        "TransitGatewayAttachmentId":
                            attachment.transit_gateway_attachment_id.clone(),
                        "ResourceId": attachment.resource_id.clone(),
                        "ResourceType": attachment.resource_type.as_ref().map(|t| t.as_str()),
                    }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect())
}

async fn prefix_list_references(
    client: &ec2::Client,
    route_table_id: &str,
) -> Result<Vec<Value>> {
    paginate(|token| {
        let client = client.clone();
        let route_table_id = route_table_id.to_string();
        async move {
            let resp = client
                .get_transit_gateway_prefix_list_references()
                .transit_gateway_route_table_id(route_table_id)
                .set_next_token(token)
                .send()
                .await
                .context("ec2 get-transit-gateway-prefix-list-references failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.transit_gateway_prefix_list_references
                    .unwrap_or_default()
                    .iter()
                    .map(|reference| {
                        json!({
                            "PrefixListId": reference.prefix_list_id.clone(),
                            "State": reference.state.as_ref().map(|s| s.as_str()),
                            "TransitGatewayAttachment": {
                                "ResourceId": reference
                                    .transit_gateway_attachment
                                    .as_ref()
                                    .and_then(|a| a.resource_id.clone()),
                            },
                        })
                    })
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await
}

async fn route_table_associations(
    client: &ec2::Client,
    route_table_id: &str,
) -> Result<Vec<Value>> {
    paginate(|token| {
        let client = client.clone();
        let route_table_id = route_table_id.to_string();
        async move {
            let resp = client
                .get_transit_gateway_route_table_associations()
                .transit_gateway_route_table_id(route_table_id)
                .set_next_token(token)
                .send()
                .await
                .context("ec2 get-transit-gateway-route-table-associations failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.associations
                    .unwrap_or_default()
                    .iter()
                    .map(|association| {
                        json!({
                            "TransitGatewayAttachmentId":
                                association.transit_gateway_attachment_id.clone(),
                            "ResourceId": association.resource_id.clone(),
                            "ResourceType":
                                association.resource_type.as_ref().map(|t| t.as_str()),
                            "State": association.state.as_ref().map(|s| s.as_str()),
                        })
                    })
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await
}

async fn route_table_propagations(
    client: &ec2::Client,
    route_table_id: &str,
) -> Result<Vec<Value>> {
    paginate(|token| {
        let client = client.clone();
        let route_table_id = route_table_id.to_string();
        async move {
            let resp = client
                .get_transit_gateway_route_table_propagations()
                .transit_gateway_route_table_id(route_table_id)
                .set_next_token(token)
                .send()
                .await
                .context("ec2 get-transit-gateway-route-table-propagations failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.transit_gateway_route_table_propagations
                    .unwrap_or_default()
                    .iter()
                    .map(|propagation| {
                        json!({
                            "TransitGatewayAttachmentId":
                                propagation.transit_gateway_attachment_id.clone(),
                            "ResourceId": propagation.resource_id.clone(),
                            "ResourceType":
                                propagation.resource_type.as_ref().map(|t| t.as_str()),
                            "State": propagation.state.as_ref().map(|s| s.as_str()),
                        })
                    })
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await
}

async fn vpc_attachments_by_gateway(
    client: &ec2::Client,
) -> Result<HashMap<String, Vec<Value>>> {
    let attachments = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_transit_gateway_vpc_attachments()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-transit-gateway-vpc-attachments failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.transit_gateway_vpc_attachments.unwrap_or_default(),
                resp.next_token,
            ))
        }
    })
    .await?;

    let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
    for attachment in &attachments {
        let Some(tgw_id) = attachment.transit_gateway_id.clone() else {
            continue;
        };
        grouped.entry(tgw_id).or_default().push(json!({
            "TransitGatewayAttachmentId": attachment.transit_gateway_attachment_id.clone(),
            "TransitGatewayId": attachment.transit_gateway_id.clone(),
            "VpcId": attachment.vpc_id.clone(),
            "VpcOwnerId": attachment.vpc_owner_id.clone(),
            "State": attachment.state.as_ref().map(|s| s.as_str()),
            "SubnetIds": attachment.subnet_ids.clone().unwrap_or_default(),
        }));
    }
    Ok(grouped)
}

fn gateway_to_json(gateway: &ec2::types::TransitGateway) -> Value {
    json!({
        "TransitGatewayId": gateway.transit_gateway_id.clone(),
        "TransitGatewayArn": gateway.transit_gateway_arn.clone(),
        "State": gateway.state.as_ref().map(|s| s.as_str()),
        "OwnerId": gateway.owner_id.clone(),
        "Description": gateway.description.clone(),
        "CreationTime": gateway.creation_time.map(|t| t.to_string()),
        "Tags": super::ec2::tags_to_json(gateway.tags.as_ref()),
    })
}

fn attachment_to_json(attachment: &ec2::types::TransitGatewayAttachment) -> Value {
    json!({
        "TransitGatewayAttachmentId": attachment.transit_gateway_attachment_id.clone(),
        "TransitGatewayId": attachment.transit_gateway_id.clone(),
        "ResourceType": attachment.resource_type.as_ref().map(|t| t.as_str()),
        "ResourceId": attachment.resource_id.clone(),
        "State": attachment.state.as_ref().map(|s| s.as_str()),
        "Association": {
            "TransitGatewayRouteTableId": attachment
                .association
                .as_ref()
                .and_then(|a| a.transit_gateway_route_table_id.clone()),
            "State": attachment
                .association
                .as_ref()
                .and_then(|a| a.state.as_ref())
                .map(|s| s.as_str()),
        },
    })
}

fn peering_to_json(peering: &ec2::types::TransitGatewayPeeringAttachment) -> Value {
    json!({
        "TransitGatewayAttachmentId": peering.transit_gateway_attachment_id.clone(),
        "State": peering.state.as_ref().map(|s| s.as_str()),
        "RequesterTgwInfo": {
            "TransitGatewayId": peering
                .requester_tgw_info
                .as_ref()
                .and_then(|i| i.transit_gateway_id.clone()),
            "OwnerId": peering.requester_tgw_info.as_ref().and_then(|i| i.owner_id.clone()),
            "Region": peering.requester_tgw_info.as_ref().and_then(|i| i.region.clone()),
        },
        "AccepterTgwInfo": {
            "TransitGatewayId": peering
                .accepter_tgw_info
                .as_ref()
                .and_then(|i| i.transit_gateway_id.clone()),
            "OwnerId": peering.accepter_tgw_info.as_ref().and_then(|i| i.owner_id.clone()),
            "Region": peering.accepter_tgw_info.as_ref().and_then(|i| i.region.clone()),
        },
    })
}

fn route_table_to_json(route_table: &ec2::types::TransitGatewayRouteTable) -> Value {
    json!({
        "TransitGatewayRouteTableId": route_table.transit_gateway_route_table_id.clone(),
        "TransitGatewayId": route_table.transit_gateway_id.clone(),
        "State": route_table.state.as_ref().map(|s| s.as_str()),
        "DefaultAssociationRouteTable": route_table.default_association_route_table,
        "DefaultPropagationRouteTable": route_table.default_propagation_route_table,
    })
}
