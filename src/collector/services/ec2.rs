//! EC2 networking and compute inventory.
//!
//! Thirteen independent tasks over one shared client: instances (joined
//! against their AMIs for a Windows flag), network interfaces, security
//! groups, subnets, network ACLs, VPCs and their peerings, the gateway
//! variants, route tables, VPC endpoints, and EBS volumes. Transit gateways
//! live in their own module.

use crate::collector::pagers::{paginate, Page};
use crate::collector::scheduler::TaskOutput;
use anyhow::{Context, Result};
use aws_sdk_ec2 as ec2;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub async fn describe_instances(client: ec2::Client) -> Result<TaskOutput> {
    debug!("executing ec2 describe-instances, describe-images");
    let mut reservations = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_instances()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-instances failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.reservations
                    .unwrap_or_default()
                    .iter()
                    .map(reservation_to_json)
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await?;

    let image_ids = distinct_image_ids(&reservations);
    if !image_ids.is_empty() {
        let resp = client
            .describe_images()
            .set_image_ids(Some(image_ids))
            .send()
            .await
            .context("ec2 describe-images failed")?;
        let images: Vec<Value> = resp
            .images
            .unwrap_or_default()
            .iter()
            .map(image_to_json)
            .collect();
        apply_windows_flag(&mut reservations, &images);
    }

    Ok((&["instance", "Reservations"], Value::Array(reservations)))
}

/// Distinct AMI ids across all instances, in first-seen order.
pub(crate) fn distinct_image_ids(reservations: &[Value]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for reservation in reservations {
        let instances = reservation.get("Instances").and_then(Value::as_array);
        for instance in instances.into_iter().flatten() {
            if let Some(id) = instance.get("ImageId").and_then(Value::as_str) {
                if seen.insert(id.to_string()) {
                    ids.push(id.to_string());
                }
            }
        }
    }
    ids
}

/// Writes `IsWindows` onto every instance whose AMI was resolved. Instances
/// whose image has since been deregistered keep no flag at all.
pub(crate) fn apply_windows_flag(reservations: &mut [Value], images: &[Value]) {
    let windows: HashMap<String, bool> = images
        .iter()
        .filter_map(|image| {
            let id = image.get("ImageId")?.as_str()?.to_string();
            let is_windows =
                image.get("Platform").and_then(Value::as_str) == Some("windows");
            Some((id, is_windows))
        })
        .collect();

    for reservation in reservations.iter_mut() {
        let Some(instances) = reservation
            .get_mut("Instances")
            .and_then(Value::as_array_mut)
        else {
            continue;
        };
        for instance in instances {
            let flag = instance
                .get("ImageId")
                .and_then(Value::as_str)
                .and_then(|id| windows.get(id).copied());
            let (Some(is_windows), Some(obj)) = (flag, instance.as_object_mut()) else {
                continue;
            };
            obj.insert("IsWindows".to_string(), Value::Bool(is_windows));
        }
    }
}

pub async fn describe_network_interfaces(client: ec2::Client) -> Result<TaskOutput> {
    debug!("executing ec2 describe-network-interfaces");
    let interfaces = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_network_interfaces()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-network-interfaces failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.network_interfaces
                    .unwrap_or_default()
                    .iter()
                    .map(network_interface_to_json)
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await?;
    Ok((&["interface", "NetworkInterfaces"], Value::Array(interfaces)))
}

pub async fn describe_security_groups(client: ec2::Client) -> Result<TaskOutput> {
    debug!("executing ec2 describe-security-groups");
    let groups = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_security_groups()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-security-groups failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.security_groups
                    .unwrap_or_default()
                    .iter()
                    .map(security_group_to_json)
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await?;
    Ok((&["securitygroup", "SecurityGroups"], Value::Array(groups)))
}

pub async fn describe_subnets(client: ec2::Client) -> Result<TaskOutput> {
    debug!("executing ec2 describe-subnets");
    let subnets = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_subnets()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-subnets failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.subnets
                    .unwrap_or_default()
                    .iter()
                    .map(subnet_to_json)
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await?;
    Ok((&["subnet", "Subnets"], Value::Array(subnets)))
}

pub async fn describe_network_acls(client: ec2::Client) -> Result<TaskOutput> {
    debug!("executing ec2 describe-network-acls");
    let acls = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_network_acls()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-network-acls failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.network_acls
                    .unwrap_or_default()
                    .iter()
                    .map(network_acl_to_json)
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await?;
    Ok((&["acl", "NetworkAcls"], Value::Array(acls)))
}

pub async fn describe_vpcs(client: ec2::Client) -> Result<TaskOutput> {
    debug!("executing ec2 describe-vpcs");
    let vpcs = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_vpcs()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-vpcs failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.vpcs
                    .unwrap_or_default()
                    .iter()
                    .map(vpc_to_json)
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await?;
    Ok((&["vpc", "Vpcs"], Value::Array(vpcs)))
}

pub async fn describe_vpc_peering_connections(client: ec2::Client) -> Result<TaskOutput> {
    debug!("executing ec2 describe-vpc-peering-connections");
    let peerings = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_vpc_peering_connections()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-vpc-peering-connections failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.vpc_peering_connections
                    .unwrap_or_default()
                    .iter()
                    .map(vpc_peering_to_json)
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await?;
    Ok((
        &["vpcpeering", "VpcPeeringConnections"],
        Value::Array(peerings),
    ))
}

pub async fn describe_internet_gateways(client: ec2::Client) -> Result<TaskOutput> {
    debug!("executing ec2 describe-internet-gateways");
    let gateways = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_internet_gateways()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-internet-gateways failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.internet_gateways
                    .unwrap_or_default()
                    .iter()
                    .map(internet_gateway_to_json)
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await?;
    Ok((&["igw", "InternetGateways"], Value::Array(gateways)))
}

/// DescribeVpnGateways has no pagination; a single call returns everything.
pub async fn describe_vpn_gateways(client: ec2::Client) -> Result<TaskOutput> {
    debug!("executing ec2 describe-vpn-gateways");
    let resp = client
        .describe_vpn_gateways()
        .send()
        .await
        .context("ec2 describe-vpn-gateways failed")?;
    let gateways: Vec<Value> = resp
        .vpn_gateways
        .unwrap_or_default()
        .iter()
        .map(vpn_gateway_to_json)
        .collect();
    Ok((&["vgw", "VpnGateways"], Value::Array(gateways)))
}

pub async fn describe_nat_gateways(client: ec2::Client) -> Result<TaskOutput> {
    debug!("executing ec2 describe-nat-gateways");
    let gateways = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_nat_gateways()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-nat-gateways failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.nat_gateways
                    .unwrap_or_default()
                    .iter()
                    .map(nat_gateway_to_json)
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await?;
    Ok((&["ngw", "NatGateways"], Value::Array(gateways)))
}

pub async fn describe_route_tables(client: ec2::Client) -> Result<TaskOutput> {
    debug!("executing ec2 describe-route-tables");
    let tables = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_route_tables()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-route-tables failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.route_tables
                    .unwrap_or_default()
                    .iter()
                    .map(route_table_to_json)
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await?;
    Ok((&["routetable", "RouteTables"], Value::Array(tables)))
}

pub async fn describe_vpc_endpoints(client: ec2::Client) -> Result<TaskOutput> {
    debug!("executing ec2 describe-vpc-endpoints");
    let endpoints = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_vpc_endpoints()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-vpc-endpoints failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.vpc_endpoints
                    .unwrap_or_default()
                    .iter()
                    .map(vpc_endpoint_to_json)
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await?;
    Ok((&["vpcendpoint", "VpcEndpoints"], Value::Array(endpoints)))
}

pub async fn describe_volumes(client: ec2::Client) -> Result<TaskOutput> {
    debug!("executing ec2 describe-volumes");
    let volumes = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_volumes()
                .set_next_token(token)
                .send()
                .await
                .context("ec2 describe-volumes failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.volumes
                    .unwrap_or_default()
                    .iter()
                    .map(volume_to_json)
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await?;
    Ok((&["ebs", "Volumes"], Value::Array(volumes)))
}

pub(crate) fn tags_to_json(tags: Option<&Vec<ec2::types::Tag>>) -> Value {
    let tags: Vec<Value> = tags
        .into_iter()
        .flatten()
        .map(|tag| {
            json!({
                "Key": tag.key.clone(),
                "Value": tag.value.clone(),
            })
        })
        .collect();
    Value::Array(tags)
}

fn reservation_to_json(reservation: &ec2::types::Reservation) -> Value {
    let instances: Vec<Value> = reservation
        .instances
        .iter()
        .flatten()
        .map(instance_to_json)
        .collect();
    json!({
        "ReservationId": reservation.reservation_id.clone(),
        "OwnerId": reservation.owner_id.clone(),
        "Instances": instances,
    })
}

fn instance_to_json(instance: &ec2::types::Instance) -> Value {
    let security_groups: Vec<Value> = instance
        .security_groups
        .iter()
        .flatten()
        .map(|group| {
            json!({
                "GroupId": group.group_id.clone(),
                "GroupName": group.group_name.clone(),
            })
        })
        .collect();
    let interface_ids: Vec<Value> = instance
        .network_interfaces
        .iter()
        .flatten()
        .filter_map(|eni| eni.network_interface_id.clone())
        .map(Value::String)
        .collect();
    json!({
        "InstanceId": instance.instance_id.clone(),
        "ImageId": instance.image_id.clone(),
        "InstanceType": instance.instance_type.as_ref().map(|t| t.as_str()),
        "State": {
            "Name": instance.state.as_ref().and_then(|s| s.name.as_ref()).map(|n| n.as_str()),
        },
        "Platform": instance.platform.as_ref().map(|p| p.as_str()),
        "PrivateIpAddress": instance.private_ip_address.clone(),
        "PublicIpAddress": instance.public_ip_address.clone(),
        "SubnetId": instance.subnet_id.clone(),
        "VpcId": instance.vpc_id.clone(),
        "LaunchTime": instance.launch_time.map(|t| t.to_string()),
        "IamInstanceProfile": {
            "Arn": instance.iam_instance_profile.as_ref().and_then(|p| p.arn.clone()),
        },
        "SecurityGroups": security_groups,
        "NetworkInterfaceIds": interface_ids,
        "Tags": tags_to_json(instance.tags.as_ref()),
    })
}

fn image_to_json(image: &ec2::types::Image) -> Value {
    json!({
        "ImageId": image.image_id.clone(),
        "Name": image.name.clone(),
        "OwnerId": image.owner_id.clone(),
        "Platform": image.platform.as_ref().map(|p| p.as_str()),
        "Architecture": image.architecture.as_ref().map(|a| a.as_str()),
    })
}

fn network_interface_to_json(eni: &ec2::types::NetworkInterface) -> Value {
    json!({
        "NetworkInterfaceId": eni.network_interface_id.clone(),
        "SubnetId": eni.subnet_id.clone(),
        "VpcId": eni.vpc_id.clone(),
        "PrivateIpAddress": eni.private_ip_address.clone(),
        "Description": eni.description.clone(),
        "Status": eni.status.as_ref().map(|s| s.as_str()),
        "Groups": eni.groups.iter().flatten().map(|group| json!({
            "GroupId": group.group_id.clone(),
            "GroupName": group.group_name.clone(),
        })).collect::<Vec<_>>(),
        "Attachment": {
            "InstanceId": eni.attachment.as_ref().and_then(|a| a.instance_id.clone()),
            "DeviceIndex": eni.attachment.as_ref().and_then(|a| a.device_index),
        },
        "TagSet": tags_to_json(eni.tag_set.as_ref()),
    })
}

fn ip_permission_to_json(permission: &ec2::types::IpPermission) -> Value {
    json!({
        "IpProtocol": permission.ip_protocol.clone(),
        "FromPort": permission.from_port,
        "ToPort": permission.to_port,
        "IpRanges": permission.ip_ranges.iter().flatten().map(|range| json!({
            "CidrIp": range.cidr_ip.clone(),
        })).collect::<Vec<_>>(),
        "Ipv6Ranges": permission.ipv6_ranges.iter().flatten().map(|range| json!({
            "CidrIpv6": range.cidr_ipv6.clone(),
        })).collect::<Vec<_>>(),
        "UserIdGroupPairs": permission.user_id_group_pairs.iter().flatten().map(|pair| json!({
            "GroupId": pair.group_id.clone(),
            "UserId": pair.user_id.clone(),
        })).collect::<Vec<_>>(),
    })
}

fn security_group_to_json(group: &ec2::types::SecurityGroup) -> Value {
    json!({
        "GroupId": group.group_id.clone(),
        "GroupName": group.group_name.clone(),
        "Description": group.description.clone(),
        "VpcId": group.vpc_id.clone(),
        "OwnerId": group.owner_id.clone(),
        "IpPermissions": group.ip_permissions.iter().flatten()
            .map(ip_permission_to_json).collect::<Vec<_>>(),
        "IpPermissionsEgress": group.ip_permissions_egress.iter().flatten()
            .map(ip_permission_to_json).collect::<Vec<_>>(),
        "Tags": tags_to_json(group.tags.as_ref()),
    })
}

fn subnet_to_json(subnet: &ec2::types::Subnet) -> Value {
    json!({
        "SubnetId": subnet.subnet_id.clone(),
        "VpcId": subnet.vpc_id.clone(),
        "CidrBlock": subnet.cidr_block.clone(),
        "AvailabilityZone": subnet.availability_zone.clone(),
        "MapPublicIpOnLaunch": subnet.map_public_ip_on_launch,
        "AvailableIpAddressCount": subnet.available_ip_address_count,
        "Tags": tags_to_json(subnet.tags.as_ref()),
    })
}

fn network_acl_to_json(acl: &ec2::types::NetworkAcl) -> Value {
    json!({
        "NetworkAclId": acl.network_acl_id.clone(),
        "VpcId": acl.vpc_id.clone(),
        "IsDefault": acl.is_default,
        "Entries": acl.entries.iter().flatten().map(|entry| json!({
            "RuleNumber": entry.rule_number,
            "Protocol": entry.protocol.clone(),
            "RuleAction": entry.rule_action.as_ref().map(|a| a.as_str()),
            "Egress": entry.egress,
            "CidrBlock": entry.cidr_block.clone(),
            "Ipv6CidrBlock": entry.ipv6_cidr_block.clone(),
            "PortRange": {
                "From": entry.port_range.as_ref().and_then(|r| r.from),
                "To": entry.port_range.as_ref().and_then(|r| r.to),
            },
        })).collect::<Vec<_>>(),
        "Associations": acl.associations.iter().flatten().map(|assoc| json!({
            "NetworkAclAssociationId": assoc.network_acl_association_id.clone(),
            "SubnetId": assoc.subnet_id.clone(),
        })).collect::<Vec<_>>(),
        "Tags": tags_to_json(acl.tags.as_ref()),
    })
}

fn vpc_to_json(vpc: &ec2::types::Vpc) -> Value {
    json!({
        "VpcId": vpc.vpc_id.clone(),
        "CidrBlock": vpc.cidr_block.clone(),
        "State": vpc.state.as_ref().map(|s| s.as_str()),
        "IsDefault": vpc.is_default,
        "DhcpOptionsId": vpc.dhcp_options_id.clone(),
        "Tags": tags_to_json(vpc.tags.as_ref()),
    })
}

fn peering_vpc_info_to_json(info: Option<&ec2::types::VpcPeeringConnectionVpcInfo>) -> Value {
    json!({
        "VpcId": info.and_then(|i| i.vpc_id.clone()),
        "CidrBlock": info.and_then(|i| i.cidr_block.clone()),
        "OwnerId": info.and_then(|i| i.owner_id.clone()),
        "Region": info.and_then(|i| i.region.clone()),
    })
}

fn vpc_peering_to_json(peering: &ec2::types::VpcPeeringConnection) -> Value {
    json!({
        "VpcPeeringConnectionId": peering.vpc_peering_connection_id.clone(),
        "Status": {
            "Code": peering.status.as_ref().and_then(|s| s.code.as_ref()).map(|c| c.as_str()),
            "Message": peering.status.as_ref().and_then(|s| s.message.clone()),
        },
        "RequesterVpcInfo": peering_vpc_info_to_json(peering.requester_vpc_info.as_ref()),
        "AccepterVpcInfo": peering_vpc_info_to_json(peering.accepter_vpc_info.as_ref()),
        "Tags": tags_to_json(peering.tags.as_ref()),
    })
}

fn internet_gateway_to_json(igw: &ec2::types::InternetGateway) -> Value {
    json!({
        "InternetGatewayId": igw.internet_gateway_id.clone(),
        "Attachments": igw.attachments.iter().flatten().map(|attachment| json!({
            "VpcId": attachment.vpc_id.clone(),
            "State": attachment.state.as_ref().map(|s| s.as_str()),
        })).collect::<Vec<_>>(),
        "Tags": tags_to_json(igw.tags.as_ref()),
    })
}

fn vpn_gateway_to_json(vgw: &ec2::types::VpnGateway) -> Value {
    json!({
        "VpnGatewayId": vgw.vpn_gateway_id.clone(),
        "State": vgw.state.as_ref().map(|s| s.as_str()),
        "Type": vgw.r#type.as_ref().map(|t| t.as_str()),
        "AmazonSideAsn": vgw.amazon_side_asn,
        "VpcAttachments": vgw.vpc_attachments.iter().flatten().map(|attachment| json!({
            "VpcId": attachment.vpc_id.clone(),
            "State": attachment.state.as_ref().map(|s| s.as_str()),
        })).collect::<Vec<_>>(),
        "Tags": tags_to_json(vgw.tags.as_ref()),
    })
}

fn nat_gateway_to_json(ngw: &ec2::types::NatGateway) -> Value {
    json!({
        "NatGatewayId": ngw.nat_gateway_id.clone(),
        "VpcId": ngw.vpc_id.clone(),
        "SubnetId": ngw.subnet_id.clone(),
        "State": ngw.state.as_ref().map(|s| s.as_str()),
        "CreateTime": ngw.create_time.map(|t| t.to_string()),
        "NatGatewayAddresses": ngw.nat_gateway_addresses.iter().flatten().map(|addr| json!({
            "AllocationId": addr.allocation_id.clone(),
            "NetworkInterfaceId": addr.network_interface_id.clone(),
            "PrivateIp": addr.private_ip.clone(),
            "PublicIp": addr.public_ip.clone(),
        })).collect::<Vec<_>>(),
        "Tags": tags_to_json(ngw.tags.as_ref()),
    })
}

fn route_table_to_json(table: &ec2::types::RouteTable) -> Value {
    json!({
        "RouteTableId": table.route_table_id.clone(),
        "VpcId": table.vpc_id.clone(),
        "Routes": table.routes.iter().flatten().map(|route| json!({
            "DestinationCidrBlock": route.destination_cidr_block.clone(),
            "DestinationIpv6CidrBlock": route.destination_ipv6_cidr_block.clone(),
            "GatewayId": route.gateway_id.clone(),
            "NatGatewayId": route.nat_gateway_id.clone(),
            "TransitGatewayId": route.transit_gateway_id.clone(),
            "VpcPeeringConnectionId": route.vpc_peering_connection_id.clone(),
            "NetworkInterfaceId": route.network_interface_id.clone(),
            "InstanceId": route.instance_id.clone(),
            "State": route.state.as_ref().map(|s| s.as_str()),
        })).collect::<Vec<_>>(),
        "Associations": table.associations.iter().flatten().map(|assoc| json!({
            "RouteTableAssociationId": assoc.route_table_association_id.clone(),
            "SubnetId": assoc.subnet_id.clone(),
            "GatewayId": assoc.gateway_id.clone(),
            "Main": assoc.main,
        })).collect::<Vec<_>>(),
        "Tags": tags_to_json(table.tags.as_ref()),
    })
}

fn vpc_endpoint_to_json(endpoint: &ec2::types::VpcEndpoint) -> Value {
    json!({
        "VpcEndpointId": endpoint.vpc_endpoint_id.clone(),
        "VpcEndpointType": endpoint.vpc_endpoint_type.as_ref().map(|t| t.as_str()),
        "VpcId": endpoint.vpc_id.clone(),
        "ServiceName": endpoint.service_name.clone(),
        "State": endpoint.state.as_ref().map(|s| s.as_str()),
        "PolicyDocument": endpoint.policy_document.clone(),
        "RouteTableIds": endpoint.route_table_ids.clone().unwrap_or_default(),
        "SubnetIds": endpoint.subnet_ids.clone().unwrap_or_default(),
        "NetworkInterfaceIds": endpoint.network_interface_ids.clone().unwrap_or_default(),
        "Tags": tags_to_json(endpoint.tags.as_ref()),
    })
}

fn volume_to_json(volume: &ec2::types::Volume) -> Value {
    json!({
        "VolumeId": volume.volume_id.clone(),
        "Size": volume.size,
        "VolumeType": volume.volume_type.as_ref().map(|t| t.as_str()),
        "State": volume.state.as_ref().map(|s| s.as_str()),
        "Encrypted": volume.encrypted,
        "KmsKeyId": volume.kms_key_id.clone(),
        "AvailabilityZone": volume.availability_zone.clone(),
        "Iops": volume.iops,
        "CreateTime": volume.create_time.map(|t| t.to_string()),
        "Attachments": volume.attachments.iter().flatten().map(|attachment| json!({
            "InstanceId": attachment.instance_id.clone(),
            "Device": attachment.device.clone(),
            "State": attachment.state.as_ref().map(|s| s.as_str()),
        })).collect::<Vec<_>>(),
        "Tags": tags_to_json(volume.tags.as_ref()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reservations() -> Vec<Value> {
        vec![
            json!({
                "ReservationId": "r-1",
                "Instances": [
                    {"InstanceId": "i-1", "ImageId": "ami-win"},
                    {"InstanceId": "i-2", "ImageId": "ami-linux"},
                ],
            }),
            json!({
                "ReservationId": "r-2",
                "Instances": [
                    {"InstanceId": "i-3", "ImageId": "ami-win"},
                    {"InstanceId": "i-4", "ImageId": "ami-gone"},
                ],
            }),
        ]
    }

    #[test]
    fn image_ids_are_deduplicated_in_order() {
        assert_eq!(
            distinct_image_ids(&reservations()),
            vec!["ami-win", "ami-linux", "ami-gone"]
        );
    }

    #[test]
    fn windows_flag_reaches_all_instances_of_an_image() {
        let mut reservations = reservations();
        let images = vec![
            json!({"ImageId": "ami-win", "Platform": "windows"}),
            json!({"ImageId": "ami-linux"}),
        ];

        apply_windows_flag(&mut reservations, &images);

        assert_eq!(reservations[0]["Instances"][0]["IsWindows"], json!(true));
        assert_eq!(reservations[0]["Instances"][1]["IsWindows"], json!(false));
        assert_eq!(reservations[1]["Instances"][0]["IsWindows"], json!(true));
        // Deregistered image: no flag rather than a guess.
        assert_eq!(reservations[1]["Instances"][1].get("IsWindows"), None);
    }

    #[test]
    fn no_instances_means_no_image_lookup() {
        assert!(distinct_image_ids(&[]).is_empty());
    }
}
