//! Auto Scaling launch configuration inventory.

use crate::collector::pagers::{paginate, Page};
use crate::collector::scheduler::TaskOutput;
use anyhow::{Context, Result};
use aws_sdk_autoscaling as autoscaling;
use serde_json::{json, Value};
use tracing::debug;

pub async fn describe_launch_configurations(
    client: autoscaling::Client,
) -> Result<TaskOutput> {
    debug!("executing autoscaling describe-launch-configurations");
    let configurations = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_launch_configurations()
                .set_next_token(token)
                .send()
                .await
                .context("autoscaling describe-launch-configurations failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.launch_configurations
                    .unwrap_or_default()
                    .iter()
                    .map(launch_configuration_to_json)
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await?;
    Ok((
        &["launchconfigs", "LaunchConfigurations"],
        Value::Array(configurations),
    ))
}

fn launch_configuration_to_json(lc: &autoscaling::types::LaunchConfiguration) -> Value {
    json!({
        "LaunchConfigurationName": lc.launch_configuration_name.clone(),
        "LaunchConfigurationARN": lc.launch_configuration_arn.clone(),
        "ImageId": lc.image_id.clone(),
        "InstanceType": lc.instance_type.clone(),
        "KeyName": lc.key_name.clone(),
        "SecurityGroups": lc.security_groups.clone().unwrap_or_default(),
        "IamInstanceProfile": lc.iam_instance_profile.clone(),
        "AssociatePublicIpAddress": lc.associate_public_ip_address,
        "CreatedTime": lc.created_time.to_string(),
    })
}
