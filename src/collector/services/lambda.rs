//! Lambda function inventory with per-function tags.

use crate::collector::pagers::{paginate, Page};
use crate::collector::scheduler::TaskOutput;
use anyhow::{Context, Result};
use aws_sdk_lambda as lambda;
use serde_json::{json, Value};
use tracing::debug;

pub async fn list_functions(client: lambda::Client) -> Result<TaskOutput> {
    debug!("executing lambda list-functions, list-tags");
    let all = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .list_functions()
                .set_marker(token)
                .send()
                .await
                .context("lambda list-functions failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.functions.unwrap_or_default(),
                resp.next_marker,
            ))
        }
    })
    .await?;

    let mut functions = Vec::new();
    for function in &all {
        let mut value = function_to_json(function);
        if let (Some(arn), Some(obj)) = (function.function_arn.as_deref(), value.as_object_mut())
        {
            let resp = client
                .list_tags()
                .resource(arn)
                .send()
                .await
                .context("lambda list-tags failed")?;
            obj.insert("Tags".to_string(), json!(resp.tags.unwrap_or_default()));
        }
        functions.push(value);
    }
    Ok((&["lambda", "Functions"], Value::Array(functions)))
}

fn function_to_json(function: &lambda::types::FunctionConfiguration) -> Value {
    json!({
        "FunctionName": function.function_name.clone(),
        "FunctionArn": function.function_arn.clone(),
        "Runtime": function.runtime.as_ref().map(|r| r.as_str()),
        "Role": function.role.clone(),
        "Handler": function.handler.clone(),
        "Timeout": function.timeout,
        "MemorySize": function.memory_size,
        "LastModified": function.last_modified.clone(),
        "KMSKeyArn": function.kms_key_arn.clone(),
        "VpcConfig": {
            "VpcId": function.vpc_config.as_ref().and_then(|c| c.vpc_id.clone()),
            "SubnetIds": function
                .vpc_config
                .as_ref()
                .and_then(|c| c.subnet_ids.clone())
                .unwrap_or_default(),
            "SecurityGroupIds": function
                .vpc_config
                .as_ref()
                .and_then(|c| c.security_group_ids.clone())
                .unwrap_or_default(),
        },
    })
}
