//! KMS key inventory with the default key policy and resource tags.
//!
//! ListResourceTags is commonly denied even to read-only auditing roles;
//! that exact denial degrades to an empty tag list instead of failing the
//! whole key family.

use crate::collector::pagers::{paginate, Page};
use crate::collector::scheduler::TaskOutput;
use crate::collector::sdk_errors::is_code;
use anyhow::{Context, Result};
use aws_sdk_kms as kms;
use serde_json::{json, Value};
use tracing::debug;

pub async fn list_keys(client: kms::Client) -> Result<TaskOutput> {
    debug!("executing kms list-keys, get-key-policy, list-resource-tags");
    let entries = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .list_keys()
                .set_marker(token)
                .send()
                .await
                .context("kms list-keys failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.keys.unwrap_or_default(),
                resp.next_marker,
            ))
        }
    })
    .await?;

    let mut keys = Vec::new();
    for entry in &entries {
        let Some(key_id) = entry.key_id.as_deref() else {
            continue;
        };
        keys.push(json!({
            "KeyId": entry.key_id.clone(),
            "KeyArn": entry.key_arn.clone(),
            "Policy": key_policy(&client, key_id).await?,
            "Tags": key_tags(&client, key_id).await?,
        }));
    }
    Ok((&["kms", "Keys"], Value::Array(keys)))
}

/// The default key policy, parsed from its JSON text.
async fn key_policy(client: &kms::Client, key_id: &str) -> Result<Value> {
    let resp = client
        .get_key_policy()
        .key_id(key_id)
        .policy_name("default")
        .send()
        .await
        .context("kms get-key-policy failed")?;
    match resp.policy {
        Some(text) => {
            serde_json::from_str(&text).context("kms key policy is not valid JSON")
        }
        None => Ok(Value::Null),
    }
}

async fn key_tags(client: &kms::Client, key_id: &str) -> Result<Value> {
    let result = client.list_resource_tags().key_id(key_id).send().await;
    match result {
        Ok(resp) => {
            let tags: Vec<Value> = resp
                .tags
                .unwrap_or_default()
                .iter()
                .map(|tag| {
                    json!({
                        "TagKey": tag.tag_key.clone(),
                        "TagValue": tag.tag_value.clone(),
                    })
                })
                .collect();
            Ok(Value::Array(tags))
        }
        // No policy grants kms:ListResourceTags on this key.
        Err(err) if is_code(&err, "AccessDeniedException") => Ok(Value::Array(Vec::new())),
        Err(err) => Err(err).context("kms list-resource-tags failed"),
    }
}
