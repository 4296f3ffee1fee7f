//! DynamoDB table inventory: every table described and tagged.

use crate::collector::pagers::{paginate, Page};
use crate::collector::scheduler::TaskOutput;
use anyhow::{Context, Result};
use aws_sdk_dynamodb as dynamodb;
use serde_json::{json, Value};
use tracing::debug;

pub async fn list_tables(client: dynamodb::Client) -> Result<TaskOutput> {
    debug!("executing dynamodb list-tables, describe-table, list-tags-of-resource");
    let table_names = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .list_tables()
                .set_exclusive_start_table_name(token)
                .send()
                .await
                .context("dynamodb list-tables failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.table_names.unwrap_or_default(),
                resp.last_evaluated_table_name,
            ))
        }
    })
    .await?;

    let mut tables = Vec::new();
    for table_name in &table_names {
        let resp = client
            .describe_table()
            .table_name(table_name)
            .send()
            .await
            .context("dynamodb describe-table failed")?;
        let Some(table) = resp.table else {
            continue;
        };
        let mut value = table_to_json(&table);
        if let (Some(arn), Some(obj)) = (table.table_arn.as_deref(), value.as_object_mut()) {
            obj.insert(
                "Tags".to_string(),
                Value::Array(table_tags(&client, arn).await?),
            );
        }
        tables.push(value);
    }
    Ok((&["dynamodb", "Tables"], Value::Array(tables)))
}

async fn table_tags(client: &dynamodb::Client, table_arn: &str) -> Result<Vec<Value>> {
    paginate(|token| {
        let client = client.clone();
        let table_arn = table_arn.to_string();
        async move {
            let resp = client
                .list_tags_of_resource()
                .resource_arn(table_arn)
                .set_next_token(token)
                .send()
                .await
                .context("dynamodb list-tags-of-resource failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.tags
                    .unwrap_or_default()
                    .iter()
                    .map(|tag| {
                        json!({
                            "Key": tag.key.clone(),
                            "Value": tag.value.clone(),
                        })
                    })
                    .collect(),
                resp.next_token,
            ))
        }
    })
    .await
}

fn table_to_json(table: &dynamodb::types::TableDescription) -> Value {
    json!({
        "TableName": table.table_name.clone(),
        "TableArn": table.table_arn.clone(),
        "TableStatus": table.table_status.as_ref().map(|s| s.as_str()),
        "ItemCount": table.item_count,
        "TableSizeBytes": table.table_size_bytes,
        "CreationDateTime": table.creation_date_time.map(|t| t.to_string()),
        "KeySchema": table.key_schema.iter().flatten().map(|element| json!({
            "AttributeName": element.attribute_name.clone(),
            "KeyType": element.key_type.as_str(),
        })).collect::<Vec<_>>(),
        "AttributeDefinitions": table.attribute_definitions.iter().flatten()
            .map(|definition| json!({
                "AttributeName": definition.attribute_name.clone(),
                "AttributeType": definition.attribute_type.as_str(),
            }))
            .collect::<Vec<_>>(),
        "BillingModeSummary": {
            "BillingMode": table
                .billing_mode_summary
                .as_ref()
                .and_then(|s| s.billing_mode.as_ref())
                .map(|m| m.as_str()),
        },
        "SSEDescription": {
            "Status": table
                .sse_description
                .as_ref()
                .and_then(|d| d.status.as_ref())
                .map(|s| s.as_str()),
            "KMSMasterKeyArn": table
                .sse_description
                .as_ref()
                .and_then(|d| d.kms_master_key_arn.clone()),
        },
        "GlobalSecondaryIndexes": table.global_secondary_indexes.iter().flatten()
            .map(|index| json!({
                "IndexName": index.index_name.clone(),
                "IndexArn": index.index_arn.clone(),
                "IndexStatus": index.index_status.as_ref().map(|s| s.as_str()),
            }))
            .collect::<Vec<_>>(),
    })
}
