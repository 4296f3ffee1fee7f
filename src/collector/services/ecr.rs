//! ECR repository inventory, fed by the ECS phase.
//!
//! The repository listing is decorated with the repository policy, tags,
//! and the details plus scan findings of exactly those images the ECS tasks
//! were observed running. Image references pointing at the default Docker
//! Hub namespace (no `/` in the image string) never resolve in ECR, so only
//! namespaced references get active lookups. Missing policies, images and
//! scans are all routine and map to empty values.

use crate::collector::pagers::{batch, paginate, Page};
use crate::collector::scheduler::TaskOutput;
use crate::collector::sdk_errors::{is_any_code, is_code};
use anyhow::{Context, Result};
use aws_sdk_ecr as ecr;
use ecr::types::{DescribeImagesFilter, ImageIdentifier, TagStatus};
use serde_json::{json, Map, Value};
use tracing::debug;

const DESCRIBE_IMAGES_BATCH: usize = 100;

/// A container image reference observed on a running ECS task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub digest: String,
    pub tag: String,
}

/// Extracts the image references worth looking up in ECR from the merged
/// phase-1 document: every container with a recorded digest whose image
/// string names a registry namespace. The tag is whatever follows the first
/// `:` (or `@` for digest references), defaulting to `latest`.
pub fn referenced_images(data: &Map<String, Value>) -> Vec<ImageRef> {
    let mut refs = Vec::new();
    let clusters = data.get("ecs").and_then(Value::as_array);
    for cluster in clusters.into_iter().flatten() {
        let tasks = cluster.get("tasks").and_then(Value::as_array);
        for task in tasks.into_iter().flatten() {
            let containers = task.get("containers").and_then(Value::as_array);
            for container in containers.into_iter().flatten() {
                let Some(digest) = container.get("imageDigest").and_then(Value::as_str)
                else {
                    continue;
                };
                let Some(image) = container.get("image").and_then(Value::as_str) else {
                    continue;
                };
                if !image.contains('/') {
                    continue;
                }
                let tag = if image.contains(':') {
                    image.split(':').nth(1).unwrap_or_default().to_string()
                } else if image.contains('@') {
                    image.split('@').nth(1).unwrap_or_default().to_string()
                } else {
                    "latest".to_string()
                };
                refs.push(ImageRef {
                    digest: digest.to_string(),
                    tag,
                });
            }
        }
    }
    refs
}

pub async fn describe_repositories(
    client: ecr::Client,
    images: Vec<ImageRef>,
) -> Result<TaskOutput> {
    debug!(
        images = images.len(),
        "executing ecr describe-repositories, get-repository-policy, describe-images"
    );
    let all = paginate(|token| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_repositories()
                .set_next_token(token)
                .send()
                .await
                .context("ecr describe-repositories failed")?;
            Ok::<_, anyhow::Error>(Page::new(
                resp.repositories.unwrap_or_default(),
                resp.next_token,
            ))
        }
    })
    .await?;

    let mut repositories = Vec::new();
    for repository in &all {
        let Some(name) = repository.repository_name.as_deref() else {
            continue;
        };
        let mut value = repository_to_json(repository);
        let Some(obj) = value.as_object_mut() else {
            continue;
        };
        obj.insert("policy".to_string(), repository_policy(&client, name).await?);
        obj.insert(
            "imageDetails".to_string(),
            Value::Array(image_details(&client, name, &images).await?),
        );
        if let Some(arn) = repository.repository_arn.as_deref() {
            obj.insert(
                "tags".to_string(),
                Value::Array(repository_tags(&client, arn).await?),
            );
        }
        repositories.push(value);
    }
    Ok((&["ecr"], Value::Array(repositories)))
}

/// The repository policy parsed from its JSON text; `null` when none is
/// attached.
async fn repository_policy(client: &ecr::Client, repository_name: &str) -> Result<Value> {
    let result = client
        .get_repository_policy()
        .repository_name(repository_name)
        .send()
        .await;
    match result {
        Ok(resp) => match resp.policy_text {
            Some(text) => {
                serde_json::from_str(&text).context("ecr repository policy is not valid JSON")
            }
            None => Ok(Value::Null),
        },
        Err(err) if is_code(&err, "RepositoryPolicyNotFoundException") => Ok(Value::Null),
        Err(err) => Err(err).context("ecr get-repository-policy failed"),
    }
}

/// Details for the referenced images that live in this repository, each
/// matched detail carrying the scan findings for its reference.
async fn image_details(
    client: &ecr::Client,
    repository_name: &str,
    images: &[ImageRef],
) -> Result<Vec<Value>> {
    if images.is_empty() {
        return Ok(Vec::new());
    }

    let result = batch(images, DESCRIBE_IMAGES_BATCH, |chunk| {
        let client = client.clone();
        let repository_name = repository_name.to_string();
        async move {
            let image_ids: Vec<ImageIdentifier> = chunk
                .iter()
                .map(|image| {
                    ImageIdentifier::builder()
                        .image_digest(&image.digest)
                        .image_tag(&image.tag)
                        .build()
                })
                .collect();
            let resp = client
                .describe_images()
                .repository_name(repository_name)
                .set_image_ids(Some(image_ids))
                .filter(
                    DescribeImagesFilter::builder()
                        .tag_status(TagStatus::Tagged)
                        .build(),
                )
                .send()
                .await?;
            Ok(resp.image_details.unwrap_or_default())
        }
    })
    .await;
    let details = match result {
        Ok(details) => details,
        // None of the referenced images exist in this repository.
        Err(err) if is_code(&err, "ImageNotFoundException") => return Ok(Vec::new()),
        Err(err) => return Err(err).context("ecr describe-images failed"),
    };

    let mut values = Vec::new();
    for detail in &details {
        let mut value = image_detail_to_json(detail);
        let matched = images.iter().find(|image| {
            detail.image_digest.as_deref() == Some(image.digest.as_str())
                && detail
                    .image_tags
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .any(|tag| tag == &image.tag)
        });
        if let (Some(image), Some(obj)) = (matched, value.as_object_mut()) {
            obj.insert(
                "findings".to_string(),
                Value::Array(scan_findings(client, repository_name, image).await?),
            );
        }
        values.push(value);
    }
    Ok(values)
}

async fn scan_findings(
    client: &ecr::Client,
    repository_name: &str,
    image: &ImageRef,
) -> Result<Vec<Value>> {
    let result = paginate(|token| {
        let client = client.clone();
        let repository_name = repository_name.to_string();
        let image_id = ImageIdentifier::builder()
            .image_digest(&image.digest)
            .image_tag(&image.tag)
            .build();
        async move {
            let resp = client
                .describe_image_scan_findings()
                .repository_name(repository_name)
                .image_id(image_id)
                .set_next_token(token)
                .send()
                .await?;
            Ok(Page::new(
                resp.image_scan_findings
                    .as_ref()
                    .map(|findings| {
                        findings
                            .findings
                            .iter()
                            .flatten()
                            .map(|finding| {
                                json!({
                                    "name": finding.name.clone(),
                                    "severity": finding.severity.as_ref().map(|s| s.as_str()),
                                    "description": finding.description.clone(),
                                    "uri": finding.uri.clone(),
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
                resp.next_token,
            ))
        }
    })
    .await;
    match result {
        Ok(findings) => Ok(findings),
        Err(err) if is_any_code(&err, &["ImageNotFoundException", "ScanNotFoundException"]) => {
            Ok(Vec::new())
        }
        Err(err) => Err(err).context("ecr describe-image-scan-findings failed"),
    }
}

async fn repository_tags(client: &ecr::Client, repository_arn: &str) -> Result<Vec<Value>> {
    let resp = client
        .list_tags_for_resource()
        .resource_arn(repository_arn)
        .send()
        .await
        .context("ecr list-tags-for-resource failed")?;
    Ok(resp
        .tags
        .unwrap_or_default()
        .iter()
        .map(|tag| {
            json!({
                "Key": tag.key.clone(),
                "Value": tag.value.clone(),
            })
        })
        .collect())
}

fn repository_to_json(repository: &ecr::types::Repository) -> Value {
    json!({
        "repositoryArn": repository.repository_arn.clone(),
        "registryId": repository.registry_id.clone(),
        "repositoryName": repository.repository_name.clone(),
        "repositoryUri": repository.repository_uri.clone(),
        "createdAt": repository.created_at.map(|t| t.to_string()),
        "imageTagMutability": repository.image_tag_mutability.as_ref().map(|m| m.as_str()),
        "imageScanningConfiguration": {
            "scanOnPush": repository
                .image_scanning_configuration
                .as_ref()
                .map(|c| c.scan_on_push),
        },
    })
}

fn image_detail_to_json(detail: &ecr::types::ImageDetail) -> Value {
    json!({
        "registryId": detail.registry_id.clone(),
        "repositoryName": detail.repository_name.clone(),
        "imageDigest": detail.image_digest.clone(),
        "imageTags": detail.image_tags.clone().unwrap_or_default(),
        "imageSizeInBytes": detail.image_size_in_bytes,
        "imagePushedAt": detail.image_pushed_at.map(|t| t.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn phase1(containers: Value) -> Map<String, Value> {
        let Value::Object(map) = json!({
            "ecs": [{"clusterName": "main", "tasks": [{"containers": containers}]}],
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn tag_follows_first_colon() {
        let refs = referenced_images(&phase1(json!([
            {"image": "123.dkr.ecr.eu-west-1.amazonaws.com/app:v1.2", "imageDigest": "sha256:a"},
        ])));
        assert_eq!(
            refs,
            vec![ImageRef {
                digest: "sha256:a".to_string(),
                tag: "v1.2".to_string()
            }]
        );
    }

    #[test]
    fn digest_reference_splits_on_colon_before_at() {
        // A digest reference still contains a colon, and the colon wins.
        let refs = referenced_images(&phase1(json!([
            {"image": "quay.io/app@sha256:abc", "imageDigest": "sha256:abc"},
        ])));
        assert_eq!(refs[0].tag, "abc");
    }

    #[test]
    fn untagged_reference_defaults_to_latest() {
        let refs = referenced_images(&phase1(json!([
            {"image": "registry.local/app", "imageDigest": "sha256:b"},
        ])));
        assert_eq!(refs[0].tag, "latest");
    }

    #[test]
    fn default_namespace_and_digestless_containers_are_skipped() {
        let refs = referenced_images(&phase1(json!([
            {"image": "nginx:1.25", "imageDigest": "sha256:c"},
            {"image": "registry.local/app:v1"},
        ])));
        assert!(refs.is_empty());
    }

    #[test]
    fn missing_ecs_data_yields_no_references() {
        assert!(referenced_images(&Map::new()).is_empty());
    }
}
