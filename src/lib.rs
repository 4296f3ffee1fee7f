//! Concurrent AWS region inventory collection.
//!
//! This crate walks the service APIs of one AWS region with a bounded level
//! of concurrency and produces a single nested JSON document describing the
//! region's resources: EC2 networking and compute, load balancers, RDS,
//! Lambda, KMS, DynamoDB, ECS/ECR, API Gateway, WAF v2, and (optionally)
//! Inspector and GuardDuty findings.
//!
//! The two entry points are [`collect`], which merges a region's inventory
//! into a caller-supplied JSON object, and [`collect_cloudfront_waf`], which
//! gathers the globally scoped CloudFront WAF v2 resources through the
//! `us-east-1` endpoint.
//!
//! Collection runs in two phases: phase 1 covers every independent resource
//! family, and phase 2 enriches ECR repositories using the container image
//! digests discovered in phase 1's ECS data. A failing resource family is
//! reported and skipped; it never aborts the rest of the region.

pub mod collector;

pub use collector::{collect, collect_cloudfront_waf, Credentials};
