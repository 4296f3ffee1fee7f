//! Per-service collection tasks.
//!
//! Each module owns the task bodies for one AWS service family. Task
//! functions take an owned client clone, perform the family's listing and
//! enrichment calls through the pagination helpers, and return the JSON
//! subtree together with its location in the region document. Field names
//! mirror the service wire shapes (PascalCase for the query-protocol
//! services, lowerCamel for ECS/ECR), so downstream consumers see the same
//! document layout regardless of which service produced it.

pub mod apigateway;
pub mod apigatewayv2;
pub mod autoscaling;
pub mod dynamodb;
pub mod ec2;
pub mod ecr;
pub mod ecs;
pub mod elb;
pub mod elbv2;
pub mod guardduty;
pub mod inspector;
pub mod kms;
pub mod lambda;
pub mod rds;
pub mod transit_gateway;
pub mod wafv2;
