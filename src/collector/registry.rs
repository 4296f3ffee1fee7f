//! The task registry: which tasks run, in which phase, behind which flags.
//!
//! Phase 1 carries every family except ECR; phase 2 is the single ECR task,
//! built over phase 1's merged output so it can chase the image digests ECS
//! reported. Tasks declare the services they call and are dropped up front
//! when the region does not host one of them. The WAF v2 tasks declare no
//! required services: the published capability metadata for wafv2 is wrong
//! often enough that filtering on it would drop real data.

use crate::collector::capability::RegionSupport;
use crate::collector::clients::ClientCache;
use crate::collector::scheduler::CollectionTask;
use crate::collector::services;
use aws_sdk_wafv2::types::Scope;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

/// Opt-in switches for the billed or noisy task families.
#[derive(Debug, Clone, Copy)]
pub struct TaskFlags {
    pub include_inspector: bool,
    pub include_guardduty: bool,
}

/// Every service the phase-1 registry may require, for the capability
/// probe. wafv2 is deliberately absent.
pub fn candidate_services(flags: TaskFlags) -> Vec<&'static str> {
    let mut services = vec![
        "ec2",
        "elb",
        "elbv2",
        "autoscaling",
        "rds",
        "lambda",
        "kms",
        "dynamodb",
        "ecs",
        "apigateway",
        "apigatewayv2",
    ];
    if flags.include_inspector {
        services.push("inspector");
    }
    if flags.include_guardduty {
        services.push("guardduty");
    }
    services
}

pub fn build_phase1_tasks(
    clients: &Arc<ClientCache>,
    support: &RegionSupport,
    flags: TaskFlags,
) -> Vec<CollectionTask> {
    let mut tasks = Vec::new();
    let mut add = |task: CollectionTask| {
        if task
            .required_services()
            .iter()
            .all(|service| support.supports(service))
        {
            tasks.push(task);
        } else {
            info!(task = task.name(), "skipping task, unsupported in this region");
        }
    };

    add(CollectionTask::new(
        "ec2_describe_instances",
        &["ec2"],
        services::ec2::describe_instances(clients.ec2()),
    ));
    add(CollectionTask::new(
        "ec2_describe_network_interfaces",
        &["ec2"],
        services::ec2::describe_network_interfaces(clients.ec2()),
    ));
    add(CollectionTask::new(
        "ec2_describe_security_groups",
        &["ec2"],
        services::ec2::describe_security_groups(clients.ec2()),
    ));
    add(CollectionTask::new(
        "ec2_describe_subnets",
        &["ec2"],
        services::ec2::describe_subnets(clients.ec2()),
    ));
    add(CollectionTask::new(
        "ec2_describe_network_acls",
        &["ec2"],
        services::ec2::describe_network_acls(clients.ec2()),
    ));
    add(CollectionTask::new(
        "ec2_describe_vpcs",
        &["ec2"],
        services::ec2::describe_vpcs(clients.ec2()),
    ));
    add(CollectionTask::new(
        "ec2_describe_vpc_peering_connections",
        &["ec2"],
        services::ec2::describe_vpc_peering_connections(clients.ec2()),
    ));
    add(CollectionTask::new(
        "ec2_describe_internet_gateways",
        &["ec2"],
        services::ec2::describe_internet_gateways(clients.ec2()),
    ));
    add(CollectionTask::new(
        "ec2_describe_vpn_gateways",
        &["ec2"],
        services::ec2::describe_vpn_gateways(clients.ec2()),
    ));
    add(CollectionTask::new(
        "ec2_describe_nat_gateways",
        &["ec2"],
        services::ec2::describe_nat_gateways(clients.ec2()),
    ));
    add(CollectionTask::new(
        "ec2_describe_route_tables",
        &["ec2"],
        services::ec2::describe_route_tables(clients.ec2()),
    ));
    add(CollectionTask::new(
        "ec2_describe_vpc_endpoints",
        &["ec2"],
        services::ec2::describe_vpc_endpoints(clients.ec2()),
    ));
    add(CollectionTask::new(
        "ec2_describe_volumes",
        &["ec2"],
        services::ec2::describe_volumes(clients.ec2()),
    ));
    add(CollectionTask::new(
        "ec2_describe_transit_gateways",
        &["ec2"],
        services::transit_gateway::describe_transit_gateways(clients.ec2()),
    ));
    add(CollectionTask::new(
        "elb_describe_load_balancers",
        &["elb"],
        services::elb::describe_load_balancers(clients.elb()),
    ));
    add(CollectionTask::new(
        "elbv2_describe_load_balancers",
        &["elbv2"],
        services::elbv2::describe_load_balancers(clients.elbv2()),
    ));
    add(CollectionTask::new(
        "elbv2_describe_target_groups",
        &["elbv2"],
        services::elbv2::describe_target_groups(clients.elbv2()),
    ));
    add(CollectionTask::new(
        "autoscaling_describe_launch_configurations",
        &["autoscaling"],
        services::autoscaling::describe_launch_configurations(clients.autoscaling()),
    ));
    add(CollectionTask::new(
        "rds_describe_db_instances",
        &["rds"],
        services::rds::describe_db_instances(clients.rds()),
    ));
    add(CollectionTask::new(
        "rds_describe_db_subnet_groups",
        &["rds"],
        services::rds::describe_db_subnet_groups(clients.rds()),
    ));
    add(CollectionTask::new(
        "rds_describe_db_clusters",
        &["rds"],
        services::rds::describe_db_clusters(clients.rds()),
    ));
    add(CollectionTask::new(
        "lambda_list_functions",
        &["lambda"],
        services::lambda::list_functions(clients.lambda()),
    ));
    add(CollectionTask::new(
        "kms_list_keys",
        &["kms"],
        services::kms::list_keys(clients.kms()),
    ));
    if flags.include_inspector {
        add(CollectionTask::new(
            "inspector_describe_findings",
            &["inspector"],
            services::inspector::describe_findings(clients.inspector()),
        ));
    }
    add(CollectionTask::new(
        "dynamodb_list_tables",
        &["dynamodb"],
        services::dynamodb::list_tables(clients.dynamodb()),
    ));
    add(CollectionTask::new(
        "ecs_describe_clusters",
        &["ecs"],
        services::ecs::describe_clusters(clients.ecs()),
    ));
    add(CollectionTask::new(
        "apigateway_get_rest_apis",
        &["apigateway"],
        services::apigateway::get_rest_apis(clients.apigateway()),
    ));
    add(CollectionTask::new(
        "apigateway_get_usage_plans",
        &["apigateway"],
        services::apigateway::get_usage_plans(clients.apigateway()),
    ));
    add(CollectionTask::new(
        "apigatewayv2_get_apis",
        &["apigatewayv2"],
        services::apigatewayv2::get_apis(clients.apigatewayv2()),
    ));
    if flags.include_guardduty {
        add(CollectionTask::new(
            "guardduty_get_findings",
            &["guardduty"],
            services::guardduty::get_findings(clients.guardduty()),
        ));
    }
    add(CollectionTask::new(
        "wafv2_get_web_acls",
        &[],
        services::wafv2::web_acls(clients.wafv2(), Scope::Regional),
    ));
    add(CollectionTask::new(
        "wafv2_get_ip_sets",
        &[],
        services::wafv2::ip_sets(clients.wafv2(), Scope::Regional),
    ));

    tasks
}

/// The ECR task runs after phase 1 so it can restrict image lookups to the
/// digests actually observed on running ECS tasks. No capability filter:
/// the original registration never applied one to ECR either.
pub fn build_phase2_tasks(
    clients: &Arc<ClientCache>,
    phase1_data: &Map<String, Value>,
) -> Vec<CollectionTask> {
    let images = services::ecr::referenced_images(phase1_data);
    vec![CollectionTask::new(
        "ecr_describe_repositories",
        &["ecr"],
        services::ecr::describe_repositories(clients.ecr(), images),
    )]
}

/// The two global WAF v2 tasks for the CloudFront scope.
pub fn build_cloudfront_waf_tasks(clients: &Arc<ClientCache>) -> Vec<CollectionTask> {
    vec![
        CollectionTask::new(
            "wafv2_get_web_acls",
            &[],
            services::wafv2::web_acls(clients.wafv2(), Scope::Cloudfront),
        ),
        CollectionTask::new(
            "wafv2_get_ip_sets",
            &[],
            services::wafv2::ip_sets(clients.wafv2(), Scope::Cloudfront),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_config::BehaviorVersion;
    use aws_types::region::Region;
    use aws_types::SdkConfig;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn clients() -> Arc<ClientCache> {
        Arc::new(ClientCache::new(
            SdkConfig::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new("eu-west-1"))
                .build(),
        ))
    }

    fn support(services: &[&'static str]) -> RegionSupport {
        RegionSupport::new(services.iter().copied().collect())
    }

    const ALL: &[&'static str] = &[
        "ec2",
        "elb",
        "elbv2",
        "autoscaling",
        "rds",
        "lambda",
        "kms",
        "dynamodb",
        "ecs",
        "apigateway",
        "apigatewayv2",
        "inspector",
        "guardduty",
    ];

    #[tokio::test]
    async fn flags_gate_the_optional_families() {
        let clients = clients();
        let support = support(ALL);
        let default_flags = TaskFlags {
            include_inspector: false,
            include_guardduty: false,
        };
        let names: HashSet<&str> = build_phase1_tasks(&clients, &support, default_flags)
            .iter()
            .map(|task| task.name())
            .collect();
        assert!(!names.contains("inspector_describe_findings"));
        assert!(!names.contains("guardduty_get_findings"));

        let all_flags = TaskFlags {
            include_inspector: true,
            include_guardduty: true,
        };
        let names: HashSet<&str> = build_phase1_tasks(&clients, &support, all_flags)
            .iter()
            .map(|task| task.name())
            .collect();
        assert!(names.contains("inspector_describe_findings"));
        assert!(names.contains("guardduty_get_findings"));
    }

    #[tokio::test]
    async fn unsupported_services_drop_their_tasks_but_keep_wafv2() {
        let clients = clients();
        let support = support(&["ec2"]);
        let flags = TaskFlags {
            include_inspector: false,
            include_guardduty: false,
        };
        let names: HashSet<&str> = build_phase1_tasks(&clients, &support, flags)
            .iter()
            .map(|task| task.name())
            .collect();
        assert!(names.contains("ec2_describe_vpcs"));
        assert!(!names.contains("rds_describe_db_instances"));
        assert!(!names.contains("ecs_describe_clusters"));
        // No required services declared, so never filtered.
        assert!(names.contains("wafv2_get_web_acls"));
        assert!(names.contains("wafv2_get_ip_sets"));
    }

    #[tokio::test]
    async fn candidate_services_follow_the_flags() {
        let base = candidate_services(TaskFlags {
            include_inspector: false,
            include_guardduty: false,
        });
        assert!(!base.contains(&"inspector"));
        assert!(!base.contains(&"guardduty"));
        assert!(!base.contains(&"wafv2"));

        let full = candidate_services(TaskFlags {
            include_inspector: true,
            include_guardduty: true,
        });
        assert_eq!(full.len(), base.len() + 2);
    }

    #[tokio::test]
    async fn phase2_is_exactly_the_ecr_task() {
        let clients = clients();
        let tasks = build_phase2_tasks(&clients, &Map::new());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name(), "ecr_describe_repositories");
    }
}
