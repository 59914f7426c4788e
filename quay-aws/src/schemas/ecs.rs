//! ECS schemas (AWS::ECS::Cluster, TaskDefinition, Service)

use quay_core::schema::{AttributeType, ResourceSchema, types as core_types};

use super::{AwsccSchemaConfig, property, tags_type, types};

fn any_list() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::Any))
}

fn any_map() -> AttributeType {
    AttributeType::Map(Box::new(AttributeType::Any))
}

/// CPU units Fargate accepts for a task
pub fn fargate_cpu() -> AttributeType {
    AttributeType::Enum(
        ["256", "512", "1024", "2048", "4096"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    )
}

pub fn cluster_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ECS::Cluster",
        has_tags: true,
        schema: ResourceSchema::new("ecs.cluster")
            .attribute(property("cluster_name", AttributeType::String).create_only())
            .attribute(
                property("cluster_settings", any_list())
                    .with_description("e.g. containerInsights = enabled"),
            )
            .attribute(property("tags", tags_type()))
            .attribute(property("arn", AttributeType::String).read_only()),
    }
}

pub fn task_definition_config() -> AwsccSchemaConfig {
    // Task definitions are immutable revisions: every property forces
    // replacement. A deregistered revision keeps serving the tasks already
    // running from it until the service moves on.
    AwsccSchemaConfig {
        aws_type_name: "AWS::ECS::TaskDefinition",
        has_tags: true,
        schema: ResourceSchema::new("ecs.task_definition")
            .deletable_while_referenced()
            .attribute(property("family", AttributeType::String).required().create_only())
            .attribute(property("cpu", fargate_cpu()).required().create_only())
            .attribute(property("memory", AttributeType::String).required().create_only())
            .attribute(
                property(
                    "network_mode",
                    AttributeType::Enum(vec!["awsvpc".to_string()]),
                )
                .create_only(),
            )
            .attribute(
                property(
                    "requires_compatibilities",
                    AttributeType::List(Box::new(AttributeType::Enum(vec![
                        "FARGATE".to_string(),
                    ]))),
                )
                .create_only(),
            )
            .attribute(property("execution_role_arn", types::arn()).required().create_only())
            .attribute(property("task_role_arn", types::arn()).create_only())
            .attribute(property("runtime_platform", any_map()).create_only())
            .attribute(
                property("container_definitions", any_list())
                    .required()
                    .create_only(),
            )
            .attribute(property("tags", tags_type()))
            .attribute(property("task_definition_arn", AttributeType::String).read_only()),
    }
}

pub fn service_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ECS::Service",
        has_tags: true,
        schema: ResourceSchema::new("ecs.service")
            .attribute(property("service_name", AttributeType::String).create_only())
            .attribute(property("cluster", AttributeType::String).required().create_only())
            .attribute(property("task_definition", AttributeType::String).required())
            .attribute(property("desired_count", core_types::non_negative_int()))
            .attribute(
                property(
                    "launch_type",
                    AttributeType::Enum(vec!["FARGATE".to_string()]),
                )
                .create_only(),
            )
            .attribute(property("network_configuration", any_map()))
            .attribute(property("load_balancers", any_list()).create_only())
            .attribute(property(
                "health_check_grace_period_seconds",
                core_types::non_negative_int(),
            ))
            .attribute(property("tags", tags_type()))
            .attribute(property("service_arn", AttributeType::String).read_only()),
    }
}
