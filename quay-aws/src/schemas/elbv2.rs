//! Application Load Balancer schemas (AWS::ElasticLoadBalancingV2::*)

use quay_core::schema::{AttributeType, ResourceSchema, types as core_types};

use super::{AwsccSchemaConfig, property, tags_type};

fn strings() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::String))
}

fn http() -> AttributeType {
    AttributeType::Enum(vec!["HTTP".to_string(), "HTTPS".to_string()])
}

pub fn load_balancer_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ElasticLoadBalancingV2::LoadBalancer",
        has_tags: true,
        schema: ResourceSchema::new("elbv2.load_balancer")
            .attribute(property("name", AttributeType::String).create_only())
            .attribute(
                property(
                    "scheme",
                    AttributeType::Enum(vec![
                        "internet-facing".to_string(),
                        "internal".to_string(),
                    ]),
                )
                .create_only(),
            )
            .attribute(
                property("type", AttributeType::Enum(vec!["application".to_string()]))
                    .create_only(),
            )
            .attribute(property("subnets", strings()).required())
            .attribute(property("security_groups", strings()))
            .attribute(property(
                "load_balancer_attributes",
                AttributeType::List(Box::new(AttributeType::Map(Box::new(
                    AttributeType::String,
                )))),
            ))
            .attribute(property("tags", tags_type()))
            .attribute(property("load_balancer_arn", AttributeType::String).read_only())
            .attribute(
                property("dns_name", AttributeType::String)
                    .with_provider_name("DNSName")
                    .read_only(),
            )
            .attribute(
                property("canonical_hosted_zone_id", AttributeType::String)
                    .with_provider_name("CanonicalHostedZoneID")
                    .read_only(),
            ),
    }
}

pub fn target_group_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ElasticLoadBalancingV2::TargetGroup",
        has_tags: true,
        schema: ResourceSchema::new("elbv2.target_group")
            .attribute(property("name", AttributeType::String).create_only())
            .attribute(property("port", core_types::port_number()).required().create_only())
            .attribute(property("protocol", http()).required().create_only())
            .attribute(
                property(
                    "target_type",
                    AttributeType::Enum(vec!["ip".to_string(), "instance".to_string()]),
                )
                .create_only(),
            )
            .attribute(property("vpc_id", AttributeType::String).required().create_only())
            .attribute(property("health_check_path", AttributeType::String))
            .attribute(property("health_check_protocol", http()))
            .attribute(property("tags", tags_type()))
            .attribute(property("target_group_arn", AttributeType::String).read_only()),
    }
}

pub fn listener_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ElasticLoadBalancingV2::Listener",
        has_tags: false,
        schema: ResourceSchema::new("elbv2.listener")
            .attribute(
                property("load_balancer_arn", AttributeType::String)
                    .required()
                    .create_only(),
            )
            .attribute(property("port", core_types::port_number()).required())
            .attribute(property("protocol", http()).required())
            .attribute(
                property(
                    "default_actions",
                    AttributeType::List(Box::new(AttributeType::Map(Box::new(
                        AttributeType::String,
                    )))),
                )
                .required(),
            )
            .attribute(property("listener_arn", AttributeType::String).read_only()),
    }
}
