//! AWS resource schemas
//!
//! Cloud Control resource types carry their CloudFormation type name and the
//! CloudFormation property name of every attribute. Docker types are handled
//! by the image provider and only need a schema for validation.

use std::collections::HashMap;

use heck::ToUpperCamelCase;
use quay_core::resource::Value;
use quay_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

pub mod docker;
pub mod ec2;
pub mod ecr;
pub mod ecs;
pub mod elbv2;
pub mod iam;
pub mod logs;
pub mod s3;

/// AWS Cloud Control schema configuration
///
/// Combines the ResourceSchema with AWS-specific metadata.
#[derive(Debug, Clone)]
pub struct AwsccSchemaConfig {
    /// AWS CloudFormation type name (e.g., "AWS::EC2::VPC")
    pub aws_type_name: &'static str,
    /// Whether this resource type uses tags
    pub has_tags: bool,
    /// The resource schema with attribute definitions
    pub schema: ResourceSchema,
}

/// Tags type for AWS resources (map of key to value)
pub fn tags_type() -> AttributeType {
    AttributeType::Map(Box::new(AttributeType::String))
}

/// Attribute whose CloudFormation name is the UpperCamelCase form of its name
pub fn property(name: &str, attr_type: AttributeType) -> AttributeSchema {
    AttributeSchema::new(name, attr_type).with_provider_name(name.to_upper_camel_case())
}

/// Returns all Cloud Control schema configs
pub fn configs() -> Vec<AwsccSchemaConfig> {
    vec![
        ec2::vpc_config(),
        ec2::subnet_config(),
        ec2::internet_gateway_config(),
        ec2::vpc_gateway_attachment_config(),
        ec2::route_table_config(),
        ec2::route_config(),
        ec2::subnet_route_table_association_config(),
        ec2::eip_config(),
        ec2::nat_gateway_config(),
        ec2::security_group_config(),
        ec2::security_group_ingress_config(),
        ec2::flow_log_config(),
        ecr::repository_config(),
        ecs::cluster_config(),
        ecs::task_definition_config(),
        ecs::service_config(),
        elbv2::load_balancer_config(),
        elbv2::target_group_config(),
        elbv2::listener_config(),
        iam::role_config(),
        logs::log_group_config(),
        s3::bucket_config(),
        s3::bucket_policy_config(),
    ]
}

/// Every schema the stack uses, keyed by resource type
pub fn all_schemas() -> HashMap<String, ResourceSchema> {
    configs()
        .into_iter()
        .map(|c| c.schema)
        .chain(docker::schemas())
        .map(|s| (s.resource_type.clone(), s))
        .collect()
}

/// Custom attribute types shared by the AWS schemas
pub mod types {
    use super::*;

    /// Amazon Resource Name
    pub fn arn() -> AttributeType {
        AttributeType::Custom {
            name: "Arn".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) if s.starts_with("arn:") && s.split(':').count() >= 6 => Ok(()),
                Value::String(s) => Err(format!("'{}' is not an ARN", s)),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// Retention period accepted by CloudWatch Logs
    pub fn retention_in_days() -> AttributeType {
        AttributeType::Custom {
            name: "RetentionInDays".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) if crate::config::LOG_RETENTION_DAYS.contains(n) => Ok(()),
                Value::Int(n) => Err(format!("{} is not a CloudWatch retention period", n)),
                _ => Err("Expected integer".to_string()),
            },
        }
    }

    /// IAM policy document (`Version` and `Statement` keys)
    pub fn policy_document() -> AttributeType {
        AttributeType::Custom {
            name: "PolicyDocument".to_string(),
            base: Box::new(AttributeType::Any),
            validate: |value| match value {
                Value::Map(doc) => {
                    if !doc.contains_key("Version") {
                        return Err("Policy document is missing 'Version'".to_string());
                    }
                    match doc.get("Statement") {
                        Some(Value::List(statements)) if !statements.is_empty() => Ok(()),
                        _ => Err("Policy document needs a non-empty 'Statement' list".to_string()),
                    }
                }
                _ => Err("Expected map".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_derives_provider_name() {
        let attr = property("map_public_ip_on_launch", AttributeType::Bool);
        assert_eq!(attr.provider_name.as_deref(), Some("MapPublicIpOnLaunch"));
    }

    #[test]
    fn resource_types_are_unique() {
        let configs = configs();
        let schemas = all_schemas();
        assert_eq!(schemas.len(), configs.len() + docker::schemas().len());
        assert!(schemas.contains_key("ecs.service"));
        assert!(schemas.contains_key("docker.image_push"));
    }

    #[test]
    fn arn_type_rejects_wildcards() {
        let arn = types::arn();
        assert!(arn.validate(&Value::string("arn:aws:ecr:us-east-2:123456789012:repository/app")).is_ok());
        assert!(arn.validate(&Value::string("*")).is_err());
        assert!(arn.validate(&Value::reference("repository", "arn")).is_ok());
    }
}
