//! ECR repository schema (AWS::ECR::Repository)

use quay_core::schema::{AttributeType, ResourceSchema};

use super::{AwsccSchemaConfig, property, tags_type};

pub fn repository_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ECR::Repository",
        has_tags: true,
        schema: ResourceSchema::new("ecr.repository")
            .with_description("Container image repository the task pulls from")
            .attribute(
                property("repository_name", AttributeType::String)
                    .required()
                    .create_only(),
            )
            .attribute(property(
                "image_tag_mutability",
                AttributeType::Enum(vec!["MUTABLE".to_string(), "IMMUTABLE".to_string()]),
            ))
            .attribute(property(
                "image_scanning_configuration",
                AttributeType::Map(Box::new(AttributeType::Bool)),
            ))
            .attribute(
                property(
                    "lifecycle_policy",
                    AttributeType::Map(Box::new(AttributeType::String)),
                )
                .with_description("Holds lifecycle_policy_text, a JSON document"),
            )
            .attribute(property("empty_on_delete", AttributeType::Bool))
            .attribute(property("tags", tags_type()))
            .attribute(property("arn", AttributeType::String).read_only())
            .attribute(property("repository_uri", AttributeType::String).read_only()),
    }
}
