//! IAM role schema (AWS::IAM::Role) with inline policies

use quay_core::schema::{AttributeType, ResourceSchema};

use super::{AwsccSchemaConfig, property, tags_type, types};

pub fn role_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::IAM::Role",
        has_tags: true,
        schema: ResourceSchema::new("iam.role")
            .attribute(property("role_name", AttributeType::String).create_only())
            .attribute(property("description", AttributeType::String))
            .attribute(
                property("assume_role_policy_document", types::policy_document()).required(),
            )
            .attribute(
                property(
                    "policies",
                    AttributeType::List(Box::new(AttributeType::Map(Box::new(
                        AttributeType::Any,
                    )))),
                )
                .with_description("Inline policies: policy_name and policy_document"),
            )
            .attribute(property("tags", tags_type()))
            .attribute(property("arn", AttributeType::String).read_only())
            .attribute(property("role_id", AttributeType::String).read_only()),
    }
}
