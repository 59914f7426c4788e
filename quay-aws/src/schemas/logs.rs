//! CloudWatch Logs schema (AWS::Logs::LogGroup)

use quay_core::schema::{AttributeType, ResourceSchema};

use super::{AwsccSchemaConfig, property, tags_type, types};

pub fn log_group_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::Logs::LogGroup",
        has_tags: true,
        schema: ResourceSchema::new("logs.log_group")
            .attribute(
                property("log_group_name", AttributeType::String)
                    .required()
                    .create_only(),
            )
            .attribute(property("retention_in_days", types::retention_in_days()))
            .attribute(property("tags", tags_type()))
            .attribute(property("arn", AttributeType::String).read_only()),
    }
}
