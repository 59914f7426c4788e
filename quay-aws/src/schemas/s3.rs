//! S3 schemas (AWS::S3::Bucket, AWS::S3::BucketPolicy)

use quay_core::schema::{AttributeType, ResourceSchema};

use super::{AwsccSchemaConfig, property, tags_type, types};

pub fn bucket_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::S3::Bucket",
        has_tags: true,
        schema: ResourceSchema::new("s3.bucket")
            .attribute(property("bucket_name", AttributeType::String).create_only())
            .attribute(property("bucket_encryption", AttributeType::Any))
            .attribute(property(
                "public_access_block_configuration",
                AttributeType::Map(Box::new(AttributeType::Bool)),
            ))
            .attribute(property("ownership_controls", AttributeType::Any))
            .attribute(property("tags", tags_type()))
            .attribute(property("arn", AttributeType::String).read_only()),
    }
}

pub fn bucket_policy_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::S3::BucketPolicy",
        has_tags: false,
        schema: ResourceSchema::new("s3.bucket_policy")
            .attribute(property("bucket", AttributeType::String).required().create_only())
            .attribute(property("policy_document", types::policy_document()).required()),
    }
}
