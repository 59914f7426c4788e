//! Container image schemas, handled by the docker CLI rather than Cloud Control

use quay_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

pub const IMAGE_BUILD: &str = "docker.image_build";
pub const IMAGE_PUSH: &str = "docker.image_push";

/// A build is an immutable artifact: any input change rebuilds it
pub fn image_build_schema() -> ResourceSchema {
    ResourceSchema::new(IMAGE_BUILD)
        .with_description("Image built from a local build context")
        .deletable_while_referenced()
        .attribute(
            AttributeSchema::new("context", AttributeType::String)
                .required()
                .create_only()
                .with_description("Directory holding the Dockerfile"),
        )
        .attribute(
            AttributeSchema::new("platform", AttributeType::String)
                .required()
                .create_only(),
        )
        .attribute(
            AttributeSchema::new("tag", AttributeType::String)
                .required()
                .create_only()
                .with_description("Local tag given to the built image"),
        )
        .attribute(
            AttributeSchema::new(
                "build_args",
                AttributeType::Map(Box::new(AttributeType::String)),
            )
            .create_only(),
        )
        .attribute(
            AttributeSchema::new("source_hash", AttributeType::String)
                .create_only()
                .with_description("Content hash of the build context; a new hash rebuilds"),
        )
        .attribute(
            AttributeSchema::new("image_id", AttributeType::String)
                .read_only()
                .with_description("Content-addressed id of the built image"),
        )
}

pub fn image_push_schema() -> ResourceSchema {
    ResourceSchema::new(IMAGE_PUSH)
        .with_description("Built image copied into the repository")
        .deletable_while_referenced()
        .attribute(
            AttributeSchema::new("source_image", AttributeType::String)
                .required()
                .create_only(),
        )
        .attribute(AttributeSchema::new("source_tag", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("destination", AttributeType::String)
                .required()
                .create_only()
                .with_description("repository_uri:tag"),
        )
        .attribute(AttributeSchema::new("digest", AttributeType::String).read_only())
        .attribute(
            AttributeSchema::new("image_uri", AttributeType::String)
                .read_only()
                .with_description("Digest-pinned reference (repository_uri@sha256:...)"),
        )
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![image_build_schema(), image_push_schema()]
}
