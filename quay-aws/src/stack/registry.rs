//! Container repository, image build and image push
//!
//! Build and push are separate resources. The push destination is the
//! repository URI, so the push waits for both the repository and the build.

use quay_core::declaration::Declaration;
use quay_core::resource::{Resource, Value};
use serde_json::json;

use super::{IMAGE_BUILD, IMAGE_PUSH, REPOSITORY, tags};
use crate::config::StackConfig;
use crate::schemas::docker;

fn lifecycle_policy_text(max_image_count: i64) -> String {
    json!({
        "rules": [{
            "rulePriority": 1,
            "description": format!("Keep the last {} images", max_image_count),
            "selection": {
                "tagStatus": "any",
                "countType": "imageCountMoreThan",
                "countNumber": max_image_count,
            },
            "action": { "type": "expire" },
        }]
    })
    .to_string()
}

pub(super) fn declare(cfg: &StackConfig, decl: &mut Declaration) {
    decl.add(
        Resource::new("ecr.repository", REPOSITORY)
            .with_attribute("repository_name", Value::string(&cfg.app_name))
            .with_attribute("image_tag_mutability", Value::string("MUTABLE"))
            .with_attribute(
                "image_scanning_configuration",
                Value::map([("scan_on_push", Value::Bool(true))]),
            )
            .with_attribute(
                "lifecycle_policy",
                Value::map([(
                    "lifecycle_policy_text",
                    Value::string(lifecycle_policy_text(cfg.max_image_count)),
                )]),
            )
            .with_attribute("empty_on_delete", Value::Bool(true))
            .with_attribute("tags", tags(cfg, "repository")),
    );

    let build_args = cfg
        .image_build_args()
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)));
    let mut build = Resource::new(docker::IMAGE_BUILD, IMAGE_BUILD)
        .with_attribute(
            "context",
            Value::string(cfg.build_context.to_string_lossy()),
        )
        .with_attribute("platform", Value::string(&cfg.platform))
        .with_attribute(
            "tag",
            Value::string(format!("{}:{}", cfg.app_name, cfg.image_tag)),
        )
        .with_attribute("build_args", Value::map(build_args));
    if let Some(hash) = &cfg.source_hash {
        build = build.with_attribute("source_hash", Value::string(hash));
    }
    decl.add(build);

    decl.add(
        Resource::new(docker::IMAGE_PUSH, IMAGE_PUSH)
            .with_attribute("source_image", Value::reference(IMAGE_BUILD, "image_id"))
            .with_attribute("source_tag", Value::reference(IMAGE_BUILD, "tag"))
            .with_attribute(
                "destination",
                Value::Concat(vec![
                    Value::reference(REPOSITORY, "repository_uri"),
                    Value::string(format!(":{}", cfg.image_tag)),
                ]),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_policy_keeps_configured_count() {
        let text = lifecycle_policy_text(10);
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["rules"][0]["selection"]["countNumber"], 10);
    }

    #[test]
    fn build_carries_port_and_tag_args() {
        let cfg = StackConfig::new("web", "123456789012", "us-east-2");
        let mut decl = Declaration::new("web");
        declare(&cfg, &mut decl);

        let build = decl.find(IMAGE_BUILD).unwrap();
        let Value::Map(args) = &build.attributes["build_args"] else {
            panic!("build_args must be a map");
        };
        assert_eq!(args["IMAGE_PORT"], Value::string("8501"));
        assert_eq!(args["IMAGE_TAG"], Value::string("latest"));
        assert!(!build.attributes.contains_key("source_hash"));
    }
}
