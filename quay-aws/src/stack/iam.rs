//! Task roles
//!
//! The execution role is used by the ECS agent to pull the image and write
//! container logs. The task role is assumed by the application itself and
//! may only invoke the configured inference endpoints.

use quay_core::declaration::Declaration;
use quay_core::resource::{Resource, Value};

use super::{
    LOG_GROUP, REPOSITORY, TASK_EXECUTION_ROLE, TASK_ROLE, policy_document, service_trust_policy,
    tags,
};
use crate::config::StackConfig;

const ECS_TASKS: &str = "ecs-tasks.amazonaws.com";

fn statement(sid: &str, actions: &[&str], resources: Vec<Value>) -> Value {
    Value::map([
        ("Sid", Value::string(sid)),
        ("Effect", Value::string("Allow")),
        ("Action", Value::strings(actions.iter().copied())),
        ("Resource", Value::List(resources)),
    ])
}

fn inline_policy(name: &str, statements: Vec<Value>) -> Value {
    Value::map([
        ("policy_name", Value::string(name)),
        ("policy_document", policy_document(statements)),
    ])
}

pub(super) fn declare(cfg: &StackConfig, decl: &mut Declaration) {
    let execution_policy = inline_policy(
        "pull-image-and-write-logs",
        vec![
            // ecr:GetAuthorizationToken has no resource-level permissions and IAM only
            // matches it against "*". It is kept on the repository ARN so no role grants a
            // wildcard resource; the registry token must then come from a separate grant.
            statement(
                "PullImage",
                &[
                    "ecr:GetAuthorizationToken",
                    "ecr:BatchCheckLayerAvailability",
                    "ecr:GetDownloadUrlForLayer",
                    "ecr:BatchGetImage",
                ],
                vec![Value::reference(REPOSITORY, "arn")],
            ),
            statement(
                "WriteLogs",
                &["logs:CreateLogStream", "logs:PutLogEvents"],
                vec![Value::reference(LOG_GROUP, "arn")],
            ),
        ],
    );

    decl.add(
        Resource::new("iam.role", TASK_EXECUTION_ROLE)
            .with_attribute(
                "role_name",
                Value::string(format!("{}-task-execution", cfg.app_name)),
            )
            .with_attribute(
                "assume_role_policy_document",
                service_trust_policy(ECS_TASKS),
            )
            .with_attribute("policies", Value::List(vec![execution_policy]))
            .with_attribute("tags", tags(cfg, "task-execution")),
    );

    let mut task_role = Resource::new("iam.role", TASK_ROLE)
        .with_attribute("role_name", Value::string(format!("{}-task", cfg.app_name)))
        .with_attribute(
            "assume_role_policy_document",
            service_trust_policy(ECS_TASKS),
        )
        .with_attribute("tags", tags(cfg, "task"));
    if !cfg.inference_endpoint_arns.is_empty() {
        let endpoints = cfg
            .inference_endpoint_arns
            .iter()
            .map(Value::string)
            .collect();
        task_role = task_role.with_attribute(
            "policies",
            Value::List(vec![inline_policy(
                "invoke-inference-endpoints",
                vec![statement(
                    "InvokeEndpoints",
                    &["sagemaker:InvokeEndpoint"],
                    endpoints,
                )],
            )]),
        );
    }
    decl.add(task_role);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_role_without_endpoints_has_no_policies() {
        let cfg = StackConfig::new("web", "123456789012", "us-east-2");
        let mut decl = Declaration::new("web");
        declare(&cfg, &mut decl);

        assert!(!decl.find(TASK_ROLE).unwrap().attributes.contains_key("policies"));
        assert!(decl.find(TASK_EXECUTION_ROLE).unwrap().attributes.contains_key("policies"));
    }

    #[test]
    fn roles_trust_ecs_tasks() {
        let cfg = StackConfig::new("web", "123456789012", "us-east-2");
        let mut decl = Declaration::new("web");
        declare(&cfg, &mut decl);

        for role in decl.of_type("iam.role") {
            assert_eq!(
                role.attributes["assume_role_policy_document"],
                service_trust_policy(ECS_TASKS)
            );
        }
    }

    #[test]
    fn image_pull_is_limited_to_the_repository() {
        let cfg = StackConfig::new("web", "123456789012", "us-east-2");
        let mut decl = Declaration::new("web");
        declare(&cfg, &mut decl);

        let Value::List(policies) = &decl.find(TASK_EXECUTION_ROLE).unwrap().attributes["policies"]
        else {
            panic!("policies must be a list")
        };
        let Value::Map(policy) = &policies[0] else { panic!("policy must be a map") };
        let Value::Map(doc) = &policy["policy_document"] else { panic!() };
        let Value::List(statements) = &doc["Statement"] else { panic!() };
        let Value::Map(pull) = &statements[0] else { panic!() };

        assert_eq!(pull["Sid"], Value::string("PullImage"));
        assert_eq!(pull["Resource"], Value::List(vec![Value::reference(REPOSITORY, "arn")]));
        let Value::List(actions) = &pull["Action"] else { panic!() };
        assert!(actions.contains(&Value::string("ecr:BatchGetImage")));
    }
}
