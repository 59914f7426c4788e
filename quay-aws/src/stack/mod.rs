//! Infrastructure declaration for the Fargate web stack
//!
//! `declare` turns a [`StackConfig`] into a validated [`Declaration`]. It is a
//! pure function: no I/O, no environment lookups. Each submodule adds the
//! resources of one concern and wires them to the others through bindings.

use quay_core::declaration::{Declaration, DeclarationError, Output};
use quay_core::resource::Value;

use crate::config::StackConfig;
use crate::schemas;

mod compute;
mod iam;
mod ingress;
mod logging;
mod network;
mod registry;
mod security;

// Bindings other parts of the stack refer to
pub const VPC: &str = "vpc";
pub const INTERNET_GATEWAY: &str = "internet_gateway";
pub const INTERNET_GATEWAY_ATTACHMENT: &str = "internet_gateway_attachment";
pub const PUBLIC_ROUTE_TABLE: &str = "public_route_table";
pub const LOAD_BALANCER_SECURITY_GROUP: &str = "load_balancer_security_group";
pub const SERVICE_SECURITY_GROUP: &str = "service_security_group";
pub const SERVICE_INGRESS: &str = "service_ingress_from_load_balancer";
pub const REPOSITORY: &str = "repository";
pub const IMAGE_BUILD: &str = "image_build";
pub const IMAGE_PUSH: &str = "image_push";
pub const LOG_GROUP: &str = "log_group";
pub const ACCESS_LOG_BUCKET: &str = "access_log_bucket";
pub const ACCESS_LOG_BUCKET_POLICY: &str = "access_log_bucket_policy";
pub const FLOW_LOG_ROLE: &str = "flow_log_role";
pub const FLOW_LOG: &str = "flow_log";
pub const TASK_EXECUTION_ROLE: &str = "task_execution_role";
pub const TASK_ROLE: &str = "task_role";
pub const CLUSTER: &str = "cluster";
pub const TASK_DEFINITION: &str = "task_definition";
pub const SERVICE: &str = "service";
pub const LOAD_BALANCER: &str = "load_balancer";
pub const TARGET_GROUP: &str = "target_group";
pub const LISTENER: &str = "listener";

/// Public port of the listener
pub const LISTENER_PORT: i64 = 80;

pub fn public_subnet(index: usize) -> String {
    format!("public_subnet_{}", index)
}

pub fn private_subnet(index: usize) -> String {
    format!("private_subnet_{}", index)
}

/// Standard tags: a Name plus the stack identity
pub(crate) fn tags(cfg: &StackConfig, name: &str) -> Value {
    Value::map([
        ("Name", Value::string(format!("{}-{}", cfg.app_name, name))),
        ("quay:stack", Value::string(&cfg.app_name)),
    ])
}

/// IAM policy document from a list of statements
pub(crate) fn policy_document(statements: Vec<Value>) -> Value {
    Value::map([
        ("Version", Value::string("2012-10-17")),
        ("Statement", Value::List(statements)),
    ])
}

/// Trust policy letting an AWS service assume a role
pub(crate) fn service_trust_policy(service: &str) -> Value {
    policy_document(vec![Value::map([
        ("Effect", Value::string("Allow")),
        ("Principal", Value::map([("Service", Value::string(service))])),
        ("Action", Value::string("sts:AssumeRole")),
    ])])
}

/// Build the whole stack for `cfg`
pub fn declare(cfg: &StackConfig) -> Result<Declaration, DeclarationError> {
    cfg.validate()?;

    let mut decl = Declaration::new(&cfg.app_name);
    network::declare(cfg, &mut decl)?;
    security::declare(cfg, &mut decl);
    registry::declare(cfg, &mut decl);
    logging::declare(cfg, &mut decl);
    iam::declare(cfg, &mut decl);
    ingress::declare(cfg, &mut decl);
    compute::declare(cfg, &mut decl);

    decl.output(
        Output::new(
            "url",
            Value::Concat(vec![
                Value::string("http://"),
                Value::reference(LOAD_BALANCER, "dns_name"),
            ]),
        )
        .with_description("Public URL of the application"),
    );
    decl.output(
        Output::new(
            "repository_uri",
            Value::reference(REPOSITORY, "repository_uri"),
        )
        .with_description("Container repository the image is pushed to"),
    );

    decl.validate(&schemas::all_schemas())?;
    log::debug!(
        "declared {} resources for {}",
        decl.resources.len(),
        decl.name
    );
    Ok(decl)
}
