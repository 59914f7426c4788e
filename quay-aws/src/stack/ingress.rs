//! Public entry point: load balancer, target group and listener
//!
//! The load balancer sits in the public subnets and writes access logs to
//! the log bucket. The listener forwards port 80 to the container port.

use quay_core::declaration::Declaration;
use quay_core::resource::{Resource, Value};

use super::logging::ACCESS_LOG_PREFIX;
use super::{
    ACCESS_LOG_BUCKET, ACCESS_LOG_BUCKET_POLICY, LISTENER, LISTENER_PORT, LOAD_BALANCER,
    LOAD_BALANCER_SECURITY_GROUP, TARGET_GROUP, VPC, public_subnet, tags,
};
use crate::config::StackConfig;

fn load_balancer_attribute(key: &str, value: Value) -> Value {
    Value::map([("key", Value::string(key)), ("value", value)])
}

pub(super) fn declare(cfg: &StackConfig, decl: &mut Declaration) {
    let subnets = (1..=cfg.max_azs)
        .map(|i| Value::reference(public_subnet(i), "subnet_id"))
        .collect();

    // Log delivery is checked against the bucket policy when the attribute is set
    decl.add(
        Resource::new("elbv2.load_balancer", LOAD_BALANCER)
            .with_attribute("name", Value::string(&cfg.app_name))
            .with_attribute("scheme", Value::string("internet-facing"))
            .with_attribute("type", Value::string("application"))
            .with_attribute("subnets", Value::List(subnets))
            .with_attribute(
                "security_groups",
                Value::List(vec![Value::reference(
                    LOAD_BALANCER_SECURITY_GROUP,
                    "group_id",
                )]),
            )
            .with_attribute(
                "load_balancer_attributes",
                Value::List(vec![
                    load_balancer_attribute("access_logs.s3.enabled", Value::string("true")),
                    load_balancer_attribute(
                        "access_logs.s3.bucket",
                        Value::reference(ACCESS_LOG_BUCKET, "bucket_name"),
                    ),
                    load_balancer_attribute(
                        "access_logs.s3.prefix",
                        Value::string(ACCESS_LOG_PREFIX),
                    ),
                ]),
            )
            .with_attribute("tags", tags(cfg, "alb"))
            .with_dependency(ACCESS_LOG_BUCKET_POLICY),
    );

    decl.add(
        Resource::new("elbv2.target_group", TARGET_GROUP)
            .with_attribute("name", Value::string(&cfg.app_name))
            .with_attribute("port", Value::Int(i64::from(cfg.container_port)))
            .with_attribute("protocol", Value::string("HTTP"))
            .with_attribute("target_type", Value::string("ip"))
            .with_attribute("vpc_id", Value::reference(VPC, "vpc_id"))
            .with_attribute("health_check_path", Value::string(&cfg.health_check_path))
            .with_attribute("health_check_protocol", Value::string("HTTP"))
            .with_attribute("tags", tags(cfg, "targets")),
    );

    decl.add(
        Resource::new("elbv2.listener", LISTENER)
            .with_attribute(
                "load_balancer_arn",
                Value::reference(LOAD_BALANCER, "load_balancer_arn"),
            )
            .with_attribute("port", Value::Int(LISTENER_PORT))
            .with_attribute("protocol", Value::string("HTTP"))
            .with_attribute(
                "default_actions",
                Value::List(vec![Value::map([
                    ("type", Value::string("forward")),
                    (
                        "target_group_arn",
                        Value::reference(TARGET_GROUP, "target_group_arn"),
                    ),
                ])]),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_balancer_waits_for_the_bucket_policy() {
        let cfg = StackConfig::new("web", "123456789012", "us-east-2");
        let mut decl = Declaration::new("web");
        declare(&cfg, &mut decl);

        let lb = decl.find(LOAD_BALANCER).unwrap();
        let deps = lb.dependencies();
        assert!(deps.contains(&ACCESS_LOG_BUCKET_POLICY.to_string()));
        assert!(deps.contains(&ACCESS_LOG_BUCKET.to_string()));
        assert!(deps.contains(&public_subnet(2)));
    }
}
