//! Log group, VPC flow logs and the access-log bucket of the load balancer
//!
//! Container output and flow logs share one bounded-retention log group.
//! Load balancer access logs land in a bucket that denies plain-HTTP access.

use quay_core::declaration::Declaration;
use quay_core::resource::{Resource, Value};

use super::{
    ACCESS_LOG_BUCKET, ACCESS_LOG_BUCKET_POLICY, FLOW_LOG, FLOW_LOG_ROLE, LOG_GROUP, VPC,
    policy_document, service_trust_policy, tags,
};
use crate::config::StackConfig;

/// Key prefix of the access logs inside the bucket
pub(super) const ACCESS_LOG_PREFIX: &str = "alb";

pub(super) fn bucket_name(cfg: &StackConfig) -> String {
    format!("{}-alb-logs-{}", cfg.app_name, cfg.account_id)
}

pub(super) fn declare(cfg: &StackConfig, decl: &mut Declaration) {
    decl.add(
        Resource::new("logs.log_group", LOG_GROUP)
            .with_attribute(
                "log_group_name",
                Value::string(format!("/ecs/{}", cfg.app_name)),
            )
            .with_attribute("retention_in_days", Value::Int(cfg.log_retention_days))
            .with_attribute("tags", tags(cfg, "logs")),
    );

    decl.add(
        Resource::new("iam.role", FLOW_LOG_ROLE)
            .with_attribute(
                "role_name",
                Value::string(format!("{}-flow-logs", cfg.app_name)),
            )
            .with_attribute(
                "assume_role_policy_document",
                service_trust_policy("vpc-flow-logs.amazonaws.com"),
            )
            .with_attribute(
                "policies",
                Value::List(vec![Value::map([
                    ("policy_name", Value::string("deliver-flow-logs")),
                    (
                        "policy_document",
                        policy_document(vec![Value::map([
                            ("Sid", Value::string("DeliverFlowLogs")),
                            ("Effect", Value::string("Allow")),
                            (
                                "Action",
                                Value::strings([
                                    "logs:CreateLogStream",
                                    "logs:PutLogEvents",
                                    "logs:DescribeLogStreams",
                                ]),
                            ),
                            (
                                "Resource",
                                Value::List(vec![Value::reference(LOG_GROUP, "arn")]),
                            ),
                        ])]),
                    ),
                ])]),
            )
            .with_attribute("tags", tags(cfg, "flow-logs")),
    );

    decl.add(
        Resource::new("ec2.flow_log", FLOW_LOG)
            .with_attribute("resource_id", Value::reference(VPC, "vpc_id"))
            .with_attribute("resource_type", Value::string("VPC"))
            .with_attribute("traffic_type", Value::string("ALL"))
            .with_attribute("log_destination_type", Value::string("cloud-watch-logs"))
            .with_attribute(
                "log_group_name",
                Value::reference(LOG_GROUP, "log_group_name"),
            )
            .with_attribute(
                "deliver_logs_permission_arn",
                Value::reference(FLOW_LOG_ROLE, "arn"),
            )
            .with_attribute("tags", tags(cfg, "flow-log")),
    );

    decl.add(
        Resource::new("s3.bucket", ACCESS_LOG_BUCKET)
            .with_attribute("bucket_name", Value::string(bucket_name(cfg)))
            .with_attribute(
                "bucket_encryption",
                Value::map([(
                    "server_side_encryption_configuration",
                    Value::List(vec![Value::map([(
                        "server_side_encryption_by_default",
                        Value::map([("SSEAlgorithm", Value::string("AES256"))]),
                    )])]),
                )]),
            )
            .with_attribute(
                "public_access_block_configuration",
                Value::map([
                    ("block_public_acls", Value::Bool(true)),
                    ("block_public_policy", Value::Bool(true)),
                    ("ignore_public_acls", Value::Bool(true)),
                    ("restrict_public_buckets", Value::Bool(true)),
                ]),
            )
            .with_attribute(
                "ownership_controls",
                Value::map([(
                    "rules",
                    Value::List(vec![Value::map([(
                        "object_ownership",
                        Value::string("BucketOwnerEnforced"),
                    )])]),
                )]),
            )
            .with_attribute("tags", tags(cfg, "access-logs")),
    );

    let bucket_arn = Value::reference(ACCESS_LOG_BUCKET, "arn");
    let objects = Value::Concat(vec![bucket_arn.clone(), Value::string("/*")]);
    let log_objects = Value::Concat(vec![
        bucket_arn.clone(),
        Value::string(format!(
            "/{}/AWSLogs/{}/*",
            ACCESS_LOG_PREFIX, cfg.account_id
        )),
    ]);

    decl.add(
        Resource::new("s3.bucket_policy", ACCESS_LOG_BUCKET_POLICY)
            .with_attribute(
                "bucket",
                Value::reference(ACCESS_LOG_BUCKET, "bucket_name"),
            )
            .with_attribute(
                "policy_document",
                policy_document(vec![
                    Value::map([
                        ("Sid", Value::string("DenyInsecureTransport")),
                        ("Effect", Value::string("Deny")),
                        ("Principal", Value::string("*")),
                        ("Action", Value::string("s3:*")),
                        ("Resource", Value::List(vec![bucket_arn, objects])),
                        (
                            "Condition",
                            Value::map([(
                                "Bool",
                                Value::map([("aws:SecureTransport", Value::string("false"))]),
                            )]),
                        ),
                    ]),
                    Value::map([
                        ("Sid", Value::string("AllowLoadBalancerLogDelivery")),
                        ("Effect", Value::string("Allow")),
                        (
                            "Principal",
                            Value::map([(
                                "Service",
                                Value::string("logdelivery.elasticloadbalancing.amazonaws.com"),
                            )]),
                        ),
                        ("Action", Value::string("s3:PutObject")),
                        ("Resource", Value::List(vec![log_objects])),
                    ]),
                ]),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insecure_transport_is_denied() {
        let cfg = StackConfig::new("web", "123456789012", "us-east-2");
        let mut decl = Declaration::new("web");
        declare(&cfg, &mut decl);

        let policy = &decl.find(ACCESS_LOG_BUCKET_POLICY).unwrap().attributes["policy_document"];
        let Value::Map(doc) = policy else { panic!("policy must be a map") };
        let Value::List(statements) = &doc["Statement"] else { panic!("Statement must be a list") };
        let Value::Map(deny) = &statements[0] else { panic!("statement must be a map") };

        assert_eq!(deny["Effect"], Value::string("Deny"));
        assert_eq!(
            deny["Condition"],
            Value::map([(
                "Bool",
                Value::map([("aws:SecureTransport", Value::string("false"))])
            )])
        );
    }

    #[test]
    fn bucket_name_fits_s3_limits() {
        let cfg = StackConfig::new("a-thirty-two-character-app-name1", "123456789012", "us-east-2");
        assert!(bucket_name(&cfg).len() <= 63);
    }
}
