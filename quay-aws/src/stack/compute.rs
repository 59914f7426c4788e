//! ECS cluster, task definition and service

use quay_core::declaration::Declaration;
use quay_core::resource::{Resource, Value};

use super::{
    CLUSTER, IMAGE_PUSH, LISTENER, LOG_GROUP, SERVICE, SERVICE_SECURITY_GROUP, TARGET_GROUP,
    TASK_DEFINITION, TASK_EXECUTION_ROLE, TASK_ROLE, VPC, private_subnet, tags,
};
use crate::config::StackConfig;

const HEALTH_CHECK_GRACE_PERIOD_SECONDS: i64 = 60;

fn container_definition(cfg: &StackConfig) -> Value {
    Value::map([
        ("name", Value::string(&cfg.app_name)),
        ("image", Value::reference(IMAGE_PUSH, "image_uri")),
        ("essential", Value::Bool(true)),
        (
            "port_mappings",
            Value::List(vec![Value::map([
                ("container_port", Value::Int(i64::from(cfg.container_port))),
                ("protocol", Value::string("tcp")),
            ])]),
        ),
        (
            "log_configuration",
            Value::map([
                ("log_driver", Value::string("awslogs")),
                (
                    "options",
                    Value::map([
                        (
                            "awslogs-group",
                            Value::reference(LOG_GROUP, "log_group_name"),
                        ),
                        ("awslogs-region", Value::string(&cfg.region)),
                        ("awslogs-stream-prefix", Value::string(&cfg.app_name)),
                    ]),
                ),
            ]),
        ),
    ])
}

pub(super) fn declare(cfg: &StackConfig, decl: &mut Declaration) {
    let insights = if cfg.container_insights {
        "enabled"
    } else {
        "disabled"
    };
    // Tear the cluster down before the network it ran in
    decl.add(
        Resource::new("ecs.cluster", CLUSTER)
            .with_attribute("cluster_name", Value::string(&cfg.app_name))
            .with_attribute(
                "cluster_settings",
                Value::List(vec![Value::map([
                    ("name", Value::string("containerInsights")),
                    ("value", Value::string(insights)),
                ])]),
            )
            .with_attribute("tags", tags(cfg, "cluster"))
            .with_dependency(VPC),
    );

    // validate() rejects unsupported platforms
    let architecture = cfg.cpu_architecture().unwrap_or("X86_64");
    decl.add(
        Resource::new("ecs.task_definition", TASK_DEFINITION)
            .with_attribute("family", Value::string(&cfg.app_name))
            .with_attribute("cpu", Value::string(cfg.cpu.to_string()))
            .with_attribute("memory", Value::string(cfg.memory_mib.to_string()))
            .with_attribute("network_mode", Value::string("awsvpc"))
            .with_attribute("requires_compatibilities", Value::strings(["FARGATE"]))
            .with_attribute(
                "execution_role_arn",
                Value::reference(TASK_EXECUTION_ROLE, "arn"),
            )
            .with_attribute("task_role_arn", Value::reference(TASK_ROLE, "arn"))
            .with_attribute(
                "runtime_platform",
                Value::map([
                    ("cpu_architecture", Value::string(architecture)),
                    ("operating_system_family", Value::string("LINUX")),
                ]),
            )
            .with_attribute(
                "container_definitions",
                Value::List(vec![container_definition(cfg)]),
            )
            .with_attribute("tags", tags(cfg, "task")),
    );

    let subnets = (1..=cfg.max_azs)
        .map(|i| Value::reference(private_subnet(i), "subnet_id"))
        .collect();

    // Targets can only register once the listener forwards to the group
    decl.add(
        Resource::new("ecs.service", SERVICE)
            .with_attribute("service_name", Value::string(&cfg.app_name))
            .with_attribute("cluster", Value::reference(CLUSTER, "arn"))
            .with_attribute(
                "task_definition",
                Value::reference(TASK_DEFINITION, "task_definition_arn"),
            )
            .with_attribute("desired_count", Value::Int(cfg.desired_count))
            .with_attribute("launch_type", Value::string("FARGATE"))
            .with_attribute(
                "network_configuration",
                Value::map([(
                    "awsvpc_configuration",
                    Value::map([
                        ("assign_public_ip", Value::string("DISABLED")),
                        ("subnets", Value::List(subnets)),
                        (
                            "security_groups",
                            Value::List(vec![Value::reference(
                                SERVICE_SECURITY_GROUP,
                                "group_id",
                            )]),
                        ),
                    ]),
                )]),
            )
            .with_attribute(
                "load_balancers",
                Value::List(vec![Value::map([
                    ("container_name", Value::string(&cfg.app_name)),
                    ("container_port", Value::Int(i64::from(cfg.container_port))),
                    (
                        "target_group_arn",
                        Value::reference(TARGET_GROUP, "target_group_arn"),
                    ),
                ])]),
            )
            .with_attribute(
                "health_check_grace_period_seconds",
                Value::Int(HEALTH_CHECK_GRACE_PERIOD_SECONDS),
            )
            .with_attribute("tags", tags(cfg, "service"))
            .with_dependency(LISTENER),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_platform_runs_on_arm() {
        let mut cfg = StackConfig::new("web", "123456789012", "us-east-2");
        cfg.platform = "linux/arm64".to_string();
        let mut decl = Declaration::new("web");
        declare(&cfg, &mut decl);

        let Value::Map(platform) = &decl.find(TASK_DEFINITION).unwrap().attributes["runtime_platform"]
        else {
            panic!("runtime_platform must be a map");
        };
        assert_eq!(platform["cpu_architecture"], Value::string("ARM64"));
    }

    #[test]
    fn container_insights_can_be_disabled() {
        let mut cfg = StackConfig::new("web", "123456789012", "us-east-2");
        cfg.container_insights = false;
        let mut decl = Declaration::new("web");
        declare(&cfg, &mut decl);

        let settings = &decl.find(CLUSTER).unwrap().attributes["cluster_settings"];
        assert_eq!(
            settings,
            &Value::List(vec![Value::map([
                ("name", Value::string("containerInsights")),
                ("value", Value::string("disabled")),
            ])])
        );
    }
}
