//! Security groups: the load balancer is open to the allowed CIDRs on the
//! listener port; the service only accepts the load balancer.

use quay_core::declaration::Declaration;
use quay_core::resource::{Resource, Value};

use super::{
    LISTENER_PORT, LOAD_BALANCER_SECURITY_GROUP, SERVICE_INGRESS, SERVICE_SECURITY_GROUP, VPC,
    tags,
};
use crate::config::StackConfig;

pub(super) fn declare(cfg: &StackConfig, decl: &mut Declaration) {
    let public_rules = cfg
        .allowed_ingress_cidrs
        .iter()
        .map(|cidr| {
            Value::map([
                ("ip_protocol", Value::string("tcp")),
                ("from_port", Value::Int(LISTENER_PORT)),
                ("to_port", Value::Int(LISTENER_PORT)),
                ("cidr_ip", Value::string(cidr)),
                ("description", Value::string("HTTP from allowed networks")),
            ])
        })
        .collect();

    decl.add(
        Resource::new("ec2.security_group", LOAD_BALANCER_SECURITY_GROUP)
            .with_attribute(
                "group_description",
                Value::string(format!("{} load balancer", cfg.app_name)),
            )
            .with_attribute("group_name", Value::string(format!("{}-alb", cfg.app_name)))
            .with_attribute("vpc_id", Value::reference(VPC, "vpc_id"))
            .with_attribute("security_group_ingress", Value::List(public_rules))
            .with_attribute("tags", tags(cfg, "alb")),
    );

    decl.add(
        Resource::new("ec2.security_group", SERVICE_SECURITY_GROUP)
            .with_attribute(
                "group_description",
                Value::string(format!("{} service tasks", cfg.app_name)),
            )
            .with_attribute(
                "group_name",
                Value::string(format!("{}-service", cfg.app_name)),
            )
            .with_attribute("vpc_id", Value::reference(VPC, "vpc_id"))
            .with_attribute("tags", tags(cfg, "service")),
    );

    let port = Value::Int(i64::from(cfg.container_port));
    decl.add(
        Resource::new("ec2.security_group_ingress", SERVICE_INGRESS)
            .with_attribute(
                "group_id",
                Value::reference(SERVICE_SECURITY_GROUP, "group_id"),
            )
            .with_attribute(
                "source_security_group_id",
                Value::reference(LOAD_BALANCER_SECURITY_GROUP, "group_id"),
            )
            .with_attribute("ip_protocol", Value::string("tcp"))
            .with_attribute("from_port", port.clone())
            .with_attribute("to_port", port)
            .with_attribute(
                "description",
                Value::string("Container port from the load balancer"),
            ),
    );
}
