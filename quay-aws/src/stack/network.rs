//! VPC with public and private subnets across the configured zones
//!
//! Public subnets route to the internet gateway and hold the load balancer
//! and one NAT gateway per zone. Private subnets route their egress through
//! the NAT gateway of their own zone.

use quay_core::declaration::{Declaration, DeclarationError};
use quay_core::resource::{Resource, Value};

use super::{
    INTERNET_GATEWAY, INTERNET_GATEWAY_ATTACHMENT, PUBLIC_ROUTE_TABLE, VPC, private_subnet,
    public_subnet, tags,
};
use crate::cidr::Ipv4Cidr;
use crate::config::StackConfig;

const ANYWHERE: &str = "0.0.0.0/0";

pub(super) fn declare(cfg: &StackConfig, decl: &mut Declaration) -> Result<(), DeclarationError> {
    let vpc_cidr = Ipv4Cidr::parse(&cfg.vpc_cidr)
        .map_err(|e| DeclarationError::invalid_config("vpc_cidr", e))?;
    let blocks = vpc_cidr
        .subnets(cfg.subnet_cidr_mask, 2 * cfg.max_azs)
        .map_err(|e| DeclarationError::invalid_config("subnet_cidr_mask", e))?;

    decl.add(
        Resource::new("ec2.vpc", VPC)
            .with_attribute("cidr_block", Value::string(&cfg.vpc_cidr))
            .with_attribute("enable_dns_hostnames", Value::Bool(true))
            .with_attribute("enable_dns_support", Value::Bool(true))
            .with_attribute("tags", tags(cfg, "vpc")),
    );

    decl.add(
        Resource::new("ec2.internet_gateway", INTERNET_GATEWAY)
            .with_attribute("tags", tags(cfg, "igw")),
    );
    decl.add(
        Resource::new("ec2.vpc_gateway_attachment", INTERNET_GATEWAY_ATTACHMENT)
            .with_attribute("vpc_id", Value::reference(VPC, "vpc_id"))
            .with_attribute(
                "internet_gateway_id",
                Value::reference(INTERNET_GATEWAY, "internet_gateway_id"),
            ),
    );

    decl.add(
        Resource::new("ec2.route_table", PUBLIC_ROUTE_TABLE)
            .with_attribute("vpc_id", Value::reference(VPC, "vpc_id"))
            .with_attribute("tags", tags(cfg, "public")),
    );
    decl.add(
        Resource::new("ec2.route", "public_default_route")
            .with_attribute(
                "route_table_id",
                Value::reference(PUBLIC_ROUTE_TABLE, "route_table_id"),
            )
            .with_attribute("destination_cidr_block", Value::string(ANYWHERE))
            .with_attribute(
                "gateway_id",
                Value::reference(INTERNET_GATEWAY, "internet_gateway_id"),
            )
            .with_dependency(INTERNET_GATEWAY_ATTACHMENT),
    );

    for (i, zone) in cfg.zones().iter().enumerate() {
        let n = i + 1;
        let public = public_subnet(n);
        let private = private_subnet(n);
        let eip = format!("nat_eip_{}", n);
        let nat = format!("nat_gateway_{}", n);
        let private_route_table = format!("private_route_table_{}", n);

        decl.add(
            Resource::new("ec2.subnet", &public)
                .with_attribute("vpc_id", Value::reference(VPC, "vpc_id"))
                .with_attribute("cidr_block", Value::string(blocks[i].to_string()))
                .with_attribute("availability_zone", Value::string(zone))
                .with_attribute("map_public_ip_on_launch", Value::Bool(true))
                .with_attribute("tags", tags(cfg, &format!("public-{}", n))),
        );
        decl.add(
            Resource::new(
                "ec2.subnet_route_table_association",
                format!("{}_route_table_association", public),
            )
            .with_attribute("subnet_id", Value::reference(&public, "subnet_id"))
            .with_attribute(
                "route_table_id",
                Value::reference(PUBLIC_ROUTE_TABLE, "route_table_id"),
            ),
        );

        decl.add(
            Resource::new("ec2.eip", &eip)
                .with_attribute("domain", Value::string("vpc"))
                .with_attribute("tags", tags(cfg, &format!("nat-{}", n)))
                .with_dependency(INTERNET_GATEWAY_ATTACHMENT),
        );
        decl.add(
            Resource::new("ec2.nat_gateway", &nat)
                .with_attribute("subnet_id", Value::reference(&public, "subnet_id"))
                .with_attribute("allocation_id", Value::reference(&eip, "allocation_id"))
                .with_attribute("tags", tags(cfg, &format!("nat-{}", n))),
        );

        decl.add(
            Resource::new("ec2.subnet", &private)
                .with_attribute("vpc_id", Value::reference(VPC, "vpc_id"))
                .with_attribute(
                    "cidr_block",
                    Value::string(blocks[cfg.max_azs + i].to_string()),
                )
                .with_attribute("availability_zone", Value::string(zone))
                .with_attribute("map_public_ip_on_launch", Value::Bool(false))
                .with_attribute("tags", tags(cfg, &format!("private-{}", n))),
        );
        decl.add(
            Resource::new("ec2.route_table", &private_route_table)
                .with_attribute("vpc_id", Value::reference(VPC, "vpc_id"))
                .with_attribute("tags", tags(cfg, &format!("private-{}", n))),
        );
        decl.add(
            Resource::new("ec2.route", format!("private_default_route_{}", n))
                .with_attribute(
                    "route_table_id",
                    Value::reference(&private_route_table, "route_table_id"),
                )
                .with_attribute("destination_cidr_block", Value::string(ANYWHERE))
                .with_attribute("nat_gateway_id", Value::reference(&nat, "nat_gateway_id")),
        );
        decl.add(
            Resource::new(
                "ec2.subnet_route_table_association",
                format!("{}_route_table_association", private),
            )
            .with_attribute("subnet_id", Value::reference(&private, "subnet_id"))
            .with_attribute(
                "route_table_id",
                Value::reference(&private_route_table, "route_table_id"),
            ),
        );
    }

    Ok(())
}
