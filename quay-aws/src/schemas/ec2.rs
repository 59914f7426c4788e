//! EC2 networking schemas (AWS::EC2::*)

use quay_core::schema::{AttributeType, ResourceSchema, types as core_types};

use super::{AwsccSchemaConfig, property, tags_type, types};

pub fn vpc_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::VPC",
        has_tags: true,
        schema: ResourceSchema::new("ec2.vpc")
            .with_description("Virtual network hosting every other resource of the stack")
            .attribute(
                property("cidr_block", core_types::cidr())
                    .required()
                    .create_only(),
            )
            .attribute(property("enable_dns_hostnames", AttributeType::Bool))
            .attribute(property("enable_dns_support", AttributeType::Bool))
            .attribute(property("tags", tags_type()))
            .attribute(property("vpc_id", AttributeType::String).read_only()),
    }
}

pub fn subnet_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::Subnet",
        has_tags: true,
        schema: ResourceSchema::new("ec2.subnet")
            .attribute(property("vpc_id", AttributeType::String).required().create_only())
            .attribute(
                property("cidr_block", core_types::cidr())
                    .required()
                    .create_only(),
            )
            .attribute(
                property("availability_zone", AttributeType::String)
                    .required()
                    .create_only(),
            )
            .attribute(property("map_public_ip_on_launch", AttributeType::Bool))
            .attribute(property("tags", tags_type()))
            .attribute(property("subnet_id", AttributeType::String).read_only()),
    }
}

pub fn internet_gateway_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::InternetGateway",
        has_tags: true,
        schema: ResourceSchema::new("ec2.internet_gateway")
            .attribute(property("tags", tags_type()))
            .attribute(property("internet_gateway_id", AttributeType::String).read_only()),
    }
}

pub fn vpc_gateway_attachment_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::VPCGatewayAttachment",
        has_tags: false,
        schema: ResourceSchema::new("ec2.vpc_gateway_attachment")
            .attribute(property("vpc_id", AttributeType::String).required().create_only())
            .attribute(property("internet_gateway_id", AttributeType::String).required()),
    }
}

pub fn route_table_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::RouteTable",
        has_tags: true,
        schema: ResourceSchema::new("ec2.route_table")
            .attribute(property("vpc_id", AttributeType::String).required().create_only())
            .attribute(property("tags", tags_type()))
            .attribute(property("route_table_id", AttributeType::String).read_only()),
    }
}

pub fn route_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::Route",
        has_tags: false,
        schema: ResourceSchema::new("ec2.route")
            .attribute(
                property("route_table_id", AttributeType::String)
                    .required()
                    .create_only(),
            )
            .attribute(
                property("destination_cidr_block", core_types::cidr())
                    .required()
                    .create_only(),
            )
            .attribute(property("gateway_id", AttributeType::String))
            .attribute(property("nat_gateway_id", AttributeType::String)),
    }
}

pub fn subnet_route_table_association_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::SubnetRouteTableAssociation",
        has_tags: false,
        schema: ResourceSchema::new("ec2.subnet_route_table_association")
            .attribute(property("subnet_id", AttributeType::String).required().create_only())
            .attribute(
                property("route_table_id", AttributeType::String)
                    .required()
                    .create_only(),
            ),
    }
}

pub fn eip_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::EIP",
        has_tags: true,
        schema: ResourceSchema::new("ec2.eip")
            .attribute(
                property("domain", AttributeType::Enum(vec!["vpc".to_string()])).create_only(),
            )
            .attribute(property("tags", tags_type()))
            .attribute(property("allocation_id", AttributeType::String).read_only())
            .attribute(property("public_ip", AttributeType::String).read_only()),
    }
}

pub fn nat_gateway_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::NatGateway",
        has_tags: true,
        schema: ResourceSchema::new("ec2.nat_gateway")
            .attribute(property("subnet_id", AttributeType::String).required().create_only())
            .attribute(property("allocation_id", AttributeType::String).create_only())
            .attribute(property("tags", tags_type()))
            .attribute(property("nat_gateway_id", AttributeType::String).read_only()),
    }
}

/// Inline ingress rule of a security group
fn ingress_rule_type() -> AttributeType {
    AttributeType::Map(Box::new(AttributeType::Any))
}

pub fn security_group_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::SecurityGroup",
        has_tags: true,
        schema: ResourceSchema::new("ec2.security_group")
            .attribute(
                property("group_description", AttributeType::String)
                    .required()
                    .create_only(),
            )
            .attribute(property("group_name", AttributeType::String).create_only())
            .attribute(property("vpc_id", AttributeType::String).required().create_only())
            .attribute(
                property(
                    "security_group_ingress",
                    AttributeType::List(Box::new(ingress_rule_type())),
                )
                .with_description("Inline ingress rules (ip_protocol, from_port, to_port, cidr_ip)"),
            )
            .attribute(property("tags", tags_type()))
            .attribute(property("group_id", AttributeType::String).read_only()),
    }
}

pub fn security_group_ingress_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::SecurityGroupIngress",
        has_tags: false,
        schema: ResourceSchema::new("ec2.security_group_ingress")
            .attribute(property("group_id", AttributeType::String).required().create_only())
            .attribute(
                property(
                    "ip_protocol",
                    AttributeType::Enum(vec!["tcp".to_string(), "udp".to_string()]),
                )
                .required()
                .create_only(),
            )
            .attribute(
                property("from_port", core_types::port_number())
                    .required()
                    .create_only(),
            )
            .attribute(
                property("to_port", core_types::port_number())
                    .required()
                    .create_only(),
            )
            .attribute(property("source_security_group_id", AttributeType::String).create_only())
            .attribute(property("cidr_ip", core_types::cidr()).create_only())
            .attribute(property("description", AttributeType::String)),
    }
}

pub fn flow_log_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::FlowLog",
        has_tags: true,
        schema: ResourceSchema::new("ec2.flow_log")
            .with_description("Network traffic metadata for the whole VPC")
            .attribute(property("resource_id", AttributeType::String).required().create_only())
            .attribute(
                property(
                    "resource_type",
                    AttributeType::Enum(vec![
                        "VPC".to_string(),
                        "Subnet".to_string(),
                        "NetworkInterface".to_string(),
                    ]),
                )
                .required()
                .create_only(),
            )
            .attribute(
                property(
                    "traffic_type",
                    AttributeType::Enum(vec![
                        "ACCEPT".to_string(),
                        "REJECT".to_string(),
                        "ALL".to_string(),
                    ]),
                )
                .create_only(),
            )
            .attribute(
                property(
                    "log_destination_type",
                    AttributeType::Enum(vec!["cloud-watch-logs".to_string(), "s3".to_string()]),
                )
                .create_only(),
            )
            .attribute(property("log_group_name", AttributeType::String).create_only())
            .attribute(property("deliver_logs_permission_arn", types::arn()).create_only())
            .attribute(property("tags", tags_type()))
            .attribute(property("id", AttributeType::String).read_only()),
    }
}
