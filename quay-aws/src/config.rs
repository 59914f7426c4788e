//! Stack configuration
//!
//! The parameters of the web stack, deserialized from `quay.json`. Account
//! and region are explicit inputs; nothing here reads the environment.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use quay_core::declaration::DeclarationError;
use quay_core::schema::validate_cidr;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cidr::Ipv4Cidr;

static APP_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]{1,30}[a-z0-9]$").expect("valid regex"));
static ACCOUNT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{12}$").expect("valid regex"));
static REGION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-gov)?-[a-z]+-[0-9]$").expect("valid regex"));
static INFERENCE_ENDPOINT_ARN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^arn:aws[a-z-]*:sagemaker:[a-z0-9-]+:[0-9]{12}:endpoint/[A-Za-z0-9-]+$")
        .expect("valid regex")
});
static IMAGE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("valid regex"));

/// Retention periods CloudWatch Logs accepts
pub const LOG_RETENTION_DAYS: &[i64] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

/// Memory sizes (MiB) Fargate accepts for a CPU size
pub fn fargate_memory_options(cpu: i64) -> Option<Vec<i64>> {
    let options = match cpu {
        256 => vec![512, 1024, 2048],
        512 => (1..=4).map(|gb| gb * 1024).collect(),
        1024 => (2..=8).map(|gb| gb * 1024).collect(),
        2048 => (4..=16).map(|gb| gb * 1024).collect(),
        4096 => (8..=30).map(|gb| gb * 1024).collect(),
        _ => return None,
    };
    Some(options)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] DeclarationError),
}

fn default_container_port() -> u16 {
    8501
}

fn default_cpu() -> i64 {
    256
}

fn default_memory_mib() -> i64 {
    512
}

fn default_desired_count() -> i64 {
    1
}

fn default_build_context() -> PathBuf {
    PathBuf::from("app")
}

fn default_allowed_ingress_cidrs() -> Vec<String> {
    vec!["0.0.0.0/0".to_string()]
}

fn default_max_azs() -> usize {
    2
}

fn default_vpc_cidr() -> String {
    "10.0.0.0/16".to_string()
}

fn default_subnet_cidr_mask() -> u8 {
    24
}

fn default_image_tag() -> String {
    "latest".to_string()
}

fn default_platform() -> String {
    "linux/amd64".to_string()
}

fn default_health_check_path() -> String {
    "/".to_string()
}

fn default_log_retention_days() -> i64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_max_image_count() -> i64 {
    10
}

/// Parameters of the web stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Naming prefix for every resource
    pub app_name: String,
    pub account_id: String,
    pub region: String,
    #[serde(default = "default_container_port")]
    pub container_port: u16,
    #[serde(default = "default_cpu")]
    pub cpu: i64,
    #[serde(default = "default_memory_mib")]
    pub memory_mib: i64,
    #[serde(default = "default_desired_count")]
    pub desired_count: i64,
    #[serde(default = "default_build_context")]
    pub build_context: PathBuf,
    #[serde(default = "default_allowed_ingress_cidrs")]
    pub allowed_ingress_cidrs: Vec<String>,
    /// SageMaker endpoints the running task may invoke
    pub inference_endpoint_arns: Vec<String>,
    #[serde(default = "default_max_azs")]
    pub max_azs: usize,
    #[serde(default)]
    pub availability_zones: Option<Vec<String>>,
    #[serde(default = "default_vpc_cidr")]
    pub vpc_cidr: String,
    #[serde(default = "default_subnet_cidr_mask")]
    pub subnet_cidr_mask: u8,
    #[serde(default = "default_image_tag")]
    pub image_tag: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Extra build args, merged over the defaults
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,
    /// Content hash of the build context, filled in before declaring
    #[serde(default)]
    pub source_hash: Option<String>,
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: i64,
    #[serde(default = "default_true")]
    pub container_insights: bool,
    #[serde(default = "default_max_image_count")]
    pub max_image_count: i64,
}

impl StackConfig {
    /// Configuration with every optional field at its default
    pub fn new(
        app_name: impl Into<String>,
        account_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            account_id: account_id.into(),
            region: region.into(),
            container_port: default_container_port(),
            cpu: default_cpu(),
            memory_mib: default_memory_mib(),
            desired_count: default_desired_count(),
            build_context: default_build_context(),
            allowed_ingress_cidrs: default_allowed_ingress_cidrs(),
            inference_endpoint_arns: Vec::new(),
            max_azs: default_max_azs(),
            availability_zones: None,
            vpc_cidr: default_vpc_cidr(),
            subnet_cidr_mask: default_subnet_cidr_mask(),
            image_tag: default_image_tag(),
            platform: default_platform(),
            build_args: BTreeMap::new(),
            source_hash: None,
            health_check_path: default_health_check_path(),
            log_retention_days: default_log_retention_days(),
            container_insights: true,
            max_image_count: default_max_image_count(),
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: StackConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Availability zones the stack spreads across
    pub fn zones(&self) -> Vec<String> {
        match &self.availability_zones {
            Some(zones) => zones.clone(),
            None => (0..self.max_azs)
                .map(|i| format!("{}{}", self.region, char::from(b'a' + i as u8)))
                .collect(),
        }
    }

    /// Build args passed to the image build
    pub fn image_build_args(&self) -> BTreeMap<String, String> {
        let mut args = BTreeMap::new();
        args.insert("IMAGE_TAG".to_string(), self.image_tag.clone());
        args.insert("IMAGE_PORT".to_string(), self.container_port.to_string());
        args.insert("IMAGE_ARGS".to_string(), String::new());
        args.extend(self.build_args.clone());
        args
    }

    /// Fargate CPU architecture of the build platform
    pub fn cpu_architecture(&self) -> Option<&'static str> {
        match self.platform.as_str() {
            "linux/amd64" => Some("X86_64"),
            "linux/arm64" => Some("ARM64"),
            _ => None,
        }
    }

    /// Reject invalid parameter combinations before anything is declared
    pub fn validate(&self) -> Result<(), DeclarationError> {
        if !APP_NAME.is_match(&self.app_name) {
            return Err(DeclarationError::invalid_config(
                "app_name",
                "must be 3-32 lowercase letters, digits or hyphens, starting with a letter",
            ));
        }
        if !ACCOUNT_ID.is_match(&self.account_id) {
            return Err(DeclarationError::invalid_config("account_id", "must be a 12-digit AWS account id"));
        }
        if !REGION.is_match(&self.region) {
            return Err(DeclarationError::invalid_config(
                "region",
                format!("'{}' is not an AWS region", self.region),
            ));
        }
        if self.container_port == 0 {
            return Err(DeclarationError::invalid_config("container_port", "must be between 1 and 65535"));
        }

        let Some(memory_options) = fargate_memory_options(self.cpu) else {
            return Err(DeclarationError::invalid_config(
                "cpu",
                format!(
                    "{} is not a Fargate CPU size (256, 512, 1024, 2048, 4096)",
                    self.cpu
                ),
            ));
        };
        if !memory_options.contains(&self.memory_mib) {
            return Err(DeclarationError::invalid_config(
                "memory_mib",
                format!(
                    "{} MiB is not valid with {} CPU units; expected one of {:?}",
                    self.memory_mib, self.cpu, memory_options
                ),
            ));
        }

        if self.desired_count < 0 {
            return Err(DeclarationError::invalid_config("desired_count", "must not be negative"));
        }

        if self.allowed_ingress_cidrs.is_empty() {
            return Err(DeclarationError::invalid_config(
                "allowed_ingress_cidrs",
                "at least one CIDR is required",
            ));
        }
        for cidr in &self.allowed_ingress_cidrs {
            validate_cidr(cidr).map_err(|e| DeclarationError::invalid_config("allowed_ingress_cidrs", e))?;
        }

        for arn in &self.inference_endpoint_arns {
            if !INFERENCE_ENDPOINT_ARN.is_match(arn) {
                return Err(DeclarationError::invalid_config(
                    "inference_endpoint_arns",
                    format!("'{}' is not a SageMaker endpoint ARN", arn),
                ));
            }
        }

        if !(2..=6).contains(&self.max_azs) {
            return Err(DeclarationError::invalid_config("max_azs", "must be between 2 and 6"));
        }
        if let Some(zones) = &self.availability_zones {
            if zones.len() != self.max_azs {
                return Err(DeclarationError::invalid_config(
                    "availability_zones",
                    format!("expected {} zones, got {}", self.max_azs, zones.len()),
                ));
            }
            if let Some(zone) = zones.iter().find(|z| !z.starts_with(&self.region)) {
                return Err(DeclarationError::invalid_config(
                    "availability_zones",
                    format!("'{}' is not in region {}", zone, self.region),
                ));
            }
            if let Some((i, zone)) = zones.iter().enumerate().find(|(i, z)| zones[..*i].contains(*z)) {
                return Err(DeclarationError::invalid_config(
                    "availability_zones",
                    format!("'{}' is listed twice (entry {})", zone, i + 1),
                ));
            }
        }

        let vpc = Ipv4Cidr::parse(&self.vpc_cidr).map_err(|e| DeclarationError::invalid_config("vpc_cidr", e))?;
        if !(16..=28).contains(&vpc.prefix()) {
            return Err(DeclarationError::invalid_config(
                "vpc_cidr",
                format!("/{} is outside the VPC range /16 to /28", vpc.prefix()),
            ));
        }
        vpc.subnets(self.subnet_cidr_mask, 2 * self.max_azs)
            .map_err(|e| DeclarationError::invalid_config("subnet_cidr_mask", e))?;

        if !IMAGE_TAG.is_match(&self.image_tag) {
            return Err(DeclarationError::invalid_config("image_tag", "is not a valid image tag"));
        }
        if self.cpu_architecture().is_none() {
            return Err(DeclarationError::invalid_config(
                "platform",
                format!("'{}' is not supported; expected linux/amd64 or linux/arm64", self.platform),
            ));
        }
        if !self.health_check_path.starts_with('/') {
            return Err(DeclarationError::invalid_config("health_check_path", "must start with '/'"));
        }
        if !LOG_RETENTION_DAYS.contains(&self.log_retention_days) {
            return Err(DeclarationError::invalid_config(
                "log_retention_days",
                format!("{} is not a CloudWatch retention period", self.log_retention_days),
            ));
        }
        if self.max_image_count < 1 {
            return Err(DeclarationError::invalid_config("max_image_count", "must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StackConfig {
        StackConfig::new("streamlit-app", "123456789012", "us-east-2")
    }

    fn rejected_field(config: &StackConfig) -> String {
        match config.validate() {
            Err(DeclarationError::InvalidConfig { field, .. }) => field,
            other => panic!("Expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.container_port, 8501);
        assert_eq!(config.zones(), vec!["us-east-2a", "us-east-2b"]);
    }

    #[test]
    fn parses_minimal_json() {
        let config = StackConfig::from_json(
            r#"{
                "app_name": "streamlit-app",
                "account_id": "123456789012",
                "region": "us-east-2",
                "inference_endpoint_arns": [
                    "arn:aws:sagemaker:us-east-2:123456789012:endpoint/chat-model"
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.cpu, 256);
        assert_eq!(config.memory_mib, 512);
        assert_eq!(config.allowed_ingress_cidrs, vec!["0.0.0.0/0"]);
        assert_eq!(config.inference_endpoint_arns.len(), 1);
    }

    #[test]
    fn missing_inference_endpoints_is_a_parse_error() {
        let result = StackConfig::from_json(
            r#"{"app_name": "web", "account_id": "123456789012", "region": "us-east-2"}"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn fargate_pairs_are_enforced() {
        let mut config = config();
        config.memory_mib = 4096;
        assert_eq!(rejected_field(&config), "memory_mib");

        config.cpu = 1024;
        assert!(config.validate().is_ok());

        config.cpu = 300;
        assert_eq!(rejected_field(&config), "cpu");
    }

    #[test]
    fn invalid_values_name_their_field() {
        let mut c = config();
        c.app_name = "Streamlit".to_string();
        assert_eq!(rejected_field(&c), "app_name");

        let mut c = config();
        c.account_id = "1234".to_string();
        assert_eq!(rejected_field(&c), "account_id");

        let mut c = config();
        c.allowed_ingress_cidrs = vec!["10.0.0.0/33".to_string()];
        assert_eq!(rejected_field(&c), "allowed_ingress_cidrs");

        let mut c = config();
        c.allowed_ingress_cidrs.clear();
        assert_eq!(rejected_field(&c), "allowed_ingress_cidrs");

        let mut c = config();
        c.inference_endpoint_arns = vec!["arn:aws:sagemaker:*".to_string()];
        assert_eq!(rejected_field(&c), "inference_endpoint_arns");

        let mut c = config();
        c.health_check_path = "health".to_string();
        assert_eq!(rejected_field(&c), "health_check_path");

        let mut c = config();
        c.log_retention_days = 31;
        assert_eq!(rejected_field(&c), "log_retention_days");

        let mut c = config();
        c.container_port = 0;
        assert_eq!(rejected_field(&c), "container_port");
    }

    #[test]
    fn subnets_must_fit_in_the_vpc() {
        let mut c = config();
        c.vpc_cidr = "10.0.0.0/24".to_string();
        assert_eq!(rejected_field(&c), "subnet_cidr_mask");
    }

    #[test]
    fn zones_must_match_max_azs() {
        let mut c = config();
        c.availability_zones = Some(vec!["us-east-2a".to_string()]);
        assert_eq!(rejected_field(&c), "availability_zones");
    }

    #[test]
    fn zones_must_be_distinct() {
        let mut c = config();
        c.availability_zones = Some(vec!["us-east-2a".to_string(), "us-east-2a".to_string()]);
        assert_eq!(rejected_field(&c), "availability_zones");

        c.availability_zones = Some(vec!["us-east-2a".to_string(), "us-east-2c".to_string()]);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn vpc_prefix_must_be_one_aws_allows() {
        let mut c = config();
        c.vpc_cidr = "10.0.0.0/8".to_string();
        assert_eq!(rejected_field(&c), "vpc_cidr");

        c.vpc_cidr = "10.0.0.0/29".to_string();
        assert_eq!(rejected_field(&c), "vpc_cidr");

        c.vpc_cidr = "10.0.0.0/16".to_string();
        assert!(c.validate().is_ok());
    }

    #[test]
    fn platform_maps_to_fargate_architecture() {
        let mut c = config();
        assert_eq!(c.cpu_architecture(), Some("X86_64"));
        c.platform = "linux/arm64".to_string();
        assert_eq!(c.cpu_architecture(), Some("ARM64"));
        c.platform = "windows/amd64".to_string();
        assert_eq!(rejected_field(&c), "platform");
    }

    #[test]
    fn build_args_override_defaults() {
        let mut c = config();
        c.build_args
            .insert("IMAGE_ARGS".to_string(), "--server.headless true".to_string());
        let args = c.image_build_args();
        assert_eq!(args["IMAGE_PORT"], "8501");
        assert_eq!(args["IMAGE_TAG"], "latest");
        assert_eq!(args["IMAGE_ARGS"], "--server.headless true");
    }
}
