//! quay AWS stack
//!
//! The Fargate web stack declaration and the providers that apply it.
//!
//! ## Module Structure
//!
//! - `config` - Stack parameters and their validation
//! - `stack` - Declaration of every resource of the stack
//! - `schemas` - Resource schemas with CloudFormation names
//! - `provider` - AwsccProvider (Cloud Control API)
//! - `image` - ImageProvider (docker build and push)
//! - `routing` - StackProvider dispatching to the two
//! - `convert` - Value conversion to and from Cloud Control JSON
//! - `cidr` - Subnet carving

pub mod cidr;
pub mod config;
pub mod convert;
pub mod image;
pub mod provider;
pub mod routing;
pub mod schemas;
pub mod stack;

// Re-export main types
pub use config::{ConfigError, StackConfig};
pub use image::{ImageProvider, hash_build_context};
pub use provider::AwsccProvider;
pub use routing::StackProvider;
pub use stack::declare;
