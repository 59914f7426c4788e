//! Quay Core
//!
//! Core library for declaring infrastructure as a desired-state resource graph
//! and converging real resources toward it through side-effect values

pub mod declaration;
pub mod differ;
pub mod effect;
pub mod graph;
pub mod interpreter;
pub mod plan;
pub mod provider;
pub mod resolver;
pub mod resource;
pub mod schema;
