//! Declarative AWS topology for a scalable Moodle deployment.
//!
//! This crate builds a typed resource graph and synthesizes it into a
//! CloudFormation template:
//!
//! - **Network** - VPC over two zones, public and private subnets, NAT
//! - **Compute** - autoscaling fleet (on-demand + spot) and a staging instance
//! - **Data** - MySQL with generated credentials, Redis, shared EFS
//! - **Edge** - internet-facing load balancer behind a CloudFront distribution
//!
//! Nothing here talks to AWS. Deployment lives in `moodle-stack-deploy`.
//!
//! # Example
//!
//! ```rust,ignore
//! use moodle_stack::{topology, StackConfig};
//!
//! let config = StackConfig::with_inputs("my-key-pair", true);
//! let topology = topology::build(&config)?;
//! let template = topology.stack.synthesize()?;
//! println!("{}", template.to_json()?);
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod checks;
pub mod components;
pub mod config;
pub mod error;
pub mod graph;
pub mod intrinsic;
pub mod naming;
pub mod resource;
pub mod stack;
pub mod template;
pub mod topology;

pub use checks::{CheckReport, CheckResult, CheckStatus};
pub use config::StackConfig;
pub use error::{Result, StackError};
pub use graph::DependencyGraph;
pub use intrinsic::Expr;
pub use resource::{DeletionPolicy, Resource, ResourceRef, ResourceType};
pub use stack::{Output, Parameter, Stack};
pub use template::Template;
pub use topology::{build, Topology, OUTPUT_NAMES};
