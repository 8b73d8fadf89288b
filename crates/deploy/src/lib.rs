//! CloudFormation deployment for the Moodle stack.
//!
//! Takes a synthesized [`moodle_stack::Template`], submits it, polls the
//! stack until it settles and reads back its outputs. Local state is kept in
//! a JSON file so later commands know what was deployed where.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use moodle_stack_deploy::{AwsContext, Deployer};
//!
//! let aws = AwsContext::new(Some("eu-west-1")).await;
//! let deployer = Deployer::new(&aws, "scalable-moodle-stack");
//! if deployer.submit(&template).await?.needs_wait() {
//!     deployer.wait_for_completion(Duration::from_secs(3600)).await?;
//! }
//! let outputs = deployer.outputs().await?;
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cloudformation;
pub mod context;
pub mod error;
pub mod outputs;
pub mod state;
pub mod status;

pub use cloudformation::{
    check_template_size, Deployer, FailedEvent, SubmitOutcome, DEFAULT_POLL_INTERVAL,
    MAX_TEMPLATE_BODY_BYTES,
};
pub use context::AwsContext;
pub use error::{classify, DeployError, Result};
pub use outputs::{OutputValue, StackOutputs};
pub use state::{with_retry_async, DeploymentState, RetryConfig};
pub use status::StackStatus;
