//! Shared AWS configuration context.

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region, SdkConfig};

/// Loaded SDK configuration for one region.
///
/// # Example
/// ```ignore
/// let aws = AwsContext::new(Some("eu-west-1")).await;
/// let cfn = aws.cloudformation_client();
/// ```
#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
    region: String,
}

impl AwsContext {
    /// Load AWS configuration, pinned to `region` when given.
    ///
    /// Credentials and, without an explicit region, the region itself come
    /// from the environment, config files and instance roles.
    pub async fn new(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let config = loader.load().await;
        let region = config
            .region()
            .map_or_else(|| "unknown".to_string(), ToString::to_string);

        Self {
            config: Arc::new(config),
            region,
        }
    }

    /// Get the underlying SDK config.
    #[must_use]
    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    /// Get the resolved region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Create a CloudFormation client from this context.
    #[must_use]
    pub fn cloudformation_client(&self) -> aws_sdk_cloudformation::Client {
        aws_sdk_cloudformation::Client::new(self.sdk_config())
    }
}

impl std::fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}
