//! Stack outputs as reported after deployment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, Result};

/// One exported value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputValue {
    pub value: String,
    /// Operator-facing name, carried in the output description.
    pub description: Option<String>,
}

/// Outputs keyed by logical ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutputs(BTreeMap<String, OutputValue>);

impl StackOutputs {
    /// Collect outputs from a `DescribeStacks` response.
    #[must_use]
    pub fn from_sdk(outputs: &[aws_sdk_cloudformation::types::Output]) -> Self {
        Self(
            outputs
                .iter()
                .filter_map(|o| {
                    let key = o.output_key()?.to_string();
                    let value = OutputValue {
                        value: o.output_value().unwrap_or_default().to_string(),
                        description: o.description().map(str::to_string),
                    };
                    Some((key, value))
                })
                .collect(),
        )
    }

    /// Insert an output.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>, description: Option<&str>) {
        self.0.insert(
            key.into(),
            OutputValue {
                value: value.into(),
                description: description.map(str::to_string),
            },
        );
    }

    /// Value of one output.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|o| o.value.as_str())
    }

    /// Number of outputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no outputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate outputs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OutputValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Expected keys that are absent or blank.
    #[must_use]
    pub fn missing<S: AsRef<str>>(&self, expected: &[S]) -> Vec<String> {
        expected
            .iter()
            .map(AsRef::as_ref)
            .filter(|key| self.get(key).is_none_or(|v| v.trim().is_empty()))
            .map(str::to_string)
            .collect()
    }

    /// Require every expected key to carry a non-empty value.
    ///
    /// # Errors
    /// Returns [`DeployError::MissingOutputs`] listing the offenders.
    pub fn verify<S: AsRef<str>>(&self, expected: &[S]) -> Result<()> {
        let missing = self.missing(expected);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DeployError::MissingOutputs(missing))
        }
    }

    /// Values keyed by operator-facing name, falling back to the logical ID.
    #[must_use]
    pub fn by_name(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(key, o)| {
                let name = o.description.clone().unwrap_or_else(|| key.clone());
                (name, o.value.clone())
            })
            .collect()
    }
}
