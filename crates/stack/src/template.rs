//! Synthesized template document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::stack::Stack;

/// Template format version the platform expects.
pub const FORMAT_VERSION: &str = "2010-09-09";

/// A synthesized template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub resources: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl Template {
    /// Render every declaration of `stack`.
    ///
    /// Does not resolve the graph; use [`Stack::synthesize`] for that.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter or output cannot be serialized.
    pub fn from_stack(stack: &Stack) -> Result<Self> {
        let parameters = stack
            .parameters()
            .iter()
            .map(|(id, p)| Ok((id.clone(), serde_json::to_value(p)?)))
            .collect::<Result<_>>()?;
        let resources = stack
            .resources()
            .iter()
            .map(|(id, r)| Ok((id.clone(), r.to_template_value()?)))
            .collect::<Result<_>>()?;
        let outputs = stack
            .outputs()
            .iter()
            .map(|(id, o)| Ok((id.clone(), serde_json::to_value(o)?)))
            .collect::<Result<_>>()?;

        Ok(Self {
            format_version: FORMAT_VERSION.to_string(),
            description: stack.description().map(str::to_string),
            parameters,
            resources,
            outputs,
        })
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Compact JSON, the form submitted to the platform.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_compact(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// YAML rendering.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Size of the compact JSON body in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn size_bytes(&self) -> Result<usize> {
        Ok(self.to_json_compact()?.len())
    }

    /// Template entry of one resource.
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&serde_json::Value> {
        self.resources.get(id)
    }

    /// Number of resources of the given platform type.
    #[must_use]
    pub fn count_of(&self, kind: &str) -> usize {
        self.resources
            .values()
            .filter(|r| r.get("Type").and_then(serde_json::Value::as_str) == Some(kind))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intrinsic::Expr;
    use crate::resource::ResourceType;
    use crate::stack::Parameter;
    use serde_json::json;

    fn small_stack() -> Stack {
        let mut stack = Stack::new("tpl").unwrap().with_description("test stack");
        stack
            .add_parameter(
                "image-id",
                Parameter {
                    kind: "String".into(),
                    default: Some("ami-123".into()),
                    description: None,
                },
            )
            .unwrap();
        let vpc = stack
            .add_resource(
                "vpc",
                ResourceType::Vpc,
                Expr::object([("CidrBlock", Expr::from("10.0.0.0/16"))]),
            )
            .unwrap();
        stack.add_output("VPC-ID", vpc.reference()).unwrap();
        stack
    }

    #[test]
    fn test_template_sections() {
        let template = small_stack().synthesize().unwrap();
        let value = serde_json::to_value(&template).unwrap();
        assert_eq!(value["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(value["Description"], "test stack");
        assert_eq!(value["Parameters"]["ImageId"], json!({ "Type": "String", "Default": "ami-123" }));
        assert_eq!(value["Resources"]["Vpc"]["Type"], "AWS::EC2::VPC");
        assert_eq!(
            value["Outputs"]["VpcId"],
            json!({ "Value": { "Ref": "Vpc" }, "Description": "VPC-ID" })
        );
        assert_eq!(template.count_of("AWS::EC2::VPC"), 1);
    }

    #[test]
    fn test_json_and_yaml_agree() {
        let template = small_stack().synthesize().unwrap();
        let from_json: Template = serde_json::from_str(&template.to_json().unwrap()).unwrap();
        let from_yaml: Template = serde_yaml::from_str(&template.to_yaml().unwrap()).unwrap();
        assert_eq!(from_json, template);
        assert_eq!(from_yaml, template);
        assert!(template.size_bytes().unwrap() < template.to_json().unwrap().len());
    }
}
