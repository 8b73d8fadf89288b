//! The stack: an ordered set of declarations that synthesizes to a template.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::error::{Result, StackError};
use crate::graph::DependencyGraph;
use crate::intrinsic::Expr;
use crate::naming::{logical_id, validate_logical_id, validate_stack_name};
use crate::resource::{Resource, ResourceRef, ResourceType};
use crate::template::Template;

/// A template input parameter.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    /// Platform parameter type.
    #[serde(rename = "Type")]
    pub kind: String,
    /// Default value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Human description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A named value exported after deployment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    /// Value expression, resolved by the platform.
    pub value: Expr,
    /// Original (operator-facing) output name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A stack definition.
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    description: Option<String>,
    parameters: BTreeMap<String, Parameter>,
    resources: BTreeMap<String, Resource>,
    outputs: BTreeMap<String, Output>,
}

impl Stack {
    /// Create an empty stack.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::InvalidStackName`] if `name` is not a valid stack name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_stack_name(&name)?;
        Ok(Self {
            name,
            description: None,
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        })
    }

    /// Set the template description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Stack name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Template description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Declare a template parameter and return a `Ref` to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a valid logical ID or is taken.
    pub fn add_parameter(&mut self, name: &str, parameter: Parameter) -> Result<Expr> {
        let id = logical_id(name);
        self.claim(&id)?;
        debug!(parameter = %id, kind = %parameter.kind, "Declared parameter");
        self.parameters.insert(id.clone(), parameter);
        Ok(Expr::reference(id))
    }

    /// Declare a resource under a human name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name does not produce a valid, unused logical
    /// ID or if `properties` is not a map.
    pub fn add_resource(
        &mut self,
        name: &str,
        kind: ResourceType,
        properties: Expr,
    ) -> Result<ResourceRef> {
        self.insert(Resource::new(logical_id(name), kind, properties))
    }

    /// Declare a fully built resource, keeping its logical ID as given.
    ///
    /// # Errors
    ///
    /// Same as [`Stack::add_resource`].
    pub fn insert(&mut self, resource: Resource) -> Result<ResourceRef> {
        self.claim(&resource.logical_id)?;
        if !matches!(resource.properties, Expr::Map(_)) {
            return Err(StackError::invalid(
                "properties",
                format!("{} properties must be an object", resource.logical_id),
            ));
        }
        debug!(resource = %resource.logical_id, kind = %resource.kind, "Declared resource");
        let handle = ResourceRef::new(resource.logical_id.clone(), resource.kind);
        self.resources.insert(resource.logical_id.clone(), resource);
        Ok(handle)
    }

    /// Add an explicit `DependsOn` edge: `dependent` is created after `dependency`.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::DanglingReference`] if either side is not in this stack.
    pub fn add_dependency(&mut self, dependent: &ResourceRef, dependency: &ResourceRef) -> Result<()> {
        if !self.resources.contains_key(dependency.id()) {
            return Err(StackError::DanglingReference {
                from: dependent.id().to_string(),
                target: dependency.id().to_string(),
            });
        }
        let resource = self.resource_mut(dependent)?;
        resource.depends_on.insert(dependency.id().to_string());
        Ok(())
    }

    /// Declare an output under its operator-facing name.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::EmptyOutput`] for an empty literal value and an
    /// error if the derived logical ID is invalid or taken.
    pub fn add_output(&mut self, name: &str, value: Expr) -> Result<()> {
        if value.is_empty_literal() {
            return Err(StackError::EmptyOutput(name.to_string()));
        }
        let id = logical_id(name);
        validate_logical_id(&id)?;
        if self.outputs.contains_key(&id) {
            return Err(StackError::DuplicateLogicalId(id));
        }
        self.outputs.insert(
            id,
            Output {
                value,
                description: Some(name.to_string()),
            },
        );
        Ok(())
    }

    /// Look up a resource by logical ID.
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Handle for an already declared logical ID.
    #[must_use]
    pub fn resource_ref(&self, id: &str) -> Option<ResourceRef> {
        self.resources
            .get(id)
            .map(|r| ResourceRef::new(r.logical_id.clone(), r.kind))
    }

    /// Mutable access to a declared resource.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::DanglingReference`] if the handle belongs to another stack.
    pub fn resource_mut(&mut self, handle: &ResourceRef) -> Result<&mut Resource> {
        self.resources
            .get_mut(handle.id())
            .ok_or_else(|| StackError::DanglingReference {
                from: self.name.clone(),
                target: handle.id().to_string(),
            })
    }

    /// All resources of one type, in logical ID order.
    pub fn resources_of(&self, kind: ResourceType) -> impl Iterator<Item = &Resource> {
        self.resources.values().filter(move |r| r.kind == kind)
    }

    /// All resources keyed by logical ID.
    #[must_use]
    pub fn resources(&self) -> &BTreeMap<String, Resource> {
        &self.resources
    }

    /// All parameters keyed by logical ID.
    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.parameters
    }

    /// All outputs keyed by logical ID.
    #[must_use]
    pub fn outputs(&self) -> &BTreeMap<String, Output> {
        &self.outputs
    }

    /// Resolve the dependency graph.
    ///
    /// # Errors
    ///
    /// See [`DependencyGraph::build`].
    pub fn graph(&self) -> Result<DependencyGraph> {
        DependencyGraph::build(self)
    }

    /// Resolve the graph and render the template.
    ///
    /// # Errors
    ///
    /// Fails if the graph does not resolve or a value cannot be serialized.
    pub fn synthesize(&self) -> Result<Template> {
        let graph = self.graph()?;
        debug!(
            resources = graph.len(),
            edges = graph.edge_count(),
            "Resolved dependency graph"
        );
        Template::from_stack(self)
    }

    /// Make sure `id` is a valid, unused logical ID.
    fn claim(&self, id: &str) -> Result<()> {
        validate_logical_id(id)?;
        if self.resources.contains_key(id) || self.parameters.contains_key(id) {
            return Err(StackError::DuplicateLogicalId(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut stack = Stack::new("dup").unwrap();
        stack
            .add_resource("moodle-sg", ResourceType::SecurityGroup, Expr::empty_object())
            .unwrap();
        let err = stack
            .add_resource("moodle sg", ResourceType::SecurityGroup, Expr::empty_object())
            .unwrap_err();
        assert!(matches!(err, StackError::DuplicateLogicalId(id) if id == "MoodleSg"));
    }

    #[test]
    fn test_parameter_and_resource_share_namespace() {
        let mut stack = Stack::new("ns").unwrap();
        let image = stack
            .add_parameter(
                "image-id",
                Parameter {
                    kind: "String".into(),
                    default: None,
                    description: None,
                },
            )
            .unwrap();
        assert_eq!(image, Expr::reference("ImageId"));
        assert!(stack
            .add_resource("image-id", ResourceType::Instance, Expr::empty_object())
            .is_err());
    }

    #[test]
    fn test_non_object_properties_are_rejected() {
        let mut stack = Stack::new("props").unwrap();
        let err = stack
            .add_resource("vpc", ResourceType::Vpc, Expr::from("nope"))
            .unwrap_err();
        assert!(matches!(err, StackError::InvalidParameter { parameter: "properties", .. }));
    }

    #[test]
    fn test_empty_output_is_rejected() {
        let mut stack = Stack::new("outputs").unwrap();
        assert!(matches!(
            stack.add_output("MOODLE-EFS-ID", Expr::from("")),
            Err(StackError::EmptyOutput(_))
        ));
        stack.add_output("MOODLE-EFS-ID", Expr::from("fs-1")).unwrap();
        assert!(stack.outputs().contains_key("MoodleEfsId"));
        assert!(matches!(
            stack.add_output("moodle efs id", Expr::from("fs-2")),
            Err(StackError::DuplicateLogicalId(_))
        ));
    }

    #[test]
    fn test_add_dependency_requires_both_sides() {
        let mut stack = Stack::new("deps").unwrap();
        let a = stack
            .add_resource("a", ResourceType::Vpc, Expr::empty_object())
            .unwrap();
        let mut other = Stack::new("other").unwrap();
        let b = other
            .add_resource("b", ResourceType::Vpc, Expr::empty_object())
            .unwrap();
        assert!(stack.add_dependency(&a, &b).is_err());
        assert!(stack.add_dependency(&b, &a).is_err());
    }
}
