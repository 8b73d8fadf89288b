//! Resolved dependency graph of a stack.
//!
//! An edge `a -> b` means `a` must exist before `b` is created. Edges come
//! from explicit `DependsOn` entries and from every `Ref`/`Fn::GetAtt` that
//! points at another resource.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use petgraph::algo::{has_path_connecting, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::{Result, StackError};
use crate::stack::Stack;

/// Dependency graph over the resources of one stack.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    nodes: BTreeMap<String, NodeIndex>,
    order: Vec<NodeIndex>,
}

impl DependencyGraph {
    /// Resolve the graph of `stack`.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::DanglingReference`] if a resource or output
    /// points at a logical ID that is neither a resource nor a parameter, and
    /// [`StackError::DependencyCycle`] if the edges form a cycle.
    pub fn build(stack: &Stack) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut nodes = BTreeMap::new();

        for id in stack.resources().keys() {
            nodes.insert(id.clone(), graph.add_node(id.clone()));
        }

        for (id, resource) in stack.resources() {
            let dependent = nodes[id];
            for target in resource.dependencies() {
                if let Some(&dependency) = nodes.get(target) {
                    graph.update_edge(dependency, dependent, ());
                } else if !stack.parameters().contains_key(target) {
                    return Err(StackError::DanglingReference {
                        from: id.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }

        for (name, output) in stack.outputs() {
            for target in output.value.references() {
                if !nodes.contains_key(target) && !stack.parameters().contains_key(target) {
                    return Err(StackError::DanglingReference {
                        from: name.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }

        let order = toposort(&graph, None).map_err(|_| StackError::DependencyCycle {
            members: cycle_members(&graph),
        })?;

        Ok(Self {
            graph,
            nodes,
            order,
        })
    }

    /// Logical IDs in an order where every resource follows its dependencies.
    #[must_use]
    pub fn creation_order(&self) -> Vec<&str> {
        self.order.iter().map(|&n| self.graph[n].as_str()).collect()
    }

    /// Whether `dependent` has a direct edge from `dependency`.
    #[must_use]
    pub fn depends_on(&self, dependent: &str, dependency: &str) -> bool {
        match (self.nodes.get(dependency), self.nodes.get(dependent)) {
            (Some(&from), Some(&to)) => self.graph.contains_edge(from, to),
            _ => false,
        }
    }

    /// Whether `dependent` needs `dependency` through any chain of edges.
    #[must_use]
    pub fn depends_on_transitively(&self, dependent: &str, dependency: &str) -> bool {
        match (self.nodes.get(dependency), self.nodes.get(dependent)) {
            (Some(&from), Some(&to)) if from != to => {
                has_path_connecting(&self.graph, from, to, None)
            }
            _ => false,
        }
    }

    /// Direct dependencies of `id`, sorted.
    #[must_use]
    pub fn dependencies_of(&self, id: &str) -> BTreeSet<&str> {
        self.nodes
            .get(id)
            .map(|&n| {
                self.graph
                    .neighbors_directed(n, Direction::Incoming)
                    .map(|d| self.graph[d].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of resources in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph has no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of dependency edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Render the graph in Graphviz dot format.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph stack {\n  rankdir=LR;\n");
        for id in self.nodes.keys() {
            let _ = writeln!(out, "  \"{id}\";");
        }
        let mut edges: Vec<(&str, &str)> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (self.graph[a].as_str(), self.graph[b].as_str()))
            .collect();
        edges.sort_unstable();
        for (from, to) in edges {
            let _ = writeln!(out, "  \"{from}\" -> \"{to}\";");
        }
        out.push_str("}\n");
        out
    }
}

/// Logical IDs taking part in any cycle, sorted.
fn cycle_members(graph: &DiGraph<String, ()>) -> Vec<String> {
    let mut members: Vec<String> = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || scc.iter().any(|&n| graph.contains_edge(n, n)))
        .flatten()
        .map(|n| graph[n].clone())
        .collect();
    members.sort();
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intrinsic::Expr;
    use crate::resource::ResourceType;

    fn chain() -> Stack {
        let mut stack = Stack::new("graph-test").unwrap();
        let vpc = stack
            .add_resource("vpc", ResourceType::Vpc, Expr::empty_object())
            .unwrap();
        let sg = stack
            .add_resource(
                "sg",
                ResourceType::SecurityGroup,
                Expr::object([("VpcId", vpc.reference())]),
            )
            .unwrap();
        stack
            .add_resource(
                "instance",
                ResourceType::Instance,
                Expr::object([("SecurityGroupIds", Expr::list([sg.attr("GroupId")]))]),
            )
            .unwrap();
        stack
    }

    #[test]
    fn test_creation_order_follows_references() {
        let graph = chain().graph().unwrap();
        assert_eq!(graph.creation_order(), vec!["Vpc", "Sg", "Instance"]);
        assert!(graph.depends_on("Sg", "Vpc"));
        assert!(!graph.depends_on("Instance", "Vpc"));
        assert!(graph.depends_on_transitively("Instance", "Vpc"));
        assert!(!graph.depends_on_transitively("Vpc", "Instance"));
        assert_eq!(graph.dependencies_of("Instance").into_iter().collect::<Vec<_>>(), vec!["Sg"]);
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_cycle_is_rejected_with_members() {
        let mut stack = chain();
        let vpc = stack.resource_ref("Vpc").unwrap();
        let instance = stack.resource_ref("Instance").unwrap();
        stack.add_dependency(&vpc, &instance).unwrap();

        match stack.graph() {
            Err(StackError::DependencyCycle { members }) => {
                assert_eq!(members, vec!["Instance", "Sg", "Vpc"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_dangling_reference_is_rejected() {
        let mut stack = Stack::new("graph-test").unwrap();
        stack
            .add_resource(
                "sg",
                ResourceType::SecurityGroup,
                Expr::object([("VpcId", Expr::reference("NoSuchVpc"))]),
            )
            .unwrap();

        match stack.graph() {
            Err(StackError::DanglingReference { from, target }) => {
                assert_eq!(from, "Sg");
                assert_eq!(target, "NoSuchVpc");
            }
            other => panic!("expected dangling reference, got {other:?}"),
        }
    }

    #[test]
    fn test_dot_output_lists_edges() {
        let dot = chain().graph().unwrap().to_dot();
        assert!(dot.starts_with("digraph stack {"));
        assert!(dot.contains("\"Vpc\" -> \"Sg\";"));
        assert!(dot.contains("\"Sg\" -> \"Instance\";"));
    }
}
