//! Static dependency graph of the registered components.
//!
//! The graph is derived from parameter tables and overrides only; nothing is
//! constructed. Nodes are registrations, edges point from a registration to
//! the registrations its parameters would resolve to.
//!
//! With the `dev-tools` feature, [`DependencyGraph::to_dot`] renders the graph
//! in DOT format for Graphviz.

use std::collections::HashSet;

use crate::registration::{DependencyKind, Lifestyle, OverrideSource, RegistrationId};
use crate::registry::Registry;
use crate::service::ServiceType;

/// A registration in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
	/// Registration id; also the node index.
	pub registration: RegistrationId,
	/// Service the registration is exposed as.
	pub service: ServiceType,
	/// Concrete type name.
	pub implementation: &'static str,
	/// Selection key.
	pub key: Option<String>,
	/// Lifestyle of the registration.
	pub lifestyle: Lifestyle,
}

/// `from` needs `to` to satisfy `parameter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphEdge {
	/// Index of the dependent node.
	pub from: usize,
	/// Index of the dependency node.
	pub to: usize,
	/// Parameter name on `from`.
	pub parameter: &'static str,
}

/// Dependency graph of a registry.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
	nodes: Vec<GraphNode>,
	edges: Vec<GraphEdge>,
}

impl DependencyGraph {
	/// Builds the graph of `registry`.
	///
	/// Value overrides produce no edge. Keyed overrides point at the keyed
	/// registration, collection parameters at every registration of the
	/// element type, and plain parameters at the registration single
	/// resolution would select. Parameters answered by sub-resolvers are not
	/// represented.
	pub fn build(registry: &Registry) -> Self {
		let nodes = registry
			.iter()
			.map(|registration| GraphNode {
				registration: registration.id(),
				service: registration.service(),
				implementation: registration.implementation(),
				key: registration.key().map(str::to_string),
				lifestyle: registration.lifestyle(),
			})
			.collect();

		let mut edges = Vec::new();
		for registration in registry.iter() {
			let from = registration.id().index();
			for parameter in registration.parameters() {
				let targets = match registration.override_for(parameter.name()).map(|o| o.source()) {
					Some(OverrideSource::Value(_)) => Vec::new(),
					Some(OverrideSource::Keyed(key)) => registry
						.lookup_keyed(parameter.requested().id(), key)
						.into_iter()
						.collect(),
					None => match parameter.kind() {
						DependencyKind::Collection(element) => registry.lookup(element.element().id()),
						DependencyKind::Service(service) => {
							registry.select(service.id()).into_iter().collect()
						}
					},
				};
				edges.extend(targets.iter().map(|target| GraphEdge {
					from,
					to: target.id().index(),
					parameter: parameter.name(),
				}));
			}
		}

		Self { nodes, edges }
	}

	/// Nodes in registration order.
	pub fn nodes(&self) -> &[GraphNode] {
		&self.nodes
	}

	/// Edges in parameter order.
	pub fn edges(&self) -> &[GraphEdge] {
		&self.edges
	}

	/// Node at `index`.
	///
	/// # Panics
	///
	/// Panics if `index` is out of bounds.
	pub fn node(&self, index: usize) -> &GraphNode {
		&self.nodes[index]
	}

	/// Direct dependencies of the node at `index`.
	pub fn dependencies_of(&self, index: usize) -> Vec<&GraphNode> {
		self.edges
			.iter()
			.filter(|edge| edge.from == index)
			.map(|edge| &self.nodes[edge.to])
			.collect()
	}

	/// First dependency cycle found, as a service path whose first and last
	/// entries are the same service.
	pub fn find_cycle(&self) -> Option<Vec<ServiceType>> {
		let mut visited = HashSet::new();
		let mut on_stack = HashSet::new();
		let mut path = Vec::new();

		(0..self.nodes.len()).find_map(|start| {
			if visited.contains(&start) {
				return None;
			}
			self.dfs_find_cycle(start, &mut visited, &mut on_stack, &mut path)
		})
	}

	fn dfs_find_cycle(
		&self,
		node: usize,
		visited: &mut HashSet<usize>,
		on_stack: &mut HashSet<usize>,
		path: &mut Vec<usize>,
	) -> Option<Vec<ServiceType>> {
		visited.insert(node);
		on_stack.insert(node);
		path.push(node);

		for edge in self.edges.iter().filter(|edge| edge.from == node) {
			if on_stack.contains(&edge.to) {
				let start = path.iter().position(|&p| p == edge.to)?;
				let mut cycle: Vec<ServiceType> =
					path[start..].iter().map(|&i| self.nodes[i].service).collect();
				cycle.push(self.nodes[edge.to].service);
				return Some(cycle);
			}
			if !visited.contains(&edge.to)
				&& let Some(cycle) = self.dfs_find_cycle(edge.to, visited, on_stack, path)
			{
				return Some(cycle);
			}
		}

		path.pop();
		on_stack.remove(&node);
		None
	}

	/// Edges from a singleton directly to a scoped registration.
	pub fn captive_dependencies(&self) -> Vec<&GraphEdge> {
		self.edges
			.iter()
			.filter(|edge| {
				self.nodes[edge.from].lifestyle == Lifestyle::Singleton
					&& self.nodes[edge.to].lifestyle == Lifestyle::Scoped
			})
			.collect()
	}

	/// Renders the graph in DOT format.
	#[cfg(feature = "dev-tools")]
	pub fn to_dot(&self) -> String {
		let mut output = String::from("digraph DependencyGraph {\n");
		output.push_str("  rankdir=LR;\n");
		output.push_str("  node [shape=box, style=rounded];\n\n");

		for (index, node) in self.nodes.iter().enumerate() {
			let color = match node.lifestyle {
				Lifestyle::Singleton => "lightblue",
				Lifestyle::Scoped => "lightgreen",
				Lifestyle::Transient => "lightyellow",
			};
			let label = match &node.key {
				Some(key) => format!("{} [{}]\\n({})", node.service, key, node.implementation),
				None => format!("{}\\n({})", node.service, node.implementation),
			};
			output.push_str(&format!(
				"  n{} [label=\"{}\", fillcolor={}, style=filled];\n",
				index, label, color
			));
		}

		output.push('\n');

		for edge in &self.edges {
			output.push_str(&format!(
				"  n{} -> n{} [label=\"{}\"];\n",
				edge.from, edge.to, edge.parameter
			));
		}

		output.push_str("}\n");
		output
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::Arguments;
	use crate::error::DiResult;
	use crate::injectable::Injectable;
	use crate::registration::{ComponentRegistration, Dependency, DependencyOverride};
	use crate::settings::DuplicatePolicy;
	use rstest::rstest;
	use std::sync::Arc;

	struct Config;

	impl Injectable for Config {
		fn construct(_: &Arguments) -> DiResult<Self> {
			Ok(Config)
		}
	}

	struct Repository;

	impl Injectable for Repository {
		fn dependencies() -> Vec<Dependency> {
			vec![Dependency::service::<Config>("config")]
		}

		fn construct(_: &Arguments) -> DiResult<Self> {
			Ok(Repository)
		}
	}

	struct Ping;

	impl Injectable for Ping {
		fn dependencies() -> Vec<Dependency> {
			vec![Dependency::service::<Pong>("pong")]
		}

		fn construct(_: &Arguments) -> DiResult<Self> {
			Ok(Ping)
		}
	}

	struct Pong;

	impl Injectable for Pong {
		fn dependencies() -> Vec<Dependency> {
			vec![Dependency::service::<Ping>("ping")]
		}

		fn construct(_: &Arguments) -> DiResult<Self> {
			Ok(Pong)
		}
	}

	fn registry() -> Registry {
		Registry::new(DuplicatePolicy::Reject)
	}

	// ========================================================================
	// Edges
	// ========================================================================

	#[rstest]
	fn test_plain_parameter_points_at_selected_registration() {
		// Arrange
		let mut registry = registry();
		registry.register(ComponentRegistration::<Config>::new()).unwrap();
		registry.register(ComponentRegistration::<Repository>::new()).unwrap();

		// Act
		let graph = DependencyGraph::build(&registry);

		// Assert
		assert_eq!(graph.nodes().len(), 2);
		assert_eq!(
			graph.edges(),
			&[GraphEdge {
				from: 1,
				to: 0,
				parameter: "config"
			}]
		);
		let deps = graph.dependencies_of(1);
		assert_eq!(deps.len(), 1);
		assert_eq!(deps[0].service, ServiceType::of::<Config>());
	}

	#[rstest]
	fn test_value_override_has_no_edge() {
		let mut registry = registry();
		registry.register(ComponentRegistration::<Config>::new()).unwrap();
		registry
			.register(
				ComponentRegistration::<Repository>::new()
					.depends_on("config", DependencyOverride::value(Config)),
			)
			.unwrap();

		let graph = DependencyGraph::build(&registry);

		assert!(graph.edges().is_empty());
	}

	#[rstest]
	fn test_keyed_override_points_at_keyed_registration() {
		let mut registry = registry();
		registry.register(ComponentRegistration::<Config>::new()).unwrap();
		registry
			.register(ComponentRegistration::<Config>::new().named("replica"))
			.unwrap();
		registry
			.register(
				ComponentRegistration::<Repository>::new()
					.depends_on("config", DependencyOverride::keyed("replica")),
			)
			.unwrap();

		let graph = DependencyGraph::build(&registry);

		assert_eq!(graph.edges().len(), 1);
		assert_eq!(graph.node(graph.edges()[0].to).key.as_deref(), Some("replica"));
	}

	#[rstest]
	fn test_collection_parameter_points_at_every_element() {
		// Arrange
		let mut registry = registry();
		for key in ["a", "b"] {
			registry
				.register(ComponentRegistration::<u8>::instance(Arc::new(1)).named(key))
				.unwrap();
		}
		registry
			.register(
				ComponentRegistration::<String>::factory(|_| Ok(Arc::new(String::new())))
					.parameters(vec![Dependency::collection::<u8>("bytes")]),
			)
			.unwrap();

		// Act
		let graph = DependencyGraph::build(&registry);

		// Assert
		let targets: Vec<usize> = graph.edges().iter().map(|e| e.to).collect();
		assert_eq!(targets, vec![0, 1]);
	}

	// ========================================================================
	// Analysis
	// ========================================================================

	#[rstest]
	fn test_find_cycle_reports_closed_path() {
		// Arrange
		let mut registry = registry();
		registry.register(ComponentRegistration::<Ping>::new()).unwrap();
		registry.register(ComponentRegistration::<Pong>::new()).unwrap();

		// Act
		let cycle = DependencyGraph::build(&registry).find_cycle().unwrap();

		// Assert
		assert_eq!(
			cycle,
			vec![
				ServiceType::of::<Ping>(),
				ServiceType::of::<Pong>(),
				ServiceType::of::<Ping>()
			]
		);
	}

	#[rstest]
	fn test_acyclic_graph_has_no_cycle() {
		let mut registry = registry();
		registry.register(ComponentRegistration::<Config>::new()).unwrap();
		registry.register(ComponentRegistration::<Repository>::new()).unwrap();

		assert!(DependencyGraph::build(&registry).find_cycle().is_none());
	}

	#[rstest]
	fn test_captive_dependencies_flag_singleton_to_scoped() {
		let mut registry = registry();
		registry
			.register(ComponentRegistration::<Config>::new().scoped())
			.unwrap();
		registry.register(ComponentRegistration::<Repository>::new()).unwrap();

		let graph = DependencyGraph::build(&registry);
		let captive = graph.captive_dependencies();

		assert_eq!(captive.len(), 1);
		assert_eq!(captive[0].parameter, "config");
	}

	#[rstest]
	fn test_transient_to_scoped_is_not_captive() {
		let mut registry = registry();
		registry
			.register(ComponentRegistration::<Config>::new().scoped())
			.unwrap();
		registry
			.register(ComponentRegistration::<Repository>::new().transient())
			.unwrap();

		let graph = DependencyGraph::build(&registry);

		assert!(graph.captive_dependencies().is_empty());
	}

	#[cfg(feature = "dev-tools")]
	#[rstest]
	fn test_to_dot_renders_nodes_and_edges() {
		let mut registry = registry();
		registry.register(ComponentRegistration::<Config>::new()).unwrap();
		registry
			.register(ComponentRegistration::<Repository>::new().scoped())
			.unwrap();

		let dot = DependencyGraph::build(&registry).to_dot();

		assert!(dot.starts_with("digraph DependencyGraph {"));
		assert!(dot.contains("fillcolor=lightblue"));
		assert!(dot.contains("fillcolor=lightgreen"));
		assert!(dot.contains("n1 -> n0 [label=\"config\"]"));
	}
}
