//! Dependency graph - orders descriptors so every resource follows the
//! resources it references

use crate::descriptor::ResourceDescriptor;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// A directed acyclic graph of resource descriptors
///
/// Descriptors keep their insertion order, which is the tie-break for
/// resources with no ordering constraint between them.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    descriptors: Vec<ResourceDescriptor>,
    index: HashMap<String, usize>,
}

/// Visit marks for the depth-first traversal
#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor
    ///
    /// Fails with [`Error::DuplicateId`] if a descriptor with the same id
    /// already exists. References are not checked here, so descriptors may be
    /// added in any order.
    pub fn add(&mut self, descriptor: ResourceDescriptor) -> Result<()> {
        if self.index.contains_key(descriptor.id()) {
            return Err(Error::DuplicateId(descriptor.id().to_string()));
        }
        log::debug!(
            "Declared {} '{}' ({} references)",
            descriptor.kind(),
            descriptor.id(),
            descriptor.references().len()
        );
        self.index
            .insert(descriptor.id().to_string(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Look up a descriptor by id
    pub fn get(&self, id: &str) -> Option<&ResourceDescriptor> {
        self.index.get(id).map(|&i| &self.descriptors[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptors in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.descriptors.iter()
    }

    /// Ids of descriptors that reference `id` directly, in insertion order
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.descriptors
            .iter()
            .filter(|d| d.references().iter().any(|r| r == id))
            .map(ResourceDescriptor::id)
            .collect()
    }

    /// Check that every reference resolves to a descriptor in this graph
    pub fn validate(&self) -> Result<()> {
        for descriptor in &self.descriptors {
            if let Some(missing) = descriptor
                .references()
                .iter()
                .find(|r| !self.index.contains_key(r.as_str()))
            {
                return Err(Error::UnknownReference {
                    from: descriptor.id().to_string(),
                    to: missing.clone(),
                });
            }
        }
        Ok(())
    }

    /// Ids in realization order
    ///
    /// Every descriptor appears exactly once and after all descriptors it
    /// references. Roots are visited in insertion order and references in
    /// declaration order, so the result is deterministic for a given graph.
    /// Fails with [`Error::Cycle`] naming the members of the first cycle
    /// found; no partial order is returned.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        Ok(self
            .sorted_indices()?
            .into_iter()
            .map(|i| self.descriptors[i].id().to_string())
            .collect())
    }

    /// Descriptors in realization order
    pub fn ordered(&self) -> Result<Vec<&ResourceDescriptor>> {
        Ok(self
            .sorted_indices()?
            .into_iter()
            .map(|i| &self.descriptors[i])
            .collect())
    }

    /// Group the realization order into waves of ids
    ///
    /// Every descriptor's references lie in earlier waves, so the members of
    /// one wave can be realized independently of each other. Within a wave the
    /// topological order is kept.
    pub fn levels(&self) -> Result<Vec<Vec<String>>> {
        Ok(self
            .waves()?
            .into_iter()
            .map(|wave| wave.into_iter().map(|d| d.id().to_string()).collect())
            .collect())
    }

    /// Same grouping as [`levels`](Self::levels), yielding descriptors
    pub fn waves(&self) -> Result<Vec<Vec<&ResourceDescriptor>>> {
        let order = self.sorted_indices()?;
        let mut depth = vec![0usize; self.descriptors.len()];
        let mut waves: Vec<Vec<&ResourceDescriptor>> = Vec::new();

        for node in order {
            let descriptor = &self.descriptors[node];
            // references are already placed: the order is topological
            let level = descriptor
                .references()
                .iter()
                .map(|r| depth[self.index[r.as_str()]] + 1)
                .max()
                .unwrap_or(0);
            depth[node] = level;
            if waves.len() <= level {
                waves.resize_with(level + 1, Vec::new);
            }
            waves[level].push(descriptor);
        }

        Ok(waves)
    }

    fn sorted_indices(&self) -> Result<Vec<usize>> {
        self.validate()?;

        let mut marks = vec![Mark::Unvisited; self.descriptors.len()];
        let mut stack: Vec<usize> = Vec::new();
        let mut order = Vec::with_capacity(self.descriptors.len());

        for root in 0..self.descriptors.len() {
            if marks[root] == Mark::Unvisited {
                self.visit(root, &mut marks, &mut stack, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit(
        &self,
        node: usize,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<()> {
        marks[node] = Mark::OnStack;
        stack.push(node);

        for reference in self.descriptors[node].references() {
            let next = self.index[reference.as_str()];
            match marks[next] {
                Mark::Done => {}
                Mark::Unvisited => self.visit(next, marks, stack, order)?,
                Mark::OnStack => {
                    let start = stack.iter().position(|&i| i == next).unwrap_or(0);
                    let members = stack[start..]
                        .iter()
                        .map(|&i| self.descriptors[i].id().to_string())
                        .collect();
                    return Err(Error::Cycle { members });
                }
            }
        }

        stack.pop();
        marks[node] = Mark::Done;
        order.push(node);
        Ok(())
    }
}

/// Random graph shapes for property tests
#[cfg(test)]
pub(crate) mod strategies {
    use super::DependencyGraph;
    use crate::descriptor::ResourceDescriptor;
    use crate::types::ResourceKind;
    use proptest::prelude::*;

    /// Dependencies of node `i` and the order nodes are inserted in
    pub(crate) type Shape = (Vec<Vec<usize>>, Vec<usize>);

    pub(crate) fn node_id(i: usize) -> String {
        format!("r{i}")
    }

    /// Acyclic graphs of 1 to 12 nodes: every edge points to a lower index,
    /// and nodes are inserted in a shuffled order
    pub(crate) fn arb_dag() -> BoxedStrategy<Shape> {
        (1usize..=12)
            .prop_flat_map(|n| {
                let deps: Vec<BoxedStrategy<Vec<usize>>> = (0..n)
                    .map(|i| {
                        if i == 0 {
                            Just(Vec::new()).boxed()
                        } else {
                            prop::collection::vec(0..i, 0..=3).boxed()
                        }
                    })
                    .collect();
                let insertion = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
                (deps, insertion)
            })
            .boxed()
    }

    /// [`arb_dag`] with at least two nodes and one injected back-edge
    ///
    /// Node `hi` depends on `lo` and `lo` depends back on `hi`.
    pub(crate) fn arb_cyclic() -> BoxedStrategy<Shape> {
        arb_dag()
            .prop_filter("needs two nodes", |(deps, _)| deps.len() >= 2)
            .prop_flat_map(|(deps, insertion)| {
                let edge = (1..deps.len()).prop_flat_map(|hi| (Just(hi), 0..hi));
                (Just(deps), Just(insertion), edge)
            })
            .prop_map(|(mut deps, insertion, (hi, lo))| {
                deps[hi].push(lo);
                deps[lo].push(hi);
                (deps, insertion)
            })
            .boxed()
    }

    /// Every node is a network ordered after its dependencies
    pub(crate) fn build_graph(deps: &[Vec<usize>], insertion: &[usize]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for &i in insertion {
            let mut builder = ResourceDescriptor::builder(node_id(i), ResourceKind::Network)
                .param("cidr", "10.0.0.0/16");
            for &dep in &deps[i] {
                builder = builder.depends_on(node_id(dep));
            }
            graph.add(builder.build().unwrap()).unwrap();
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Reference, ResourceKind};

    fn network(id: &str) -> ResourceDescriptor {
        ResourceDescriptor::builder(id, ResourceKind::Network)
            .param("cidr", "10.0.0.0/16")
            .build()
            .unwrap()
    }

    fn security_group(id: &str, network: &str) -> ResourceDescriptor {
        ResourceDescriptor::builder(id, ResourceKind::SecurityGroup)
            .param("network", Reference::id_of(network))
            .build()
            .unwrap()
    }

    fn instance(id: &str, subnet: &str, sg: Option<&str>) -> ResourceDescriptor {
        let mut builder = ResourceDescriptor::builder(id, ResourceKind::Instance)
            .param("instance_type", "t3.small")
            .param("subnet", Reference::id_of(subnet));
        if let Some(sg) = sg {
            builder = builder.param("security_group", Reference::id_of(sg));
        }
        builder.build().unwrap()
    }

    /// Security group that only orders after `after`; used to build cycles
    fn group_after(id: &str, after: &str) -> ResourceDescriptor {
        ResourceDescriptor::builder(id, ResourceKind::SecurityGroup)
            .param("network", Reference::id_of(after))
            .build()
            .unwrap()
    }

    fn assert_respects_edges(graph: &DependencyGraph, order: &[String]) {
        assert_eq!(order.len(), graph.len());
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        assert_eq!(position.len(), graph.len(), "every id exactly once");
        for d in graph.iter() {
            for r in d.references() {
                assert!(
                    position[r.as_str()] < position[d.id()],
                    "{r} must come before {}",
                    d.id()
                );
            }
        }
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut graph = DependencyGraph::new();
        graph.add(network("vpc")).unwrap();
        let err = graph.add(network("vpc")).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(id) if id == "vpc"));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_network_security_group_instance_order() {
        let mut graph = DependencyGraph::new();
        graph.add(network("N")).unwrap();
        graph.add(security_group("S", "N")).unwrap();
        graph.add(instance("I", "N", Some("S"))).unwrap();

        assert_eq!(graph.topological_order().unwrap(), ["N", "S", "I"]);
    }

    #[test]
    fn test_dependencies_inserted_after_dependents() {
        let mut graph = DependencyGraph::new();
        graph.add(instance("I", "N", Some("S"))).unwrap();
        graph.add(security_group("S", "N")).unwrap();
        graph.add(network("N")).unwrap();

        let order = graph.topological_order().unwrap();
        assert_respects_edges(&graph, &order);
        assert_eq!(order, ["N", "S", "I"]);
    }

    #[test]
    fn test_two_node_cycle_names_both_members() {
        let mut graph = DependencyGraph::new();
        graph.add(group_after("A", "B")).unwrap();
        graph.add(group_after("B", "A")).unwrap();

        match graph.topological_order() {
            Err(Error::Cycle { members }) => {
                assert!(members.contains(&"A".to_string()));
                assert!(members.contains(&"B".to_string()));
                assert_eq!(members.len(), 2);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_reports_only_cycle_members() {
        let mut graph = DependencyGraph::new();
        graph.add(network("root")).unwrap();
        graph.add(group_after("X", "Z")).unwrap();
        graph.add(group_after("Y", "X")).unwrap();
        graph.add(group_after("Z", "Y")).unwrap();
        graph.add(instance("tail", "X", None)).unwrap();

        let err = graph.topological_order().unwrap_err();
        let Error::Cycle { members } = err else {
            panic!("expected cycle error");
        };
        let mut sorted = members.clone();
        sorted.sort();
        assert_eq!(sorted, ["X", "Y", "Z"]);
        assert!(graph.levels().is_err());
    }

    #[test]
    fn test_independent_chains_follow_insertion_order() {
        let mut graph = DependencyGraph::new();
        graph.add(network("N1")).unwrap();
        graph.add(instance("I1", "N1", None)).unwrap();
        graph.add(network("N2")).unwrap();
        graph.add(instance("I2", "N2", None)).unwrap();

        assert_eq!(graph.topological_order().unwrap(), ["N1", "I1", "N2", "I2"]);
    }

    #[test]
    fn test_order_is_deterministic() {
        let build = || {
            let mut graph = DependencyGraph::new();
            graph.add(network("vpc")).unwrap();
            for i in 0..8 {
                graph.add(security_group(&format!("sg{i}"), "vpc")).unwrap();
                graph
                    .add(instance(&format!("web{i}"), "vpc", Some(&format!("sg{i}"))))
                    .unwrap();
            }
            graph
        };
        let first = build().topological_order().unwrap();
        let second = build().topological_order().unwrap();
        assert_eq!(first, second);
        assert_respects_edges(&build(), &first);
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let mut graph = DependencyGraph::new();
        graph.add(security_group("S", "missing")).unwrap();
        let err = graph.topological_order().unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownReference { ref from, ref to } if from == "S" && to == "missing"
        ));
    }

    #[test]
    fn test_levels_group_independent_resources() {
        let mut graph = DependencyGraph::new();
        graph.add(network("vpc")).unwrap();
        graph.add(security_group("web-sg", "vpc")).unwrap();
        graph.add(security_group("db-sg", "vpc")).unwrap();
        graph.add(instance("web", "vpc", Some("web-sg"))).unwrap();
        graph.add(network("other")).unwrap();

        let levels = graph.levels().unwrap();
        assert_eq!(
            levels,
            vec![
                vec!["vpc".to_string(), "other".to_string()],
                vec!["web-sg".to_string(), "db-sg".to_string()],
                vec!["web".to_string()],
            ]
        );
    }

    #[test]
    fn test_dependents() {
        let mut graph = DependencyGraph::new();
        graph.add(network("vpc")).unwrap();
        graph.add(security_group("a", "vpc")).unwrap();
        graph.add(security_group("b", "vpc")).unwrap();
        assert_eq!(graph.dependents("vpc"), ["a", "b"]);
        assert!(graph.dependents("a").is_empty());
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::new();
        assert!(graph.is_empty());
        assert!(graph.topological_order().unwrap().is_empty());
        assert!(graph.levels().unwrap().is_empty());
    }

    mod properties {
        use super::super::strategies::{arb_cyclic, arb_dag, build_graph};
        use crate::error::Error;
        use proptest::prelude::*;
        use std::collections::HashMap;

        fn positions(order: &[String]) -> HashMap<&str, usize> {
            order
                .iter()
                .enumerate()
                .map(|(i, id)| (id.as_str(), i))
                .collect()
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(256))]

            #[test]
            fn prop_order_is_permutation_respecting_edges((deps, insertion) in arb_dag()) {
                let graph = build_graph(&deps, &insertion);
                let order = graph.topological_order().unwrap();

                prop_assert_eq!(order.len(), deps.len());
                let position = positions(&order);
                prop_assert_eq!(position.len(), deps.len());
                for d in graph.iter() {
                    for r in d.references() {
                        prop_assert!(position[r.as_str()] < position[d.id()]);
                    }
                }
            }

            #[test]
            fn prop_order_is_deterministic((deps, insertion) in arb_dag()) {
                let graph = build_graph(&deps, &insertion);
                let first = graph.topological_order().unwrap();
                prop_assert_eq!(&first, &graph.topological_order().unwrap());
                let rebuilt = build_graph(&deps, &insertion);
                prop_assert_eq!(&first, &rebuilt.topological_order().unwrap());
            }

            #[test]
            fn prop_levels_place_references_earlier((deps, insertion) in arb_dag()) {
                let graph = build_graph(&deps, &insertion);
                let levels = graph.levels().unwrap();

                let mut level_of = HashMap::new();
                for (level, ids) in levels.iter().enumerate() {
                    prop_assert!(!ids.is_empty());
                    for id in ids {
                        prop_assert!(level_of.insert(id.as_str(), level).is_none());
                    }
                }
                prop_assert_eq!(level_of.len(), deps.len());
                for d in graph.iter() {
                    for r in d.references() {
                        prop_assert!(level_of[r.as_str()] < level_of[d.id()]);
                    }
                }
            }

            #[test]
            fn prop_cycle_members_form_a_loop((deps, insertion) in arb_cyclic()) {
                let graph = build_graph(&deps, &insertion);
                let members = match graph.topological_order() {
                    Err(Error::Cycle { members }) => members,
                    other => {
                        return Err(TestCaseError::fail(format!("expected a cycle, got {other:?}")));
                    }
                };

                prop_assert!(!members.is_empty());
                for (i, id) in members.iter().enumerate() {
                    let next = &members[(i + 1) % members.len()];
                    let descriptor = graph.get(id).unwrap();
                    prop_assert!(descriptor.references().contains(next));
                }
                prop_assert!(matches!(graph.levels(), Err(Error::Cycle { .. })), "expected a cycle error from levels()");
                prop_assert!(graph.ordered().is_err());
            }
        }
    }
}
