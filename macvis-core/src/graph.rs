//! Library dependency graph.
//!
//! An edge `a -> b` means library `a` depends on `b` and re-exports its
//! public surface. Consumers including `a` therefore also see `PUBLIC(b)`,
//! transitively.
//!
//! Performance characteristics:
//! - Graph build: O(|V| + |E|)
//! - Cycle check: one topological sort, O(|V| + |E|)
//! - Public closure: multi-source BFS, O(|V| + |E|)

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{MacvisError, MacvisResult};

/// Dependency graph over library names.
#[derive(Debug, Clone)]
pub struct DependencyGraph<'a> {
    graph: DiGraphMap<&'a str, ()>,
}

impl<'a> DependencyGraph<'a> {
    /// Builds the graph from `(library, dependencies)` pairs.
    ///
    /// Fails on a dependency naming an unknown library and on cycles.
    pub fn build<I>(libraries: I) -> MacvisResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let libraries: Vec<(&'a str, &'a [String])> = libraries.into_iter().collect();
        let mut graph = DiGraphMap::new();

        for (name, _) in &libraries {
            graph.add_node(*name);
        }
        for (name, deps) in &libraries {
            for dep in deps.iter() {
                if !graph.contains_node(dep.as_str()) {
                    return Err(MacvisError::invalid_argument(format!(
                        "library '{}' depends on unknown library '{}'",
                        name, dep
                    )));
                }
                graph.add_edge(*name, dep.as_str(), ());
            }
        }

        let built = Self { graph };
        built.check_acyclic()?;
        Ok(built)
    }

    fn check_acyclic(&self) -> MacvisResult<()> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(MacvisError::cycle(self.describe_cycle(cycle.node_id()))),
        }
    }

    /// Names along one cycle, starting and ending at the same library.
    fn describe_cycle(&self, hint: &'a str) -> Vec<String> {
        std::iter::once(hint)
            .chain(self.graph.nodes())
            .find_map(|node| self.cycle_through(node))
            .unwrap_or_else(|| vec![hint.to_string()])
    }

    /// Shortest dependency path from `start` back to itself.
    fn cycle_through(&self, start: &'a str) -> Option<Vec<String>> {
        let mut parent: HashMap<&'a str, &'a str> = HashMap::new();
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            for next in self.graph.neighbors(node) {
                if next == start {
                    let mut path = vec![start.to_string()];
                    let mut cur = node;
                    while cur != start {
                        path.push(cur.to_string());
                        cur = *parent.get(cur)?;
                    }
                    path.push(start.to_string());
                    let last = path.len() - 1;
                    path[1..last].reverse();
                    return Some(path);
                }
                if !parent.contains_key(next) {
                    parent.insert(next, node);
                    queue.push_back(next);
                }
            }
        }

        None
    }

    /// Dependencies-first order: every library appears after all it depends on.
    pub fn build_order(&self) -> MacvisResult<Vec<&'a str>> {
        let mut order = toposort(&self.graph, None)
            .map_err(|c| MacvisError::cycle(self.describe_cycle(c.node_id())))?;
        order.reverse();
        Ok(order)
    }

    /// Libraries whose public surface is visible when including `roots`:
    /// the roots themselves and everything they transitively depend on.
    ///
    /// Each library appears once, in breadth-first order from the roots.
    pub fn public_closure<'r>(&self, roots: impl IntoIterator<Item = &'r str>) -> Vec<&'a str> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();

        for root in roots {
            // Map back to the graph's own key to keep the 'a lifetime
            if let Some(node) = self.graph.nodes().find(|n| *n == root) {
                if visited.insert(node) {
                    queue.push_back(node);
                }
            }
        }

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for dep in self.graph.neighbors(node) {
                if visited.insert(dep) {
                    queue.push_back(dep);
                }
            }
        }

        order
    }

    /// All `(library, dependency)` edges, in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.graph.all_edges().map(|(a, b, _)| (a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_public_closure_is_transitive() {
        let app = deps(&["net"]);
        let net = deps(&["core"]);
        let core = deps(&[]);
        let graph = DependencyGraph::build([
            ("app", app.as_slice()),
            ("net", net.as_slice()),
            ("core", core.as_slice()),
        ])
        .unwrap();

        assert_eq!(graph.public_closure(["app"]), vec!["app", "net", "core"]);
        assert_eq!(graph.public_closure(["core"]), vec!["core"]);
        assert_eq!(graph.public_closure(["net", "core"]), vec!["net", "core"]);
        assert!(graph.public_closure(["unknown"]).is_empty());
        assert_eq!(graph.build_order().unwrap(), vec!["core", "net", "app"]);
    }

    #[test]
    fn test_diamond_visits_once() {
        let top = deps(&["left", "right"]);
        let left = deps(&["base"]);
        let right = deps(&["base"]);
        let base = deps(&[]);
        let graph = DependencyGraph::build([
            ("top", top.as_slice()),
            ("left", left.as_slice()),
            ("right", right.as_slice()),
            ("base", base.as_slice()),
        ])
        .unwrap();
        assert_eq!(graph.public_closure(["top"]), vec!["top", "left", "right", "base"]);
    }

    #[test]
    fn test_cycle_is_fatal() {
        let a = deps(&["b"]);
        let b = deps(&["c"]);
        let c = deps(&["a"]);
        let err = DependencyGraph::build([
            ("a", a.as_slice()),
            ("b", b.as_slice()),
            ("c", c.as_slice()),
        ])
        .unwrap_err();
        match err {
            MacvisError::CyclicDependency { cycle } => {
                assert_eq!(cycle.len(), 4);
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let a = deps(&["a"]);
        let err = DependencyGraph::build([("a", a.as_slice())]).unwrap_err();
        assert_eq!(err.to_string(), "Cyclic library dependency: a -> a");
    }

    #[test]
    fn test_unknown_dependency() {
        let a = deps(&["ghost"]);
        let err = DependencyGraph::build([("a", a.as_slice())]).unwrap_err();
        assert!(matches!(err, MacvisError::InvalidArgument { .. }));
    }
}
