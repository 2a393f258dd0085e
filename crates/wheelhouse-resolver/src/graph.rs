//! Per-target closure graph for diagnostics and tree rendering.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use wheelhouse_core::{PackageName, Version};

/// A node of the closure graph: the synthetic top-level root or a selected package.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ClosureNode {
    Root(String),
    Package { name: PackageName, version: Version },
}

impl fmt::Display for ClosureNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(label) => f.write_str(label),
            Self::Package { name, version } => write!(f, "{name}=={version}"),
        }
    }
}

/// Selected packages and the requirement edges between them.
#[derive(Debug, Clone)]
pub struct ClosureGraph {
    graph: DiGraph<ClosureNode, ()>,
    index: HashMap<PackageName, NodeIndex>,
    root: NodeIndex,
}

impl ClosureGraph {
    /// An empty graph whose root node is printed as `label`.
    pub fn new(label: impl Into<String>) -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(ClosureNode::Root(label.into()));
        Self {
            graph,
            index: HashMap::new(),
            root,
        }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Add or retrieve the node of a package.
    pub fn add_package(&mut self, name: &PackageName, version: &Version) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(ClosureNode::Package {
            name: name.clone(),
            version: version.clone(),
        });
        self.index.insert(name.clone(), idx);
        idx
    }

    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        if !self.graph.edges(from).any(|e| e.target() == to) {
            self.graph.add_edge(from, to, ());
        }
    }

    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &ClosureNode {
        &self.graph[idx]
    }

    fn sorted_neighbors(&self, idx: NodeIndex, dir: Direction) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self.graph.neighbors_directed(idx, dir).collect();
        out.sort_by_key(|&n| self.graph[n].to_string());
        out
    }

    /// Packages `idx` depends on, sorted by name.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.sorted_neighbors(idx, Direction::Outgoing)
    }

    /// Packages (or the root) depending on `idx`, sorted by name.
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.sorted_neighbors(idx, Direction::Incoming)
    }

    /// Render the tree below the root. Cycles are cut at the repeated node.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let mut output = format!("{}\n", self.graph[self.root]);
        let mut visited = HashSet::from([self.root]);
        let deps = self.dependencies_of(self.root);
        let count = deps.len();
        for (i, idx) in deps.into_iter().enumerate() {
            self.print_subtree(&mut output, idx, "", i == count - 1, 1, max_depth, &mut visited);
        }
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        output.push_str(&format!("{prefix}{connector}{}\n", self.graph[idx]));

        if max_depth.is_some_and(|max| depth >= max) || !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let deps = self.dependencies_of(idx);
        let count = deps.len();
        for (i, child) in deps.into_iter().enumerate() {
            self.print_subtree(
                output,
                child,
                &child_prefix,
                i == count - 1,
                depth + 1,
                max_depth,
                visited,
            );
        }
        visited.remove(&idx);
    }

    /// Shortest chain of packages from the root to `name`, root included.
    pub fn find_path(&self, name: &str) -> Option<Vec<&ClosureNode>> {
        let target = self.find(&wheelhouse_core::name::normalize(name))?;
        let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = std::collections::VecDeque::from([self.root]);
        let mut seen = HashSet::from([self.root]);
        while let Some(current) = queue.pop_front() {
            if current == target {
                let mut path = vec![current];
                let mut cursor = current;
                while let Some(&parent) = parents.get(&cursor) {
                    path.push(parent);
                    cursor = parent;
                }
                path.reverse();
                return Some(path.into_iter().map(|idx| &self.graph[idx]).collect());
            }
            for next in self.dependencies_of(current) {
                if seen.insert(next) {
                    parents.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Who pulls `name` into the closure, transitively.
    pub fn print_inverted_tree(&self, name: &str) -> String {
        let mut output = String::new();
        let Some(idx) = self.find(&wheelhouse_core::name::normalize(name)) else {
            return output;
        };
        output.push_str(&format!("{}\n", self.graph[idx]));
        let mut visited = HashSet::from([idx]);
        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, dep) in dependents.into_iter().enumerate() {
            self.print_inverted_subtree(&mut output, dep, "", i == count - 1, &mut visited);
        }
        output
    }

    fn print_inverted_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        output.push_str(&format!("{prefix}{connector}{}\n", self.graph[idx]));
        if !visited.insert(idx) {
            return;
        }
        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, dep) in dependents.into_iter().enumerate() {
            self.print_inverted_subtree(output, dep, &child_prefix, i == count - 1, visited);
        }
        visited.remove(&idx);
    }

    /// Number of package nodes.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(g: &mut ClosureGraph, name: &str, version: &str) -> NodeIndex {
        g.add_package(&PackageName::new(name), &Version::parse(version).unwrap())
    }

    #[test]
    fn duplicate_add_returns_same_index() {
        let mut g = ClosureGraph::new("x86_64-linux-py3.10");
        let a = add(&mut g, "six", "1.16.0");
        let b = add(&mut g, "Six", "1.16.0");
        assert_eq!(a, b);
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn tree_printing() {
        let mut g = ClosureGraph::new("x86_64-linux-py3.10");
        let root = g.root();
        let requests = add(&mut g, "requests", "2.31.0");
        let idna = add(&mut g, "idna", "3.4");
        let urllib3 = add(&mut g, "urllib3", "2.0.4");
        g.add_edge(root, requests);
        g.add_edge(requests, urllib3);
        g.add_edge(requests, idna);

        let tree = g.print_tree(None);
        assert_eq!(
            tree,
            "x86_64-linux-py3.10\n└── requests==2.31.0\n    ├── idna==3.4\n    └── urllib3==2.0.4\n"
        );
        let shallow = g.print_tree(Some(1));
        assert!(!shallow.contains("idna"));
    }

    #[test]
    fn cycles_terminate() {
        let mut g = ClosureGraph::new("root");
        let root = g.root();
        let a = add(&mut g, "a", "1.0");
        let b = add(&mut g, "b", "1.0");
        g.add_edge(root, a);
        g.add_edge(a, b);
        g.add_edge(b, a);
        let tree = g.print_tree(None);
        assert_eq!(tree.matches("a==1.0").count(), 2);
    }

    #[test]
    fn path_and_inverted_tree() {
        let mut g = ClosureGraph::new("root");
        let root = g.root();
        let app = add(&mut g, "app", "1.0");
        let lib = add(&mut g, "lib", "2.0");
        g.add_edge(root, app);
        g.add_edge(app, lib);

        let path: Vec<String> =
            g.find_path("LIB").unwrap().iter().map(ToString::to_string).collect();
        assert_eq!(path, vec!["root", "app==1.0", "lib==2.0"]);
        assert!(g.find_path("missing").is_none());

        let inv = g.print_inverted_tree("lib");
        assert!(inv.starts_with("lib==2.0\n"));
        assert!(inv.contains("app==1.0"));
        assert!(inv.contains("root"));
    }
}
