//! Arena-backed page dependency graph.
//!
//! Nodes live in an indexed arena and edges are id-lists, so cloning a graph
//! for an isolated simulation run is a flat copy with no cyclic ownership.
//! Node ids are assigned in creation order and preserved across clones, which
//! makes them usable as keys for timing maps and as deterministic tie-breaks.

use std::collections::{BinaryHeap, HashMap};

use lantern_core::network::NetworkRequestRecord;
use lantern_core::{Error, Result};

use crate::trace_processor::CpuTask;

/// Identity of a node within its graph (and all clones of that graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// The payload of a graph vertex.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Index into the graph's record table.
    Network(usize),
    Cpu(CpuTask),
}

/// A vertex of the dependency graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    dependencies: Vec<NodeId>,
    dependents: Vec<NodeId>,
}

impl Node {
    /// Incoming edges: nodes this one waits for.
    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    /// Outgoing edges: nodes waiting for this one.
    pub fn dependents(&self) -> &[NodeId] {
        &self.dependents
    }

    pub fn is_network(&self) -> bool {
        matches!(self.kind, NodeKind::Network(_))
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self.kind, NodeKind::Cpu(_))
    }
}

/// Rooted DAG of network requests and CPU tasks.
#[derive(Debug, Clone)]
pub struct PageGraph {
    nodes: Vec<Node>,
    /// id -> arena position (positions shift under filtering clones).
    index: HashMap<usize, usize>,
    records: Vec<NetworkRequestRecord>,
    root: NodeId,
}

impl PageGraph {
    pub fn new(records: Vec<NetworkRequestRecord>) -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            records,
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.index.get(&id.0).map(|&pos| &self.nodes[pos])
    }

    /// The network record behind a node, if it is a network node.
    pub fn record(&self, id: NodeId) -> Option<&NetworkRequestRecord> {
        match self.node(id)?.kind {
            NodeKind::Network(record_index) => self.records.get(record_index),
            NodeKind::Cpu(_) => None,
        }
    }

    /// The CPU task behind a node, if it is a CPU node.
    pub fn cpu_task(&self, id: NodeId) -> Option<&CpuTask> {
        match &self.node(id)?.kind {
            NodeKind::Cpu(task) => Some(task),
            NodeKind::Network(_) => None,
        }
    }

    pub fn add_network_node(&mut self, record_index: usize) -> NodeId {
        self.push_node(NodeKind::Network(record_index))
    }

    pub fn add_cpu_node(&mut self, task: CpuTask) -> NodeId {
        self.push_node(NodeKind::Cpu(task))
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.index.insert(id.0, self.nodes.len());
        self.nodes.push(Node {
            id,
            kind,
            dependencies: Vec::new(),
            dependents: Vec::new(),
        });
        id
    }

    /// Record that `dependent` waits for `dependency`. Self-edges and
    /// duplicates are ignored.
    pub fn add_dependency(&mut self, dependent: NodeId, dependency: NodeId) {
        if dependent == dependency {
            return;
        }
        let Some(&dependent_pos) = self.index.get(&dependent.0) else {
            return;
        };
        let Some(&dependency_pos) = self.index.get(&dependency.0) else {
            return;
        };
        if self.nodes[dependent_pos].dependencies.contains(&dependency) {
            return;
        }
        self.nodes[dependent_pos].dependencies.push(dependency);
        self.nodes[dependency_pos].dependents.push(dependent);
    }

    /// Whether `node` transitively depends on `ancestor`.
    pub fn depends_on(&self, node: NodeId, ancestor: NodeId) -> bool {
        let Some(&start_pos) = self.index.get(&node.0) else {
            return false;
        };
        let mut stack: Vec<NodeId> = self.nodes[start_pos].dependencies.clone();
        let mut seen = vec![false; self.nodes.len()];
        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            let Some(&pos) = self.index.get(&current.0) else {
                continue;
            };
            if seen[pos] {
                continue;
            }
            seen[pos] = true;
            stack.extend(self.nodes[pos].dependencies.iter().copied());
        }
        false
    }

    /// Node ids reachable from the root via dependent edges, unordered.
    fn reachable(&self) -> Vec<usize> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = Vec::new();
        if let Some(&root_pos) = self.index.get(&self.root.0) {
            seen[root_pos] = true;
            stack.push(root_pos);
        }
        let mut out = Vec::new();
        while let Some(pos) = stack.pop() {
            out.push(pos);
            for &dependent in &self.nodes[pos].dependents {
                let dependent_pos = self.index[&dependent.0];
                if !seen[dependent_pos] {
                    seen[dependent_pos] = true;
                    stack.push(dependent_pos);
                }
            }
        }
        out
    }

    /// Deterministic topological traversal: a node is visited only after all
    /// of its dependencies, ties broken by ascending node id. Returns the
    /// number of nodes visited.
    pub fn traverse(&self, mut visit: impl FnMut(&Node)) -> usize {
        let reachable = self.reachable();
        let mut in_reach = vec![false; self.nodes.len()];
        for &pos in &reachable {
            in_reach[pos] = true;
        }

        let mut remaining: HashMap<usize, usize> = HashMap::new();
        for &pos in &reachable {
            let deps = self.nodes[pos]
                .dependencies
                .iter()
                .filter(|d| in_reach[self.index[&d.0]])
                .count();
            remaining.insert(pos, deps);
        }

        let mut ready: BinaryHeap<std::cmp::Reverse<NodeId>> = BinaryHeap::new();
        for &pos in &reachable {
            if remaining[&pos] == 0 {
                ready.push(std::cmp::Reverse(self.nodes[pos].id));
            }
        }

        let mut visited = 0;
        while let Some(std::cmp::Reverse(id)) = ready.pop() {
            let pos = self.index[&id.0];
            visit(&self.nodes[pos]);
            visited += 1;
            for &dependent in &self.nodes[pos].dependents {
                let dependent_pos = self.index[&dependent.0];
                if !in_reach[dependent_pos] {
                    continue;
                }
                let count = remaining.get_mut(&dependent_pos).expect("reachable node");
                *count -= 1;
                if *count == 0 {
                    ready.push(std::cmp::Reverse(dependent));
                }
            }
        }
        visited
    }

    /// Whether every reachable node can be topologically ordered.
    pub fn is_acyclic(&self) -> bool {
        let reachable = self.reachable().len();
        self.traverse(|_| {}) == reachable
    }

    /// Validate the structural invariants: acyclic, root has no
    /// dependencies, and every node is reachable from the root.
    pub fn validate(&self) -> Result<()> {
        let root = self
            .node(self.root)
            .ok_or_else(|| Error::GraphConstruction("graph has no root node".to_string()))?;
        if !root.dependencies().is_empty() {
            return Err(Error::GraphConstruction(
                "root node has dependencies".to_string(),
            ));
        }
        if self.reachable().len() != self.nodes.len() {
            return Err(Error::GraphConstruction(
                "graph contains nodes unreachable from the root".to_string(),
            ));
        }
        if !self.is_acyclic() {
            return Err(Error::GraphConstruction("graph contains a cycle".to_string()));
        }
        Ok(())
    }

    /// Deep-clone the subgraph of nodes passing `filter` (the root always
    /// survives). Edges are re-derived transitively: when an interior node is
    /// filtered out, its surviving descendants are attached to its nearest
    /// surviving ancestors. Node ids are preserved.
    pub fn clone_with_relationships(&self, filter: impl Fn(&Node) -> bool) -> PageGraph {
        let mut kept = vec![false; self.nodes.len()];
        let mut order: Vec<NodeId> = Vec::new();
        self.traverse(|node| order.push(node.id));
        for &id in &order {
            let pos = self.index[&id.0];
            kept[pos] = id == self.root || filter(&self.nodes[pos]);
        }

        // rep[pos]: the nearest kept ancestors standing in for this node.
        let mut rep: Vec<Vec<NodeId>> = vec![Vec::new(); self.nodes.len()];
        for &id in &order {
            let pos = self.index[&id.0];
            if kept[pos] {
                rep[pos] = vec![id];
                continue;
            }
            let mut stand_ins: Vec<NodeId> = Vec::new();
            for &dep in &self.nodes[pos].dependencies {
                for &r in &rep[self.index[&dep.0]] {
                    if !stand_ins.contains(&r) {
                        stand_ins.push(r);
                    }
                }
            }
            rep[pos] = stand_ins;
        }

        let mut clone = PageGraph::new(self.records.clone());
        clone.root = self.root;
        for &id in &order {
            let pos = self.index[&id.0];
            if !kept[pos] {
                continue;
            }
            let node = &self.nodes[pos];
            clone.index.insert(id.0, clone.nodes.len());
            clone.nodes.push(Node {
                id,
                kind: node.kind.clone(),
                dependencies: Vec::new(),
                dependents: Vec::new(),
            });
        }
        for &id in &order {
            let pos = self.index[&id.0];
            if !kept[pos] {
                continue;
            }
            let deps: Vec<NodeId> = self.nodes[pos]
                .dependencies
                .iter()
                .flat_map(|dep| rep[self.index[&dep.0]].iter().copied())
                .collect();
            for dep in deps {
                clone.add_dependency(id, dep);
            }
        }
        clone
    }
}
