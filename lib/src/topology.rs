//! Binary tree of processor identifiers stored in an arena.
//!
//! Nodes reference their children by index into `nodes`; grafting rebuilds the arena so
//! that no unreachable node is ever kept around.
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyNode {
    pub id: String,
    pub left: Option<usize>,
    pub right: Option<usize>,
}

impl TopologyNode {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            left: None,
            right: None,
        }
    }

    fn child(&self, side: Side) -> Option<usize> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<TopologyNode>,
    root: usize,
    index: HashMap<String, usize>,
}

impl Topology {
    pub fn new(root_id: &str) -> Self {
        Self {
            nodes: vec![TopologyNode::new(root_id)],
            root: 0,
            index: HashMap::from([(root_id.to_string(), 0)]),
        }
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn node(&self, node_i: usize) -> &TopologyNode {
        &self.nodes[node_i]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Attaches a new leaf `id` under `parent` and returns its index.
    pub fn add_child(&mut self, parent: usize, side: Side, id: &str) -> usize {
        assert!(
            !self.contains(id),
            "Processor {} already exists in the topology",
            id
        );
        assert!(
            self.nodes[parent].child(side).is_none(),
            "Node {} already has a {:?} child",
            self.nodes[parent].id,
            side
        );
        let child_i = self.nodes.len();
        self.nodes.push(TopologyNode::new(id));
        self.index.insert(id.to_string(), child_i);
        match side {
            Side::Left => self.nodes[parent].left = Some(child_i),
            Side::Right => self.nodes[parent].right = Some(child_i),
        }
        child_i
    }

    pub fn has_auxiliary(&self, id: &str) -> bool {
        let node_i = self
            .find(id)
            .unwrap_or_else(|| panic!("Processor {} does not exist in the topology", id));
        let node = &self.nodes[node_i];
        node.left.is_some() || node.right.is_some()
    }

    /// Node indices visited node, left subtree, right subtree.
    pub fn pre_order_from(&self, start: usize) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![start];
        while let Some(node_i) = stack.pop() {
            order.push(node_i);
            let node = &self.nodes[node_i];
            if let Some(right) = node.right {
                stack.push(right);
            }
            if let Some(left) = node.left {
                stack.push(left);
            }
        }
        order
    }

    pub fn pre_order(&self) -> Vec<usize> {
        self.pre_order_from(self.root)
    }

    /// `(node index, depth)` level by level, left to right.
    pub fn level_order(&self) -> Vec<(usize, usize)> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([(self.root, 0)]);
        while let Some((node_i, depth)) = queue.pop_front() {
            order.push((node_i, depth));
            let node = &self.nodes[node_i];
            for child in [node.left, node.right].into_iter().flatten() {
                queue.push_back((child, depth + 1));
            }
        }
        order
    }

    pub fn ids(&self) -> Vec<String> {
        self.pre_order()
            .into_iter()
            .map(|node_i| self.nodes[node_i].id.clone())
            .collect()
    }

    pub fn subtree_ids(&self, id: &str) -> Vec<String> {
        match self.find(id) {
            Some(node_i) => self
                .pre_order_from(node_i)
                .into_iter()
                .map(|node_i| self.nodes[node_i].id.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Replaces the subtree rooted at `at_id` with the whole of `other`.
    /// Returns the ids of the replaced subtree that are no longer part of the tree.
    pub fn graft(&mut self, at_id: &str, other: &Topology) -> Vec<String> {
        let at = self
            .find(at_id)
            .unwrap_or_else(|| panic!("Processor {} does not exist in the topology", at_id));
        let replaced = self.subtree_ids(at_id);

        let mut nodes = Vec::with_capacity(self.nodes.len() + other.nodes.len());
        let root = self.copy_with_graft(self.root, at, other, &mut nodes);
        self.nodes = nodes;
        self.root = root;
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(node_i, node)| (node.id.clone(), node_i))
            .collect();
        assert_eq!(
            self.index.len(),
            self.nodes.len(),
            "Grafting produced duplicate processor ids"
        );

        replaced
            .into_iter()
            .filter(|id| !self.contains(id))
            .collect()
    }

    fn copy_with_graft(
        &self,
        node_i: usize,
        at: usize,
        other: &Topology,
        nodes: &mut Vec<TopologyNode>,
    ) -> usize {
        if node_i == at {
            return Self::copy_subtree(other, other.root, nodes);
        }
        let new_i = nodes.len();
        nodes.push(TopologyNode::new(&self.nodes[node_i].id));
        let left = self.nodes[node_i]
            .left
            .map(|child| self.copy_with_graft(child, at, other, nodes));
        let right = self.nodes[node_i]
            .right
            .map(|child| self.copy_with_graft(child, at, other, nodes));
        nodes[new_i].left = left;
        nodes[new_i].right = right;
        new_i
    }

    fn copy_subtree(source: &Topology, node_i: usize, nodes: &mut Vec<TopologyNode>) -> usize {
        let new_i = nodes.len();
        nodes.push(TopologyNode::new(&source.nodes[node_i].id));
        let left = source.nodes[node_i]
            .left
            .map(|child| Self::copy_subtree(source, child, nodes));
        let right = source.nodes[node_i]
            .right
            .map(|child| Self::copy_subtree(source, child, nodes));
        nodes[new_i].left = left;
        nodes[new_i].right = right;
        new_i
    }

    /// `(<id><left><right>)`, an absent child printed as a single space.
    pub fn format(&self) -> String {
        let mut text = String::new();
        self.format_node(Some(self.root), &mut text);
        text
    }

    fn format_node(&self, node_i: Option<usize>, text: &mut String) {
        match node_i {
            Some(node_i) => {
                let node = &self.nodes[node_i];
                text.push('(');
                text.push_str(&node.id);
                self.format_node(node.left, text);
                self.format_node(node.right, text);
                text.push(')');
            }
            None => text.push(' '),
        }
    }
}
