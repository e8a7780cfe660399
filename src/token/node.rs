use rand::seq::SliceRandom;
use std::sync::Arc;

/// Fixed pool of upstream node identifiers
#[derive(Clone, Debug)]
pub struct NodePool {
    nodes: Arc<[String]>,
}

impl NodePool {
    /// Returns `None` for an empty pool.
    pub fn new(nodes: Vec<String>) -> Option<Self> {
        if nodes.is_empty() {
            return None;
        }

        Some(Self {
            nodes: nodes.into(),
        })
    }

    /// Uniform random pick, independent per call
    pub fn select(&self) -> &str {
        self.nodes
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or_else(|| self.nodes[0].as_str())
    }

    #[cfg(test)]
    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.iter().any(|node| node == node_id)
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }
}
