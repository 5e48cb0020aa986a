//! Typed view of a document snapshot.
//!
//! History stores snapshots as opaque text. Hosts and tests that need to look
//! inside one can parse it into a [`DocumentSnapshot`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A node record. Properties other than `id` and `children` are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectraNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<String>>,
    #[serde(flatten)]
    pub props: BTreeMap<String, Value>,
}

impl VectraNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            children: None,
            props: BTreeMap::new(),
        }
    }

    /// Node type, such as `"frame"` or `"text"`.
    pub fn kind(&self) -> Option<&str> {
        self.props.get("type").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.props.get("name").and_then(Value::as_str)
    }

    pub fn child_ids(&self) -> &[String] {
        self.children.as_deref().unwrap_or_default()
    }
}

/// A whole document: node id to node record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentSnapshot {
    pub nodes: BTreeMap<String, VectraNode>,
}

impl DocumentSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse snapshot text.
    pub fn parse(snapshot: &str) -> serde_json::Result<Self> {
        serde_json::from_str(snapshot)
    }

    /// Serialize back to snapshot text.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn insert(&mut self, node: VectraNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn get(&self, id: &str) -> Option<&VectraNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
