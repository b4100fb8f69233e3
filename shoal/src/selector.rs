//! Read-preference node selection

use crate::node::{Node, Role};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which member role may serve a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPreference {
    /// Only the primary
    #[default]
    Primary,
    /// Prefer a secondary, fall back to the primary
    Secondary,
}

impl ReadPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadPreference::Primary => "primary",
            ReadPreference::Secondary => "secondary",
        }
    }
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the node that should serve a read.
///
/// Walks `nodes` in list order and never waits; `None` means nothing
/// currently matches and retrying is up to the caller.
pub fn select_for_read(nodes: &[Arc<Node>], preference: ReadPreference) -> Option<Arc<Node>> {
    match preference {
        ReadPreference::Primary => first_serving(nodes, Role::Primary),
        ReadPreference::Secondary => first_serving(nodes, Role::Secondary)
            .or_else(|| first_serving(nodes, Role::Primary)),
    }
}

fn first_serving(nodes: &[Arc<Node>], role: Role) -> Option<Arc<Node>> {
    nodes.iter().find(|node| node.serves(role)).cloned()
}
