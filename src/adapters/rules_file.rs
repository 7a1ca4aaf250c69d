//! JSON-file rule store.
//!
//! ```json
//! [
//!   { "id": "r1", "name": "Door", "input_id": "door", "kind": "edge",
//!     "edge": "rising", "active": true }
//! ]
//! ```
//!
//! The file is read once at load; a changed rule set means pausing the
//! affected controllers, swapping the store and resuming.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::app::ports::{EdgeRule, RuleStore};
use crate::config::EdgeMode;
use crate::error::{Error, Result};

/// Rule kind tag for edge-triggered rules.
pub const EDGE_KIND: &str = "edge";

/// One stored rule definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Input the rule watches.
    pub input_id: String,
    pub kind: String,
    #[serde(default = "default_edge")]
    pub edge: EdgeMode,
    #[serde(default)]
    pub active: bool,
}

fn default_edge() -> EdgeMode {
    EdgeMode::Both
}

#[derive(Debug, Default, Clone)]
pub struct JsonRuleStore {
    rules: Vec<RuleDefinition>,
}

impl JsonRuleStore {
    pub fn new(rules: Vec<RuleDefinition>) -> Self {
        Self { rules }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("reading {}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let rules = serde_json::from_str(text).map_err(|e| Error::config(format!("rules: {e}")))?;
        Ok(Self::new(rules))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleStore for JsonRuleStore {
    fn active_edge_rules(&self, device_id: &str) -> Result<Vec<EdgeRule>> {
        Ok(self
            .rules
            .iter()
            .filter(|r| r.active && r.kind == EDGE_KIND && r.input_id == device_id)
            .map(|r| EdgeRule {
                id: r.id.clone(),
                name: r.name.clone(),
                edge: r.edge,
            })
            .collect())
    }
}
