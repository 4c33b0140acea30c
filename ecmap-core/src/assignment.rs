//! Per-leaf context assignments: the raw input Step 1 narrows.

use crate::tuple::RawTuple;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Assignment {
    #[serde(rename = "componentId")]
    pub component_id: String,
    #[serde(default)]
    pub tuples: Vec<RawTuple>,
}
