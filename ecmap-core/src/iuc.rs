//! The intended usage configuration: the seed tuple set Step 3 restricts
//! the root's overall context against.

use crate::tuple::RawTuple;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Iuc {
    pub id: String,
    #[serde(default)]
    pub tuples: Vec<RawTuple>,
}
