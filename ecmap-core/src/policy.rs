//! The policy data model: the subset of taxonomy keys a policy speaks over,
//! and the legal tuples Step 1 narrows assignments against.

use crate::tuple::RawTuple;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Policy {
    #[serde(rename = "policyKeys")]
    pub policy_keys: Vec<String>,
    #[serde(rename = "legalTuples")]
    pub legal_tuples: Vec<RawTuple>,
}
