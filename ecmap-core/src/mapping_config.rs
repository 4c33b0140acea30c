//! The mapping-phase configuration: which profile pairs to compare, which
//! components are catalogued with their KCD axes, and where each side's
//! schema paths live.

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct ProfilePair {
    #[serde(rename = "sourceProfileId")]
    pub source_profile_id: String,
    #[serde(rename = "targetProfileId")]
    pub target_profile_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BieCatalogEntry {
    pub anchor: String,
    #[serde(rename = "relevantAxes", default)]
    pub relevant_axes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SchemaPaths {
    #[serde(default)]
    pub source: HashMap<String, String>,
    #[serde(default)]
    pub target: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MappingConfig {
    #[serde(rename = "profilePairs")]
    pub profile_pairs: Vec<ProfilePair>,
    pub bie_catalog: HashMap<String, BieCatalogEntry>,
    #[serde(rename = "schemaPaths")]
    pub schema_paths: SchemaPaths,
}
