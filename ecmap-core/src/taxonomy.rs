//! The taxonomy data model: hierarchical keys, their categories,
//! placeholders and defaults, plus the delimiter/case-sensitivity rules the
//! token algebra reads.

use serde::Deserialize;
use std::collections::HashMap;

fn default_delimiter() -> String {
    ".".to_string()
}

fn default_case_sensitive() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyRules {
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_case_sensitive", rename = "caseSensitive")]
    pub case_sensitive: bool,
}

impl Default for TaxonomyRules {
    fn default() -> Self {
        Self { delimiter: default_delimiter(), case_sensitive: default_case_sensitive() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Taxonomy {
    pub keys: Vec<String>,
    pub placeholders: HashMap<String, String>,
    pub categories: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub defaults: HashMap<String, String>,
    #[serde(default)]
    pub rules: TaxonomyRules,
}

impl Taxonomy {
    pub fn delimiter(&self) -> &str {
        &self.rules.delimiter
    }

    pub fn case_sensitive(&self) -> bool {
        self.rules.case_sensitive
    }
}
