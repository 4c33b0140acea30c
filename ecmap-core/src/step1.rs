//! Step 1 — Prefilter: per-leaf policy narrowing with defaults fill and a
//! per-tuple audit log.

use crate::assignment::Assignment;
use crate::error::{CoreError, Envelope, ErrorClass};
use crate::policy::Policy;
use crate::taxonomy::Taxonomy;
use crate::token;
use crate::tuple::{self, RawTuple, Tuple};
use crate::validate::{validate_policy, validate_taxonomy};
use serde_json::{json, Value};
use std::collections::HashMap;

pub struct PrefilteredEntry {
    pub component_id: String,
    pub tuples: Vec<Tuple>,
}

impl PrefilteredEntry {
    pub fn to_json(&self) -> Value {
        json!({
            "componentId": self.component_id,
            "tuples": self.tuples.iter().map(Tuple::to_json).collect::<Vec<_>>(),
        })
    }
}

pub struct Step1Output {
    pub prefiltered: Vec<PrefilteredEntry>,
    pub log: Vec<Value>,
}

impl Step1Output {
    pub fn to_json(&self) -> Value {
        json!({
            "prefiltered": self.prefiltered.iter().map(PrefilteredEntry::to_json).collect::<Vec<_>>(),
            "log": self.log,
        })
    }
}

fn normalize_tuple(tuple_before: &RawTuple, taxonomy: &Taxonomy) -> Result<(HashMap<String, String>, HashMap<String, String>), String> {
    let mut normalized = HashMap::new();
    let mut fills = HashMap::new();
    for key in &taxonomy.keys {
        if let Some(value) = tuple_before.get(key) {
            match value.as_str() {
                Some(s) => {
                    normalized.insert(key.clone(), s.to_string());
                }
                None => return Err(format!("invalid-token-type:{key}")),
            }
        } else if let Some(default) = taxonomy.defaults.get(key) {
            normalized.insert(key.clone(), default.clone());
            fills.insert(key.clone(), default.clone());
        } else {
            return Err(format!("missing-key-no-default:{key}"));
        }
    }
    Ok((normalized, fills))
}

/// Does `legal` match `normalized` on every policy key? Missing legal keys
/// fall back to the normalized tuple's own token (meet-with-self, always
/// defined), so only keys the legal tuple actually constrains can reject a
/// match.
fn matches_policy_keys(normalized: &HashMap<String, String>, legal: &RawTuple, policy_keys: &[String], taxonomy: &Taxonomy) -> bool {
    policy_keys.iter().all(|key| {
        let left = &normalized[key];
        let right = legal.get(key).and_then(Value::as_str).unwrap_or(left);
        let placeholder = &taxonomy.placeholders[key];
        token::meet_token(left, right, placeholder, taxonomy.delimiter(), taxonomy.case_sensitive()).is_some()
    })
}

/// Full-tuple meet of a normalized (complete) tuple against a legal tuple
/// that may only constrain a subset of taxonomy keys.
fn intersect_with_legal(normalized: &HashMap<String, String>, legal: &RawTuple, taxonomy: &Taxonomy) -> Option<Tuple> {
    Tuple::build(taxonomy, |key| {
        let left = normalized.get(key)?.clone();
        let right = match legal.get(key).and_then(Value::as_str) {
            Some(r) => r.to_string(),
            None => left.clone(),
        };
        let placeholder = taxonomy.placeholders.get(key)?;
        token::meet_token(&left, &right, placeholder, taxonomy.delimiter(), taxonomy.case_sensitive())
    })
}

fn normalized_tuple_json(normalized: &HashMap<String, String>) -> Value {
    let map: serde_json::Map<String, Value> = normalized.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();
    Value::Object(map)
}

/// The pure narrowing core: assumes `assignments` has already been parsed
/// and `policy`/`taxonomy` have already passed validation.
pub fn run_step1_prefilter_core(assignments: &[Assignment], policy: &Policy, taxonomy: &Taxonomy) -> Step1Output {
    let mut prefiltered_by_component: HashMap<String, Vec<Tuple>> = HashMap::new();
    let mut component_order: Vec<String> = Vec::new();
    let mut logs = Vec::new();

    for entry in assignments {
        if !prefiltered_by_component.contains_key(&entry.component_id) {
            prefiltered_by_component.insert(entry.component_id.clone(), Vec::new());
            component_order.push(entry.component_id.clone());
        }

        for (tuple_index, tuple_before) in entry.tuples.iter().enumerate() {
            let tuple_before_json = Value::Object(tuple_before.clone().into_iter().collect());

            let (normalized, fills) = match normalize_tuple(tuple_before, taxonomy) {
                Ok(pair) => pair,
                Err(reason) => {
                    logs.push(json!({
                        "componentId": entry.component_id,
                        "tupleIndex": tuple_index,
                        "action": "dropped",
                        "fills": {},
                        "witnesses": [],
                        "tupleBefore": tuple_before_json,
                        "tuplesAfter": [],
                        "reason": reason,
                    }));
                    continue;
                }
            };

            let mut witnesses = Vec::new();
            let mut narrowed = Vec::new();
            for (witness_index, legal_tuple) in policy.legal_tuples.iter().enumerate() {
                if !matches_policy_keys(&normalized, legal_tuple, &policy.policy_keys, taxonomy) {
                    continue;
                }
                if let Some(narrowed_tuple) = intersect_with_legal(&normalized, legal_tuple, taxonomy) {
                    witnesses.push(witness_index);
                    narrowed.push(narrowed_tuple);
                }
            }
            narrowed = tuple::dedup_exact(narrowed);

            if narrowed.is_empty() {
                logs.push(json!({
                    "componentId": entry.component_id,
                    "tupleIndex": tuple_index,
                    "action": "dropped",
                    "fills": normalized_tuple_json(&fills),
                    "witnesses": [],
                    "tupleBefore": tuple_before_json,
                    "tuplesAfter": [],
                    "reason": "no-legal-match",
                }));
                continue;
            }

            prefiltered_by_component.get_mut(&entry.component_id).unwrap().extend(narrowed.iter().cloned());
            logs.push(json!({
                "componentId": entry.component_id,
                "tupleIndex": tuple_index,
                "action": "kept-multi",
                "fills": normalized_tuple_json(&fills),
                "witnesses": witnesses,
                "tupleBefore": tuple_before_json,
                "tuplesAfter": narrowed.iter().map(Tuple::to_json).collect::<Vec<_>>(),
            }));
        }
    }

    let prefiltered = component_order
        .into_iter()
        .filter_map(|component_id| {
            let deduped = tuple::dedup_exact(prefiltered_by_component.remove(&component_id).unwrap_or_default());
            if deduped.is_empty() {
                None
            } else {
                Some(PrefilteredEntry { component_id, tuples: deduped })
            }
        })
        .collect();

    Step1Output { prefiltered, log: logs }
}

/// Parses a raw assignment list the way Step 1 alone expects it: objects
/// with `componentId` and an optional `tuples` array, with no cross-check
/// against a component graph (that belongs to full bundle validation).
fn parse_raw_assignments(value: &Value) -> Result<Vec<Assignment>, CoreError> {
    let items = value.as_array().ok_or_else(|| CoreError::validation("assignedBusinessContext must be an array"))?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let map = item.as_object().ok_or_else(|| CoreError::validation("assignment entry must be object"))?;
        let component_id = map
            .get("componentId")
            .ok_or_else(|| CoreError::runtime("componentId"))?
            .as_str()
            .ok_or_else(|| CoreError::validation("componentId must be a string"))?
            .to_string();
        let tuples = match map.get("tuples") {
            Some(v) => {
                let arr = v.as_array().ok_or_else(|| CoreError::validation("tuples must be an array"))?;
                let mut ts = Vec::with_capacity(arr.len());
                for t in arr {
                    let obj = t.as_object().ok_or_else(|| CoreError::validation("tuple must be object"))?;
                    let raw: RawTuple = obj.clone().into_iter().collect();
                    ts.push(raw);
                }
                ts
            }
            None => Vec::new(),
        };
        out.push(Assignment { component_id, tuples });
    }
    Ok(out)
}

/// Raw entry point: validates `policy`/`taxonomy` itself so Step 1 can be
/// driven standalone, the way a reimplementation's own test suite would.
pub fn run_step1_prefilter(assignments: &Value, policy: &Value, taxonomy: &Value) -> Result<Step1Output, CoreError> {
    let taxonomy = validate_taxonomy(taxonomy).map_err(CoreError::validation)?;
    let policy = validate_policy(policy, &taxonomy).map_err(CoreError::validation)?;
    let assignments = parse_raw_assignments(assignments)?;
    Ok(run_step1_prefilter_core(&assignments, &policy, &taxonomy))
}

pub fn run_step1_prefilter_safe(assignments: &Value, policy: &Value, taxonomy: &Value) -> Result<Step1Output, Envelope> {
    run_step1_prefilter(assignments, policy, taxonomy)
        .map_err(|err| Envelope::with_stage(ErrorClass::Step1, err.to_string(), err.stage()))
}
