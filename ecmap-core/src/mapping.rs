//! Mapping classification: KCD axis projection, the SEAMLESS /
//! CONTEXTUAL_TRANSFORM / NO_MAPPING decision, and MRA shaping.
//!
//! Mapping works purely on the JSON tuple shape `ecmap_core::tuple::Tuple`
//! already emits (`{key: token, ...}`), not on `Tuple` itself — a profile's
//! EC arrives here as plain JSON (per the public `run_mapping_pipeline`
//! contract, which carries no taxonomy), so there is nothing to reconstruct
//! a taxonomy-ordered `Tuple` from.

use serde_json::{json, Map, Value};
use std::collections::HashSet;

/// A tuple's string fields, sorted by key. Used as a canonical, hashable
/// stand-in for exact equality/dedup/intersection, independent of the
/// field order the source JSON happened to use.
type ProjectedTuple = Vec<(String, String)>;

fn project_one(tuple: &Value, axes: &[String]) -> ProjectedTuple {
    let mut entries: Vec<(String, String)> = axes
        .iter()
        .filter_map(|axis| tuple.get(axis).and_then(Value::as_str).map(|v| (axis.clone(), v.to_string())))
        .collect();
    entries.sort();
    entries
}

fn dedup_exact_projected(items: Vec<ProjectedTuple>) -> Vec<ProjectedTuple> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}

fn project_tuples(tuples: &[Value], axes: &[String]) -> Vec<ProjectedTuple> {
    dedup_exact_projected(tuples.iter().map(|t| project_one(t, axes)).collect())
}

/// Membership-test intersection, preserving the left (source) side's order.
fn intersect_projected(left: &[ProjectedTuple], right: &[ProjectedTuple]) -> Vec<ProjectedTuple> {
    let right_set: HashSet<&ProjectedTuple> = right.iter().collect();
    dedup_exact_projected(left.iter().filter(|x| right_set.contains(*x)).cloned().collect())
}

fn projected_to_json(projected: &[ProjectedTuple]) -> Value {
    Value::Array(
        projected
            .iter()
            .map(|entries| {
                let map: Map<String, Value> = entries.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();
                Value::Object(map)
            })
            .collect(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Seamless,
    ContextualTransform,
    NoMapping,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Seamless => "SEAMLESS",
            Decision::ContextualTransform => "CONTEXTUAL_TRANSFORM",
            Decision::NoMapping => "NO_MAPPING",
        }
    }
}

pub struct Classification {
    pub decision: Decision,
    ec_common_on_kcd: Vec<ProjectedTuple>,
}

/// `ec_source_full`/`ec_target_full` are the raw JSON tuple lists already
/// resolved (scanning ABIE → ASBIE → BBIE) for a component; `axes` is
/// `bie_catalog[component].relevantAxes`.
///
/// NO_MAPPING covers either side's full set, or either projection, being
/// empty. The caller must skip emission for it — there is never a
/// NO_MAPPING record in the output.
pub fn classify_component(ec_source_full: &[Value], ec_target_full: &[Value], axes: &[String]) -> Classification {
    if ec_source_full.is_empty() || ec_target_full.is_empty() {
        return Classification { decision: Decision::NoMapping, ec_common_on_kcd: Vec::new() };
    }
    let rel_source = project_tuples(ec_source_full, axes);
    let rel_target = project_tuples(ec_target_full, axes);
    if rel_source.is_empty() || rel_target.is_empty() {
        return Classification { decision: Decision::NoMapping, ec_common_on_kcd: Vec::new() };
    }
    let common = intersect_projected(&rel_source, &rel_target);
    let decision = if common.is_empty() { Decision::ContextualTransform } else { Decision::Seamless };
    Classification { decision, ec_common_on_kcd: common }
}

#[allow(clippy::too_many_arguments)]
pub fn build_mra(
    component_id: &str,
    anchor: &str,
    relevant_axes: &[String],
    classification: &Classification,
    ec_source_full: &[Value],
    ec_target_full: &[Value],
    source_path: &str,
    target_path: &str,
) -> Value {
    let decision = classification.decision;
    let transform = if decision == Decision::Seamless { "identity_or_direct" } else { "contextual_transform" };
    let mapping_json = json!({
        "componentId": component_id,
        "sourcePath": source_path,
        "targetPath": target_path,
        "decision": decision.as_str(),
        "transform": transform,
    });
    let explanation_json = json!({
        "componentId": component_id,
        "tldr": format!("{} based on KCD comparison", decision.as_str()),
        "relevantAxes": relevant_axes,
        "decision": decision.as_str(),
    });
    json!({
        "componentId": component_id,
        "anchor": anchor,
        "relevantAxes": relevant_axes,
        "decision": decision.as_str(),
        "EC_source": ec_source_full,
        "EC_target": ec_target_full,
        "EC_common_on_KCD": projected_to_json(&classification.ec_common_on_kcd),
        "mappingJson": mapping_json,
        "explanationJson": explanation_json,
    })
}
