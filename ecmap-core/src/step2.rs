//! Step 2 — Overall Context (OC): bottom-up aggregation over the acyclic
//! component graph.

use crate::error::{CoreError, Envelope, ErrorClass};
use crate::graph::{topological_order, ComponentGraph};
use crate::step1::PrefilteredEntry;
use crate::taxonomy::Taxonomy;
use crate::tuple::{self, Tuple};
use crate::validate::{validate_component_graph, validate_taxonomy};
use serde_json::Value;
use std::collections::BTreeMap;

pub struct Step2Output {
    pub oc_abie: BTreeMap<String, Vec<Tuple>>,
    pub oc_asbie: BTreeMap<String, Vec<Tuple>>,
    pub oc_bbie: BTreeMap<String, Vec<Tuple>>,
}

fn buckets_to_json(buckets: &BTreeMap<String, Vec<Tuple>>) -> Value {
    let map: serde_json::Map<String, Value> =
        buckets.iter().map(|(id, tuples)| (id.clone(), Value::Array(tuples.iter().map(Tuple::to_json).collect()))).collect();
    Value::Object(map)
}

impl Step2Output {
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "oc": {
                "ABIE": buckets_to_json(&self.oc_abie),
                "ASBIE": buckets_to_json(&self.oc_asbie),
                "BBIE": buckets_to_json(&self.oc_bbie),
            }
        })
    }
}

/// Pure computation: assumes `prefiltered`/`component_graph`/`taxonomy`
/// have already passed validation and form a consistent whole.
pub fn run_step2_oc_core(prefiltered: &[PrefilteredEntry], graph: &ComponentGraph, taxonomy: &Taxonomy) -> Result<Step2Output, CoreError> {
    let topo = topological_order(graph).ok_or(CoreError::Cycle)?;
    let reverse_topo: Vec<&String> = topo.iter().rev().collect();

    let mut prefiltered_map: BTreeMap<String, Vec<Tuple>> = BTreeMap::new();
    for entry in prefiltered {
        prefiltered_map.entry(entry.component_id.clone()).or_default().extend(entry.tuples.iter().cloned());
    }
    for tuples in prefiltered_map.values_mut() {
        *tuples = tuple::dedup_exact(std::mem::take(tuples));
    }

    let abie_by_id = graph.abie_map();
    let asbie_by_id = graph.asbie_map();

    let mut oc_bbie: BTreeMap<String, Vec<Tuple>> =
        graph.bbies.iter().map(|b| (b.id.clone(), prefiltered_map.get(&b.id).cloned().unwrap_or_default())).collect();
    let mut oc_asbie: BTreeMap<String, Vec<Tuple>> = BTreeMap::new();
    let mut oc_abie: BTreeMap<String, Vec<Tuple>> = BTreeMap::new();

    for abie_id in reverse_topo {
        let abie = abie_by_id.get(abie_id.as_str()).ok_or_else(|| CoreError::runtime(abie_id.clone()))?;

        let mut children_asbie = abie.children_asbie.clone();
        children_asbie.sort();
        for asbie_id in &children_asbie {
            let pref = prefiltered_map.get(asbie_id).cloned().unwrap_or_default();
            let asbie = asbie_by_id.get(asbie_id.as_str()).ok_or_else(|| CoreError::runtime(asbie_id.clone()))?;
            let oc_target = oc_abie.get(&asbie.target_abie).cloned().unwrap_or_default();
            oc_asbie.insert(asbie_id.clone(), tuple::meet_tuple_sets(&pref, &oc_target, taxonomy));
        }

        let mut children_bbie = abie.children_bbie.clone();
        children_bbie.sort();

        let mut child_sets = Vec::new();
        for asbie_id in &children_asbie {
            child_sets.extend(oc_asbie.get(asbie_id).cloned().unwrap_or_default());
        }
        for bbie_id in &children_bbie {
            child_sets.extend(oc_bbie.get(bbie_id).cloned().unwrap_or_default());
        }
        oc_abie.insert(abie_id.clone(), tuple::dedup_exact(child_sets));
    }

    for bbie in &graph.bbies {
        oc_bbie.entry(bbie.id.clone()).or_default();
    }
    for asbie in &graph.asbies {
        oc_asbie.entry(asbie.id.clone()).or_default();
    }

    Ok(Step2Output { oc_abie, oc_asbie, oc_bbie })
}

pub fn run_step2_oc(prefiltered: &[PrefilteredEntry], component_graph: &Value, taxonomy: &Value) -> Result<Step2Output, CoreError> {
    let taxonomy = validate_taxonomy(taxonomy).map_err(CoreError::validation)?;
    let graph = validate_component_graph(component_graph).map_err(CoreError::validation)?;
    run_step2_oc_core(prefiltered, &graph, &taxonomy)
}

pub fn run_step2_oc_safe(prefiltered: &[PrefilteredEntry], component_graph: &Value, taxonomy: &Value) -> Result<Step2Output, Envelope> {
    run_step2_oc(prefiltered, component_graph, taxonomy).map_err(|err| match err {
        CoreError::Cycle => Envelope::with_stage(ErrorClass::Step2, "OC_non_convergent_cycle", "cycle"),
        other => Envelope::with_stage(ErrorClass::Step2, other.to_string(), other.stage()),
    })
}
