//! Step 3 — Effective Context (EC): top-down restriction from the IUC seed,
//! with ancestor-preferred collapse.

use crate::error::{CoreError, Envelope, ErrorClass};
use crate::graph::{topological_order, ComponentGraph};
use crate::iuc::Iuc;
use crate::step2::Step2Output;
use crate::taxonomy::Taxonomy;
use crate::token;
use crate::tuple::{self, Tuple};
use crate::validate::{validate_component_graph, validate_iucs, validate_taxonomy};
use serde_json::Value;
use std::collections::BTreeMap;

pub struct Step3Output {
    pub ec_abie: BTreeMap<String, Vec<Tuple>>,
    pub ec_asbie: BTreeMap<String, Vec<Tuple>>,
    pub ec_bbie: BTreeMap<String, Vec<Tuple>>,
}

fn buckets_to_json(buckets: &BTreeMap<String, Vec<Tuple>>) -> Value {
    let map: serde_json::Map<String, Value> =
        buckets.iter().map(|(id, tuples)| (id.clone(), Value::Array(tuples.iter().map(Tuple::to_json).collect()))).collect();
    Value::Object(map)
}

impl Step3Output {
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "ec": {
                "ABIE": buckets_to_json(&self.ec_abie),
                "ASBIE": buckets_to_json(&self.ec_asbie),
                "BBIE": buckets_to_json(&self.ec_bbie),
            }
        })
    }
}

/// Drops any tuple strictly ancestor-dominated (on every taxonomy key) by
/// another tuple in the same deduped set. Idempotent on its own output.
pub fn collapse_ancestor_preferred(tuples: Vec<Tuple>, taxonomy: &Taxonomy) -> Vec<Tuple> {
    let deduped = tuple::dedup_exact(tuples);
    deduped
        .iter()
        .filter(|candidate| {
            !deduped
                .iter()
                .any(|other| !std::ptr::eq(*candidate, other) && is_strict_ancestor_on_all_keys(other, candidate, taxonomy))
        })
        .cloned()
        .collect()
}

fn is_strict_ancestor_on_all_keys(maybe_ancestor: &Tuple, maybe_descendant: &Tuple, taxonomy: &Taxonomy) -> bool {
    let delimiter = taxonomy.delimiter();
    let case_sensitive = taxonomy.case_sensitive();
    let mut strict = false;
    for key in &taxonomy.keys {
        let (Some(anc), Some(desc)) = (maybe_ancestor.get(key), maybe_descendant.get(key)) else {
            return false;
        };
        if !token::is_ancestor(anc, desc, delimiter, case_sensitive) {
            return false;
        }
        if token::norm(anc, case_sensitive) != token::norm(desc, case_sensitive) {
            strict = true;
        }
    }
    strict
}

/// Pure computation: assumes `oc`/`component_graph`/`taxonomy`/`iuc` have
/// already passed validation and form a consistent whole.
pub fn run_step3_ec_core(oc: &Step2Output, graph: &ComponentGraph, taxonomy: &Taxonomy, iuc: &Iuc, iuc_tuples: &[Tuple]) -> Result<Step3Output, CoreError> {
    let topo = topological_order(graph).ok_or(CoreError::Cycle)?;
    let root = &graph.root_abie;

    let asbie_by_id = graph.asbie_map();
    let abie_by_id = graph.abie_map();

    let mut incoming: BTreeMap<String, Vec<String>> = graph.abies.iter().map(|a| (a.id.clone(), Vec::new())).collect();
    for asbie in &graph.asbies {
        incoming.entry(asbie.target_abie.clone()).or_default().push(asbie.id.clone());
    }
    for ids in incoming.values_mut() {
        ids.sort();
    }

    let _ = &iuc.id;
    let profile_tuples = tuple::dedup_exact(iuc_tuples.to_vec());
    let empty = Vec::new();
    let oc_root = oc.oc_abie.get(root).unwrap_or(&empty);
    let seed = collapse_ancestor_preferred(tuple::meet_tuple_sets(oc_root, &profile_tuples, taxonomy), taxonomy);

    let mut ec_abie: BTreeMap<String, Vec<Tuple>> = graph.abies.iter().map(|a| (a.id.clone(), Vec::new())).collect();
    let mut ec_asbie: BTreeMap<String, Vec<Tuple>> = graph.asbies.iter().map(|a| (a.id.clone(), Vec::new())).collect();
    let mut ec_bbie: BTreeMap<String, Vec<Tuple>> = graph.bbies.iter().map(|b| (b.id.clone(), Vec::new())).collect();

    for abie_id in &topo {
        let gate = if abie_id == root {
            seed.clone()
        } else if !incoming[abie_id].is_empty() {
            let mut union = Vec::new();
            for link_id in &incoming[abie_id] {
                union.extend(ec_asbie.get(link_id).cloned().unwrap_or_default());
            }
            tuple::dedup_exact(union)
        } else {
            oc.oc_abie.get(abie_id).cloned().unwrap_or_default()
        };

        let oc_here = oc.oc_abie.get(abie_id).cloned().unwrap_or_default();
        let ec_here = tuple::meet_tuple_sets(&oc_here, &gate, taxonomy);
        ec_abie.insert(abie_id.clone(), ec_here.clone());

        let abie = abie_by_id.get(abie_id.as_str()).ok_or_else(|| CoreError::runtime(abie_id.clone()))?;
        let mut children_bbie = abie.children_bbie.clone();
        children_bbie.sort();
        for bbie_id in &children_bbie {
            let oc_bbie = oc.oc_bbie.get(bbie_id).cloned().unwrap_or_default();
            ec_bbie.insert(bbie_id.clone(), tuple::meet_tuple_sets(&oc_bbie, &ec_here, taxonomy));
        }

        let mut children_asbie = abie.children_asbie.clone();
        children_asbie.sort();
        for asbie_id in &children_asbie {
            let _ = asbie_by_id.get(asbie_id.as_str()).ok_or_else(|| CoreError::runtime(asbie_id.clone()))?;
            let oc_asbie = oc.oc_asbie.get(asbie_id).cloned().unwrap_or_default();
            ec_asbie.insert(asbie_id.clone(), tuple::meet_tuple_sets(&oc_asbie, &ec_here, taxonomy));
        }
    }

    for tuples in ec_abie.values_mut() {
        *tuples = collapse_ancestor_preferred(std::mem::take(tuples), taxonomy);
    }
    for tuples in ec_asbie.values_mut() {
        *tuples = collapse_ancestor_preferred(std::mem::take(tuples), taxonomy);
    }
    for tuples in ec_bbie.values_mut() {
        *tuples = collapse_ancestor_preferred(std::mem::take(tuples), taxonomy);
    }

    Ok(Step3Output { ec_abie, ec_asbie, ec_bbie })
}

pub(crate) fn iuc_to_tuples(iuc: &Iuc, taxonomy: &Taxonomy) -> Result<Vec<Tuple>, CoreError> {
    iuc.tuples
        .iter()
        .map(|raw| {
            Tuple::build(taxonomy, |key| raw.get(key).and_then(Value::as_str).map(str::to_string))
                .ok_or_else(|| CoreError::validation("iuc tuple is not complete over all taxonomy keys"))
        })
        .collect()
}

pub fn run_step3_ec(oc: &Step2Output, component_graph: &Value, taxonomy: &Value, iuc: &Value) -> Result<Step3Output, CoreError> {
    let taxonomy = validate_taxonomy(taxonomy).map_err(CoreError::validation)?;
    let graph = validate_component_graph(component_graph).map_err(CoreError::validation)?;
    let iucs = validate_iucs(&Value::Array(vec![iuc.clone()]), &taxonomy).map_err(CoreError::validation)?;
    let iuc = iucs.into_iter().next().ok_or_else(|| CoreError::validation("iuc is required"))?;
    let iuc_tuples = iuc_to_tuples(&iuc, &taxonomy)?;
    run_step3_ec_core(oc, &graph, &taxonomy, &iuc, &iuc_tuples)
}

pub fn run_step3_ec_safe(oc: &Step2Output, component_graph: &Value, taxonomy: &Value, iuc: &Value) -> Result<Step3Output, Envelope> {
    run_step3_ec(oc, component_graph, taxonomy, iuc).map_err(|err| match err {
        CoreError::Cycle => Envelope::with_stage(ErrorClass::Step3, "EC_non_convergent_cycle", "cycle"),
        other => Envelope::with_stage(ErrorClass::Step3, other.to_string(), other.stage()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AbieDef, AsbieDef, BbieDef, GraphRules};
    use crate::step1::PrefilteredEntry;
    use crate::step2::run_step2_oc_core;
    use serde_json::json;

    fn taxonomy() -> Taxonomy {
        serde_json::from_value(json!({
            "keys": ["Region", "Channel"],
            "placeholders": {"Region": "Region.<Any>", "Channel": "Channel.<Any>"},
            "categories": {
                "Region": ["Region", "Region.EU", "Region.EU.DE", "Region.US"],
                "Channel": ["Channel", "Channel.B2B", "Channel.B2C"]
            },
            "defaults": {}
        }))
        .unwrap()
    }

    fn tuple(taxonomy: &Taxonomy, region: &str, channel: &str) -> Tuple {
        let region = region.to_string();
        let channel = channel.to_string();
        Tuple::build(taxonomy, |key| match key {
            "Region" => Some(region.clone()),
            "Channel" => Some(channel.clone()),
            _ => None,
        })
        .unwrap()
    }

    fn invoice_graph() -> ComponentGraph {
        ComponentGraph {
            root_abie: "ABIE.Invoice".to_string(),
            abies: vec![
                AbieDef {
                    id: "ABIE.Invoice".to_string(),
                    children_bbie: vec!["BBIE.InvoiceID".to_string()],
                    children_asbie: vec!["ASBIE.Line".to_string()],
                },
                AbieDef { id: "ABIE.Line".to_string(), children_bbie: vec!["BBIE.LineAmount".to_string()], children_asbie: vec![] },
            ],
            asbies: vec![AsbieDef { id: "ASBIE.Line".to_string(), source_abie: "ABIE.Invoice".to_string(), target_abie: "ABIE.Line".to_string() }],
            bbies: vec![
                BbieDef { id: "BBIE.InvoiceID".to_string(), owner_abie: "ABIE.Invoice".to_string() },
                BbieDef { id: "BBIE.LineAmount".to_string(), owner_abie: "ABIE.Line".to_string() },
            ],
            rules: GraphRules::default(),
        }
    }

    #[test]
    fn scenario_d_step3_top_down_restriction() {
        let tx = taxonomy();
        let graph = invoice_graph();
        let prefiltered = vec![
            PrefilteredEntry { component_id: "BBIE.InvoiceID".to_string(), tuples: vec![tuple(&tx, "Region.EU", "Channel.B2B")] },
            PrefilteredEntry { component_id: "BBIE.LineAmount".to_string(), tuples: vec![tuple(&tx, "Region.EU.DE", "Channel.B2B")] },
            PrefilteredEntry { component_id: "ASBIE.Line".to_string(), tuples: vec![tuple(&tx, "Region.EU", "Channel.<Any>")] },
        ];
        let oc = run_step2_oc_core(&prefiltered, &graph, &tx).unwrap();

        let iuc = Iuc { id: "profile-1".to_string(), tuples: Vec::new() };
        let iuc_tuples = vec![tuple(&tx, "Region.EU", "Channel.B2B")];
        let ec = run_step3_ec_core(&oc, &graph, &tx, &iuc, &iuc_tuples).unwrap();

        assert_eq!(ec.ec_abie["ABIE.Invoice"], vec![tuple(&tx, "Region.EU", "Channel.B2B")]);
        assert_eq!(ec.ec_asbie["ASBIE.Line"], vec![tuple(&tx, "Region.EU.DE", "Channel.B2B")]);
        assert_eq!(ec.ec_abie["ABIE.Line"], vec![tuple(&tx, "Region.EU.DE", "Channel.B2B")]);
        assert_eq!(ec.ec_bbie["BBIE.LineAmount"], vec![tuple(&tx, "Region.EU.DE", "Channel.B2B")]);
        assert_eq!(ec.ec_bbie["BBIE.InvoiceID"], vec![tuple(&tx, "Region.EU", "Channel.B2B")]);
    }

    #[test]
    fn ancestor_preferred_collapse_drops_strict_descendants() {
        let tx = taxonomy();
        let broad = tuple(&tx, "Region.EU", "Channel.B2B");
        let narrow = tuple(&tx, "Region.EU.DE", "Channel.B2B");
        let collapsed = collapse_ancestor_preferred(vec![broad.clone(), narrow], &tx);
        assert_eq!(collapsed, vec![broad]);
    }

    #[test]
    fn ancestor_preferred_collapse_is_idempotent() {
        let tx = taxonomy();
        let broad = tuple(&tx, "Region.EU", "Channel.B2B");
        let narrow = tuple(&tx, "Region.EU.DE", "Channel.B2B");
        let once = collapse_ancestor_preferred(vec![broad.clone(), narrow], &tx);
        let twice = collapse_ancestor_preferred(once.clone(), &tx);
        assert_eq!(once, twice);
    }
}
