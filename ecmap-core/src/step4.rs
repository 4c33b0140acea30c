//! Step 4 — Profile Schema: selects components with non-empty EC, applies
//! ASBIE target closure and the root realizability rule.

use crate::error::CoreError;
use crate::graph::ComponentGraph;
use crate::iuc::Iuc;
use crate::step3::Step3Output;
use crate::tuple::Tuple;
use serde_json::{json, Value};
use std::collections::BTreeSet;

pub struct ProfileSchema {
    pub profile_id: String,
    pub root_abie: String,
    pub includes_abie: Vec<(String, Vec<Tuple>)>,
    pub includes_asbie: Vec<(String, Vec<Tuple>, String, String)>,
    pub includes_bbie: Vec<(String, String, Vec<Tuple>)>,
    pub is_realizable: bool,
}

impl ProfileSchema {
    pub fn to_json(&self) -> Value {
        json!({
            "version": "ProfileSchema-1.0",
            "profileId": self.profile_id,
            "rootABIE": self.root_abie,
            "includes": {
                "ABIE": self.includes_abie.iter().map(|(id, ec)| json!({
                    "id": id,
                    "ecTuples": ec.iter().map(Tuple::to_json).collect::<Vec<_>>(),
                })).collect::<Vec<_>>(),
                "ASBIE": self.includes_asbie.iter().map(|(id, ec, source, target)| json!({
                    "id": id,
                    "ecTuples": ec.iter().map(Tuple::to_json).collect::<Vec<_>>(),
                    "sourceABIE": source,
                    "targetABIE": target,
                })).collect::<Vec<_>>(),
                "BBIE": self.includes_bbie.iter().map(|(id, owner, ec)| json!({
                    "id": id,
                    "ownerABIE": owner,
                    "ecTuples": ec.iter().map(Tuple::to_json).collect::<Vec<_>>(),
                })).collect::<Vec<_>>(),
            },
            "notes": [
                "seed: ancestor-preferred collapse",
                "emission: collapse per component",
                "exact-dedup inside steps",
            ],
            "trace": {"sourceEC": "Step3"},
            "isRealizable": self.is_realizable,
        })
    }
}

/// Never returns an envelope: any failure here is a programming error, not
/// a data-contract breach, and is left for the orchestrator to wrap.
pub fn run_step4_profile_schema(ec: &Step3Output, graph: &ComponentGraph, iuc: &Iuc) -> Result<ProfileSchema, CoreError> {
    let root_abie = graph.root_abie.clone();

    let mut included_abie: BTreeSet<String> =
        ec.ec_abie.iter().filter(|(_, tuples)| !tuples.is_empty()).map(|(id, _)| id.clone()).collect();
    let included_asbie: BTreeSet<String> =
        ec.ec_asbie.iter().filter(|(_, tuples)| !tuples.is_empty()).map(|(id, _)| id.clone()).collect();
    let included_bbie: BTreeSet<String> =
        ec.ec_bbie.iter().filter(|(_, tuples)| !tuples.is_empty()).map(|(id, _)| id.clone()).collect();

    let asbie_by_id = graph.asbie_map();
    for asbie_id in &included_asbie {
        let asbie = asbie_by_id.get(asbie_id.as_str()).ok_or_else(|| CoreError::runtime(asbie_id.clone()))?;
        if ec.ec_abie.get(&asbie.target_abie).is_some_and(|t| !t.is_empty()) {
            included_abie.insert(asbie.target_abie.clone());
        }
    }

    let root_ec = ec.ec_abie.get(&root_abie).cloned().unwrap_or_default();
    let is_realizable = !root_ec.is_empty();
    if !is_realizable {
        included_abie.remove(&root_abie);
    }

    let abie_by_id = graph.abie_map();
    let bbie_by_id = graph.bbie_map();

    let includes_abie = included_abie
        .into_iter()
        .filter(|id| abie_by_id.contains_key(id.as_str()))
        .map(|id| {
            let ec_tuples = ec.ec_abie.get(&id).cloned().unwrap_or_default();
            (id, ec_tuples)
        })
        .collect();

    let includes_asbie = included_asbie
        .into_iter()
        .filter_map(|id| {
            let asbie = asbie_by_id.get(id.as_str())?;
            let ec_tuples = ec.ec_asbie.get(&id).cloned().unwrap_or_default();
            Some((id, ec_tuples, asbie.source_abie.clone(), asbie.target_abie.clone()))
        })
        .collect();

    let includes_bbie = included_bbie
        .into_iter()
        .filter_map(|id| {
            let bbie = bbie_by_id.get(id.as_str())?;
            let ec_tuples = ec.ec_bbie.get(&id).cloned().unwrap_or_default();
            Some((id, bbie.owner_abie.clone(), ec_tuples))
        })
        .collect();

    Ok(ProfileSchema {
        profile_id: iuc.id.clone(),
        root_abie,
        includes_abie,
        includes_asbie,
        includes_bbie,
        is_realizable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AbieDef, AsbieDef, BbieDef, GraphRules};
    use std::collections::BTreeMap;

    fn graph() -> ComponentGraph {
        ComponentGraph {
            root_abie: "ABIE.Invoice".to_string(),
            abies: vec![
                AbieDef { id: "ABIE.Invoice".to_string(), children_bbie: vec![], children_asbie: vec!["ASBIE.Line".to_string()] },
                AbieDef { id: "ABIE.Line".to_string(), children_bbie: vec!["BBIE.Amount".to_string()], children_asbie: vec![] },
            ],
            asbies: vec![AsbieDef { id: "ASBIE.Line".to_string(), source_abie: "ABIE.Invoice".to_string(), target_abie: "ABIE.Line".to_string() }],
            bbies: vec![BbieDef { id: "BBIE.Amount".to_string(), owner_abie: "ABIE.Line".to_string() }],
            rules: GraphRules::default(),
        }
    }

    fn tx() -> crate::taxonomy::Taxonomy {
        serde_json::from_value(serde_json::json!({
            "keys": ["Region"],
            "placeholders": {"Region": "Region.<Any>"},
            "categories": {"Region": ["Region", "Region.EU"]}
        }))
        .unwrap()
    }

    fn tuple(value: &str) -> Tuple {
        let tx = tx();
        let v = value.to_string();
        Tuple::build(&tx, |_| Some(v.clone())).unwrap()
    }

    #[test]
    fn realizable_when_root_ec_non_empty_and_closes_asbie_target() {
        let g = graph();
        let mut ec_abie = BTreeMap::new();
        ec_abie.insert("ABIE.Invoice".to_string(), vec![tuple("Region.EU")]);
        ec_abie.insert("ABIE.Line".to_string(), vec![tuple("Region.EU")]);
        let mut ec_asbie = BTreeMap::new();
        ec_asbie.insert("ASBIE.Line".to_string(), vec![tuple("Region.EU")]);
        let mut ec_bbie = BTreeMap::new();
        ec_bbie.insert("BBIE.Amount".to_string(), vec![tuple("Region.EU")]);

        let ec = Step3Output { ec_abie, ec_asbie, ec_bbie };
        let iuc = Iuc { id: "p1".to_string(), tuples: Vec::new() };
        let schema = run_step4_profile_schema(&ec, &g, &iuc).unwrap();

        assert!(schema.is_realizable);
        assert_eq!(schema.includes_abie.len(), 2);
        assert_eq!(schema.includes_asbie.len(), 1);
        assert_eq!(schema.includes_bbie.len(), 1);
    }

    #[test]
    fn not_realizable_drops_root_from_includes() {
        let g = graph();
        let ec = Step3Output { ec_abie: BTreeMap::new(), ec_asbie: BTreeMap::new(), ec_bbie: BTreeMap::new() };
        let iuc = Iuc { id: "p1".to_string(), tuples: Vec::new() };
        let schema = run_step4_profile_schema(&ec, &g, &iuc).unwrap();
        assert!(!schema.is_realizable);
        assert!(schema.includes_abie.is_empty());
    }
}
