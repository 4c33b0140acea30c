//! End-to-end pipeline orchestration: validation → Step 1 → Step 2 →
//! (per IUC) Step 3 → Step 4 for the EC phase, and the cross-profile
//! mapping phase that runs independently of it.

use crate::error::{CoreError, Envelope, ErrorClass};
use crate::mapping::{build_mra, classify_component};
use crate::step1::run_step1_prefilter_core;
use crate::step2::{run_step2_oc_core, Step2Output};
use crate::step3::{iuc_to_tuples, run_step3_ec_core};
use crate::step4::run_step4_profile_schema;
use crate::validate::{validate_ec_inputs, validate_mapping_config};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub struct EcPipelineOutput {
    pub artifacts: HashMap<String, Value>,
    pub profile_ids: Vec<String>,
}

pub struct MappingPipelineOutput {
    pub artifacts: HashMap<String, Value>,
}

fn step2_envelope(err: CoreError) -> Envelope {
    match err {
        CoreError::Cycle => Envelope::with_stage(ErrorClass::Step2, "OC_non_convergent_cycle", "cycle"),
        other => Envelope::with_stage(ErrorClass::Step2, other.to_string(), other.stage()),
    }
}

fn step3_envelope(err: CoreError) -> Envelope {
    match err {
        CoreError::Cycle => Envelope::with_stage(ErrorClass::Step3, "EC_non_convergent_cycle", "cycle"),
        other => Envelope::with_stage(ErrorClass::Step3, other.to_string(), other.stage()),
    }
}

fn step4_envelope(err: CoreError, profile_id: &str) -> Envelope {
    let mut details = Map::new();
    details.insert("profileId".to_string(), Value::String(profile_id.to_string()));
    Envelope::new(ErrorClass::Step4, err.to_string(), details)
}

/// Runs validation, Step 1, Step 2, then Step 3/Step 4 for every IUC in
/// input order. Aborts on the first envelope with no partial artifacts.
pub fn run_ec_pipeline(ec_bundle: &Value, iucs: &Value) -> Result<EcPipelineOutput, Envelope> {
    let inputs = validate_ec_inputs(ec_bundle, iucs).map_err(|(section, reason)| Envelope::with_section(reason, &section))?;

    tracing::debug!(sections = "taxonomy,policy,componentGraph,assignedBusinessContext,iucs", "ec inputs validated");

    let step1 = run_step1_prefilter_core(&inputs.assignments, &inputs.policy, &inputs.taxonomy);

    let step2 = run_step2_oc_core(&step1.prefiltered, &inputs.component_graph, &inputs.taxonomy).map_err(|err| {
        tracing::warn!(error = "Step2", reason = %err, "OC computation failed");
        step2_envelope(err)
    })?;

    let mut artifacts = HashMap::new();
    artifacts.insert("step1-prefiltered.json".to_string(), step1.to_json());
    artifacts.insert("step2-oc.json".to_string(), step2.to_json());

    let mut profile_ids = Vec::with_capacity(inputs.iucs.len());
    for iuc in &inputs.iucs {
        let iuc_tuples = iuc_to_tuples(iuc, &inputs.taxonomy).map_err(|err| {
            tracing::warn!(error = "Step3", profileId = %iuc.id, reason = %err, "iuc tuples invalid");
            step3_envelope(err)
        })?;
        let step3 = run_step3_ec_core(&step2, &inputs.component_graph, &inputs.taxonomy, iuc, &iuc_tuples).map_err(|err| {
            tracing::warn!(error = "Step3", profileId = %iuc.id, reason = %err, "EC computation failed");
            step3_envelope(err)
        })?;

        let profile_id = iuc.id.clone();
        artifacts.insert(format!("step3-ec.{profile_id}.json"), step3.to_json());

        let step4 = run_step4_profile_schema(&step3, &inputs.component_graph, iuc).map_err(|err| {
            tracing::warn!(error = "Step4", profileId = %profile_id, reason = %err, "profile schema failed");
            step4_envelope(err, &profile_id)
        })?;
        artifacts.insert(format!("step4-profile.{profile_id}.json"), step4.to_json());

        profile_ids.push(profile_id);
    }

    Ok(EcPipelineOutput { artifacts, profile_ids })
}

fn component_ec(ec_payload: &Value, component_id: &str) -> Vec<Value> {
    for kind in ["ABIE", "ASBIE", "BBIE"] {
        if let Some(bucket) = ec_payload.get(kind).and_then(Value::as_object) {
            if let Some(value) = bucket.get(component_id) {
                return value.as_array().cloned().unwrap_or_default();
            }
        }
    }
    Vec::new()
}

/// Runs the mapping phase for every configured profile pair, independent
/// of the EC pipeline — `profiles` is `{profileId: {ec, profileSchema}}`
/// as already produced by (or equivalent to) Step 3's artifact.
pub fn run_mapping_pipeline(profiles: &Value, mapping_config: &Value) -> Result<MappingPipelineOutput, Envelope> {
    let config = validate_mapping_config(mapping_config)
        .map_err(|reason| Envelope::with_stage(ErrorClass::Validation, reason, "mapping-config"))?;

    let profiles_map = profiles.as_object().ok_or_else(|| Envelope::with_stage(ErrorClass::Validation, "profiles must be an object", "profiles"))?;

    let mut sorted_components: Vec<&String> = config.bie_catalog.keys().collect();
    sorted_components.sort();

    let mut artifacts = HashMap::new();

    for pair in &config.profile_pairs {
        let source_id = &pair.source_profile_id;
        let target_id = &pair.target_profile_id;

        let source_profile = profiles_map.get(source_id).ok_or_else(|| {
            Envelope::with_stage(
                ErrorClass::Validation,
                format!("profile not found in mapping inputs: {source_id}->{target_id}"),
                "profiles",
            )
        })?;
        let target_profile = profiles_map.get(target_id).ok_or_else(|| {
            Envelope::with_stage(
                ErrorClass::Validation,
                format!("profile not found in mapping inputs: {source_id}->{target_id}"),
                "profiles",
            )
        })?;

        let source_ec = source_profile.get("ec").cloned().unwrap_or(Value::Null);
        let target_ec = target_profile.get("ec").cloned().unwrap_or(Value::Null);

        let mut mras = Vec::new();
        let mut explanations = Vec::new();

        for component_id in &sorted_components {
            let component_id: &str = component_id.as_str();
            let ec_source_full = component_ec(&source_ec, component_id);
            let ec_target_full = component_ec(&target_ec, component_id);
            if ec_source_full.is_empty() || ec_target_full.is_empty() {
                continue;
            }

            let entry = &config.bie_catalog[component_id];
            let classification = classify_component(&ec_source_full, &ec_target_full, &entry.relevant_axes);
            if classification.decision == crate::mapping::Decision::NoMapping {
                continue;
            }

            let source_path = config.schema_paths.source.get(component_id).map(String::as_str).unwrap_or("");
            let target_path = config.schema_paths.target.get(component_id).map(String::as_str).unwrap_or("");

            let mra = build_mra(
                component_id,
                &entry.anchor,
                &entry.relevant_axes,
                &classification,
                &ec_source_full,
                &ec_target_full,
                source_path,
                target_path,
            );
            explanations.push(mra["explanationJson"].clone());
            mras.push(mra);
        }

        tracing::debug!(sourceProfile = %source_id, targetProfile = %target_id, count = mras.len(), "mapping pair classified");

        artifacts.insert(format!("mapping.mra.{source_id}.{target_id}.json"), Value::Array(mras));
        artifacts.insert(format!("mapping.explanations.{source_id}.{target_id}.json"), Value::Array(explanations));
    }

    Ok(MappingPipelineOutput { artifacts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn taxonomy() -> Value {
        json!({
            "keys": ["Region", "Channel"],
            "placeholders": {"Region": "Region.<Any>", "Channel": "Channel.<Any>"},
            "categories": {
                "Region": ["Region", "Region.EU", "Region.EU.DE", "Region.US"],
                "Channel": ["Channel", "Channel.B2B", "Channel.B2C"]
            },
            "defaults": {}
        })
    }

    fn bundle() -> Value {
        json!({
            "taxonomy": taxonomy(),
            "policy": {
                "policyKeys": ["Region", "Channel"],
                "legalTuples": [{"Region": "Region.<Any>", "Channel": "Channel.<Any>"}]
            },
            "componentGraph": {
                "rootABIE": "ABIE.Invoice",
                "abies": [
                    {"id": "ABIE.Invoice", "childrenBBIE": ["BBIE.InvoiceID"], "childrenASBIE": []},
                ],
                "asbies": [],
                "bbies": [{"id": "BBIE.InvoiceID", "ownerABIE": "ABIE.Invoice"}]
            },
            "assignedBusinessContext": [
                {"componentId": "BBIE.InvoiceID", "tuples": [{"Region": "Region.EU", "Channel": "Channel.B2B"}]}
            ]
        })
    }

    #[test]
    fn ec_pipeline_end_to_end_produces_all_artifacts() {
        let iucs = json!([{"id": "profile-1", "tuples": []}]);
        let out = run_ec_pipeline(&bundle(), &iucs).unwrap();
        assert_eq!(out.profile_ids, vec!["profile-1".to_string()]);
        assert!(out.artifacts.contains_key("step1-prefiltered.json"));
        assert!(out.artifacts.contains_key("step2-oc.json"));
        assert!(out.artifacts.contains_key("step3-ec.profile-1.json"));
        assert!(out.artifacts.contains_key("step4-profile.profile-1.json"));
    }

    #[test]
    fn ec_pipeline_surfaces_validation_envelope_with_section() {
        let mut bad_bundle = bundle();
        bad_bundle.as_object_mut().unwrap().remove("policy");
        let iucs = json!([]);
        let err = run_ec_pipeline(&bad_bundle, &iucs).unwrap_err();
        assert_eq!(err.error, ErrorClass::Validation);
        assert_eq!(err.details.get("section").and_then(Value::as_str), Some("bundle"));
    }

    #[test]
    fn mapping_pipeline_classifies_and_skips_no_mapping() {
        let profiles = json!({
            "S": {"ec": {"ABIE": {}, "ASBIE": {}, "BBIE": {
                "BBIE.InvoiceID": [{"Region": "Region.EU", "Channel": "Channel.B2B"}]
            }}},
            "T": {"ec": {"ABIE": {}, "ASBIE": {}, "BBIE": {
                "BBIE.InvoiceID": [{"Region": "Region.EU", "Channel": "Channel.B2C"}]
            }}}
        });
        let config = json!({
            "profilePairs": [{"sourceProfileId": "S", "targetProfileId": "T"}],
            "bie_catalog": {"BBIE.InvoiceID": {"anchor": "InvoiceID", "relevantAxes": ["Region"]}},
            "schemaPaths": {"source": {"BBIE.InvoiceID": "src.xsd"}, "target": {"BBIE.InvoiceID": "tgt.xsd"}}
        });
        let out = run_mapping_pipeline(&profiles, &config).unwrap();
        let mras = out.artifacts["mapping.mra.S.T.json"].as_array().unwrap();
        assert_eq!(mras.len(), 1);
        assert_eq!(mras[0]["decision"], "SEAMLESS");
        assert_eq!(mras[0]["mappingJson"]["sourcePath"], "src.xsd");
    }

    #[test]
    fn mapping_pipeline_missing_profile_is_envelope() {
        let profiles = json!({"S": {"ec": {}}});
        let config = json!({
            "profilePairs": [{"sourceProfileId": "S", "targetProfileId": "T"}],
            "bie_catalog": {},
            "schemaPaths": {"source": {}, "target": {}}
        });
        let err = run_mapping_pipeline(&profiles, &config).unwrap_err();
        assert_eq!(err.details.get("stage").and_then(Value::as_str), Some("profiles"));
    }
}
