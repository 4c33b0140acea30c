//! End-to-end coverage of the EC and mapping pipelines against the six
//! canonical scenarios and the universal invariants they're meant to
//! demonstrate.

use ecmap_core::error::ErrorClass;
use ecmap_core::json::canonicalize;
use ecmap_core::orchestrator::{run_ec_pipeline, run_mapping_pipeline};
use serde_json::{json, Value};

fn taxonomy() -> Value {
    json!({
        "keys": ["Region", "Channel"],
        "placeholders": {"Region": "Region.<Any>", "Channel": "Channel.<Any>"},
        "categories": {
            "Region": ["Region", "Region.EU", "Region.EU.DE", "Region.US"],
            "Channel": ["Channel", "Channel.B2B", "Channel.B2C"]
        },
        "defaults": {"Channel": "Channel.B2B"}
    })
}

fn scenario_cd_bundle() -> Value {
    json!({
        "taxonomy": taxonomy(),
        "policy": {
            "policyKeys": ["Region", "Channel"],
            "legalTuples": [
                {"Region": "Region.<Any>", "Channel": "Channel.<Any>"}
            ]
        },
        "componentGraph": {
            "rootABIE": "ABIE.Invoice",
            "abies": [
                {"id": "ABIE.Invoice", "childrenBBIE": ["BBIE.InvoiceID"], "childrenASBIE": ["ASBIE.Line"]},
                {"id": "ABIE.Line", "childrenBBIE": ["BBIE.LineAmount"], "childrenASBIE": []}
            ],
            "asbies": [
                {"id": "ASBIE.Line", "sourceABIE": "ABIE.Invoice", "targetABIE": "ABIE.Line"}
            ],
            "bbies": [
                {"id": "BBIE.InvoiceID", "ownerABIE": "ABIE.Invoice"},
                {"id": "BBIE.LineAmount", "ownerABIE": "ABIE.Line"}
            ]
        },
        "assignedBusinessContext": [
            {"componentId": "BBIE.InvoiceID", "tuples": [{"Region": "Region.EU", "Channel": "Channel.B2B"}]},
            {"componentId": "BBIE.LineAmount", "tuples": [{"Region": "Region.EU.DE", "Channel": "Channel.B2B"}]},
            {"componentId": "ASBIE.Line", "tuples": [{"Region": "Region.EU", "Channel": "Channel.<Any>"}]}
        ]
    })
}

#[test]
fn scenario_a_through_d_end_to_end() {
    let iucs = json!([
        {"id": "profile-1", "tuples": [{"Region": "Region.EU", "Channel": "Channel.B2B"}]}
    ]);
    let out = run_ec_pipeline(&scenario_cd_bundle(), &iucs).expect("ec pipeline should succeed");

    let step2 = &out.artifacts["step2-oc.json"];
    assert_eq!(
        step2["oc"]["ABIE"]["ABIE.Line"],
        json!([{"Region": "Region.EU.DE", "Channel": "Channel.B2B"}])
    );
    assert_eq!(
        step2["oc"]["ABIE"]["ABIE.Invoice"],
        json!([
            {"Region": "Region.EU.DE", "Channel": "Channel.B2B"},
            {"Region": "Region.EU", "Channel": "Channel.B2B"}
        ])
    );

    let step3 = &out.artifacts["step3-ec.profile-1.json"];
    assert_eq!(step3["ec"]["ABIE"]["ABIE.Invoice"], json!([{"Region": "Region.EU", "Channel": "Channel.B2B"}]));
    assert_eq!(
        step3["ec"]["ABIE"]["ABIE.Line"],
        json!([{"Region": "Region.EU.DE", "Channel": "Channel.B2B"}])
    );
    assert_eq!(
        step3["ec"]["BBIE"]["BBIE.InvoiceID"],
        json!([{"Region": "Region.EU", "Channel": "Channel.B2B"}])
    );

    let step4 = &out.artifacts["step4-profile.profile-1.json"];
    assert_eq!(step4["isRealizable"], json!(true));
}

#[test]
fn scenario_e_mapping_classification_through_pipeline() {
    let profiles = json!({
        "source-profile": {"ec": {"ABIE": {}, "ASBIE": {}, "BBIE": {
            "BBIE.InvoiceID": [{"Region": "Region.EU", "Channel": "Channel.B2B"}]
        }}, "profileSchema": {}},
        "target-profile": {"ec": {"ABIE": {}, "ASBIE": {}, "BBIE": {
            "BBIE.InvoiceID": [{"Region": "Region.EU", "Channel": "Channel.B2C"}]
        }}, "profileSchema": {}}
    });

    let seamless_config = json!({
        "profilePairs": [{"sourceProfileId": "source-profile", "targetProfileId": "target-profile"}],
        "bie_catalog": {"BBIE.InvoiceID": {"anchor": "InvoiceID", "relevantAxes": ["Region"]}},
        "schemaPaths": {"source": {}, "target": {}}
    });
    let out = run_mapping_pipeline(&profiles, &seamless_config).unwrap();
    let mras = out.artifacts["mapping.mra.source-profile.target-profile.json"].as_array().unwrap();
    assert_eq!(mras[0]["decision"], "SEAMLESS");

    let transform_config = json!({
        "profilePairs": [{"sourceProfileId": "source-profile", "targetProfileId": "target-profile"}],
        "bie_catalog": {"BBIE.InvoiceID": {"anchor": "InvoiceID", "relevantAxes": ["Region", "Channel"]}},
        "schemaPaths": {"source": {}, "target": {}}
    });
    let out = run_mapping_pipeline(&profiles, &transform_config).unwrap();
    let mras = out.artifacts["mapping.mra.source-profile.target-profile.json"].as_array().unwrap();
    assert_eq!(mras[0]["decision"], "CONTEXTUAL_TRANSFORM");
}

#[test]
fn scenario_f_cycle_surfaces_as_step2_envelope_through_pipeline() {
    let bundle = json!({
        "taxonomy": taxonomy(),
        "policy": {"policyKeys": ["Region"], "legalTuples": [{"Region": "Region.<Any>"}]},
        "componentGraph": {
            "rootABIE": "A",
            "abies": [
                {"id": "A", "childrenBBIE": [], "childrenASBIE": ["e1"]},
                {"id": "B", "childrenBBIE": [], "childrenASBIE": ["e2"]}
            ],
            "asbies": [
                {"id": "e1", "sourceABIE": "A", "targetABIE": "B"},
                {"id": "e2", "sourceABIE": "B", "targetABIE": "A"}
            ],
            "bbies": []
        },
        "assignedBusinessContext": []
    });
    let envelope = run_ec_pipeline(&bundle, &json!([])).unwrap_err();
    assert_eq!(envelope.error, ErrorClass::Step2);
    assert_eq!(envelope.reason, "OC_non_convergent_cycle");
    assert_eq!(envelope.details.get("stage").and_then(Value::as_str), Some("cycle"));
}

#[test]
fn invariant_determinism_across_repeated_runs() {
    let iucs = json!([{"id": "profile-1", "tuples": []}]);
    let bundle = scenario_cd_bundle();
    let first = run_ec_pipeline(&bundle, &iucs).unwrap();
    let second = run_ec_pipeline(&bundle, &iucs).unwrap();
    for name in first.artifacts.keys() {
        assert_eq!(canonicalize(&first.artifacts[name]), canonicalize(&second.artifacts[name]));
    }
}

#[test]
fn invariant_canonical_json_is_stable_and_sorted() {
    let value = json!({"b": 1, "a": {"z": [3, 1], "y": 2}});
    let once = canonicalize(&value);
    let twice = canonicalize(&serde_json::from_str::<Value>(&once).unwrap());
    assert_eq!(once, twice);
    assert_eq!(once, r#"{"a":{"y":2,"z":[3,1]},"b":1}"#);
}

#[test]
fn invariant_error_funnel_keyset_is_closed() {
    let mut bundle = scenario_cd_bundle();
    bundle.as_object_mut().unwrap().remove("taxonomy");
    let envelope = run_ec_pipeline(&bundle, &json!([])).unwrap_err();
    let value = serde_json::to_value(&envelope).unwrap();
    let keys: std::collections::BTreeSet<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, ["details", "error", "reason"].into_iter().collect());
    assert!(!envelope.reason.is_empty());
}

#[test]
fn invariant_mapping_missing_profile_reports_profiles_stage() {
    let profiles = json!({"only-source": {"ec": {}}});
    let config = json!({
        "profilePairs": [{"sourceProfileId": "only-source", "targetProfileId": "missing-target"}],
        "bie_catalog": {},
        "schemaPaths": {"source": {}, "target": {}}
    });
    let envelope = run_mapping_pipeline(&profiles, &config).unwrap_err();
    assert_eq!(envelope.error, ErrorClass::Validation);
    assert_eq!(envelope.details.get("stage").and_then(Value::as_str), Some("profiles"));
}
