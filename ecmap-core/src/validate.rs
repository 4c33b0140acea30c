//! Structural and semantic validation of every input section, in the order
//! the top-level pipelines consume them. Each `validate_*` function doubles
//! as the parse step: on success it hands back the typed value the rest of
//! the crate works with, so nothing downstream ever touches raw JSON again.

use crate::assignment::Assignment;
use crate::error::{ensure, VResult};
use crate::graph::{AbieDef, AsbieDef, BbieDef, ComponentGraph, GraphRules};
use crate::iuc::Iuc;
use crate::mapping_config::{BieCatalogEntry, MappingConfig, ProfilePair, SchemaPaths};
use crate::policy::Policy;
use crate::taxonomy::{Taxonomy, TaxonomyRules};
use crate::token::{is_ancestor, norm};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

fn obj<'a>(value: &'a Value, message: &str) -> VResult<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| message.to_string())
}

fn arr<'a>(value: &'a Value, message: &str) -> VResult<&'a Vec<Value>> {
    value.as_array().ok_or_else(|| message.to_string())
}

fn string<'a>(value: &'a Value, message: &str) -> VResult<&'a str> {
    value.as_str().ok_or_else(|| message.to_string())
}

fn non_empty_string<'a>(value: &'a Value, message: &str) -> VResult<&'a str> {
    let s = string(value, message)?;
    ensure(!s.is_empty(), message)?;
    Ok(s)
}

fn str_list(value: &Value, message: &str) -> VResult<Vec<String>> {
    let items = arr(value, message)?;
    items
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(|| message.to_string()))
        .collect()
}

fn field<'a>(map: &'a Map<String, Value>, key: &str, message: &str) -> VResult<&'a Value> {
    map.get(key).ok_or_else(|| message.to_string())
}

fn unique(items: &[String]) -> bool {
    let set: HashSet<&String> = items.iter().collect();
    set.len() == items.len()
}

// ---------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------

pub fn validate_taxonomy(value: &Value) -> VResult<Taxonomy> {
    let map = obj(value, "taxonomy must be an object")?;
    let keys = str_list(field(map, "keys", "taxonomy.keys is required")?, "taxonomy.keys must be an array of strings")?;
    ensure(!keys.is_empty(), "taxonomy.keys must be non-empty")?;
    ensure(unique(&keys), "taxonomy.keys must be unique")?;

    let placeholders_value = field(map, "placeholders", "taxonomy.placeholders is required")?;
    let placeholders_map = obj(placeholders_value, "taxonomy.placeholders must be an object")?;
    let categories_value = field(map, "categories", "taxonomy.categories is required")?;
    let categories_map = obj(categories_value, "taxonomy.categories must be an object")?;

    let empty_defaults = Map::new();
    let defaults_map: &Map<String, Value> = match map.get("defaults") {
        Some(v) => obj(v, "taxonomy.defaults must be an object if present")?,
        None => &empty_defaults,
    };

    let rules = match map.get("rules") {
        Some(v) => {
            let rules_map = obj(v, "taxonomy.rules must be an object")?;
            let delimiter = match rules_map.get("delimiter") {
                Some(d) => non_empty_string(d, "taxonomy.rules.delimiter must be non-empty string")?.to_string(),
                None => ".".to_string(),
            };
            let case_sensitive = match rules_map.get("caseSensitive") {
                Some(c) => c.as_bool().ok_or("taxonomy.rules.caseSensitive must be boolean")?,
                None => true,
            };
            TaxonomyRules { delimiter, case_sensitive }
        }
        None => TaxonomyRules::default(),
    };

    let key_set: HashSet<&String> = keys.iter().collect();
    let placeholder_keys: HashSet<&String> = placeholders_map.keys().collect();
    ensure(
        placeholder_keys == key_set,
        "taxonomy.placeholders must define one placeholder per taxonomy key",
    )?;
    let category_keys: HashSet<&String> = categories_map.keys().collect();
    ensure(category_keys == key_set, "taxonomy.categories must define category list per taxonomy key")?;
    let default_keys: HashSet<&String> = defaults_map.keys().collect();
    ensure(default_keys.is_subset(&key_set), "taxonomy.defaults keys must be subset of taxonomy.keys")?;

    let mut placeholders = HashMap::new();
    let mut categories: HashMap<String, Vec<String>> = HashMap::new();

    for key in &keys {
        let ph = non_empty_string(
            &placeholders_map[key],
            &format!("taxonomy.placeholders['{key}'] must be non-empty string"),
        )?
        .to_string();
        let cats = str_list(&categories_map[key], &format!("taxonomy.categories['{key}'] must be an array of strings"))?;

        let norm_cats: HashSet<String> =
            cats.iter().map(|c| norm(c, rules.case_sensitive).into_owned()).collect();
        ensure(norm_cats.len() == cats.len(), &format!("taxonomy.categories['{key}'] contains duplicates"))?;
        ensure(
            !norm_cats.contains(norm(&ph, rules.case_sensitive).as_ref()),
            "Placeholders must not appear in taxonomy.categories",
        )?;

        for token in &cats {
            let parts: Vec<&str> = token.split(rules.delimiter.as_str()).collect();
            for idx in 1..parts.len() {
                let ancestor = parts[..idx].join(&rules.delimiter);
                ensure(
                    norm_cats.contains(norm(&ancestor, rules.case_sensitive).as_ref()),
                    &format!("taxonomy.categories for key '{key}' must be ancestor-closed"),
                )?;
            }
        }

        placeholders.insert(key.clone(), ph);
        categories.insert(key.clone(), cats);
    }

    let mut defaults = HashMap::new();
    for (key, default_value) in defaults_map {
        let default_token = string(default_value, "taxonomy.defaults values must be strings")?.to_string();
        let norm_cats: HashSet<String> =
            categories[key].iter().map(|c| norm(c, rules.case_sensitive).into_owned()).collect();
        ensure(
            norm_cats.contains(norm(&default_token, rules.case_sensitive).as_ref()),
            "taxonomy.defaults values must be concrete categories and not placeholders",
        )?;
        ensure(
            norm(&default_token, rules.case_sensitive) != norm(&placeholders[key], rules.case_sensitive),
            "Placeholders must not appear in taxonomy.defaults",
        )?;
        defaults.insert(key.clone(), default_token);
    }

    Ok(Taxonomy { keys, placeholders, categories, defaults, rules })
}

fn token_sets_for_key(taxonomy: &Taxonomy, key: &str) -> (HashSet<String>, String) {
    let case_sensitive = taxonomy.case_sensitive();
    let categories = HashSet::from_iter(taxonomy.categories[key].iter().map(|c| norm(c, case_sensitive).into_owned()));
    let placeholder = norm(&taxonomy.placeholders[key], case_sensitive).into_owned();
    (categories, placeholder)
}

/// Validates a raw tuple's keys (subset of taxonomy keys) and tokens
/// (category or placeholder), returning the fully-stringified tuple.
fn validate_tuple_tokens(tuple_obj: &Value, taxonomy: &Taxonomy, context: &str) -> VResult<HashMap<String, String>> {
    let map = obj(tuple_obj, &format!("{context}: tuple must be object"))?;
    let allowed_keys: HashSet<&String> = taxonomy.keys.iter().collect();
    let given_keys: HashSet<&String> = map.keys().collect();
    ensure(
        given_keys.is_subset(&allowed_keys),
        &format!("{context}: tuple keys must be subset of taxonomy.keys"),
    )?;

    let mut out = HashMap::new();
    for (key, token_value) in map {
        let token = string(token_value, &format!("{context}: tuple token for key '{key}' must be string"))?;
        let (category_set, placeholder) = token_sets_for_key(taxonomy, key);
        let normalized = norm(token, taxonomy.case_sensitive()).into_owned();
        ensure(
            category_set.contains(&normalized) || normalized == placeholder,
            &format!("{context}: token '{token}' is not a valid CATEGORY or PLACEHOLDER for key '{key}'"),
        )?;
        out.insert(key.clone(), token.to_string());
    }
    Ok(out)
}

// ---------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------

pub fn validate_policy(value: &Value, taxonomy: &Taxonomy) -> VResult<Policy> {
    let map = obj(value, "policy must be an object")?;
    let policy_keys = str_list(
        field(map, "policyKeys", "policy must define policyKeys and legalTuples")?,
        "policy.policyKeys must be an array of strings",
    )?;
    let legal_tuples_value = field(map, "legalTuples", "policy must define policyKeys and legalTuples")?;
    let legal_tuples_raw = arr(legal_tuples_value, "policy.legalTuples must be an array")?;

    let taxonomy_keys: HashSet<&String> = taxonomy.keys.iter().collect();
    ensure(unique(&policy_keys), "policy.policyKeys must be unique")?;
    ensure(
        policy_keys.iter().collect::<HashSet<_>>().is_subset(&taxonomy_keys),
        "policyKeys must be subset of taxonomy.keys",
    )?;

    let required: HashSet<&String> = policy_keys.iter().collect();
    let mut legal_tuples = Vec::with_capacity(legal_tuples_raw.len());
    for (idx, tup) in legal_tuples_raw.iter().enumerate() {
        let validated = validate_tuple_tokens(tup, taxonomy, &format!("policy.legalTuples[{idx}]"))?;
        let given: HashSet<&String> = validated.keys().collect();
        ensure(required.is_subset(&given), "policy.legalTuples entries must include all policyKeys")?;
        let raw_tuple: HashMap<String, Value> = validated.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
        legal_tuples.push(raw_tuple);
    }

    Ok(Policy { policy_keys, legal_tuples })
}

// ---------------------------------------------------------------------
// Component graph
// ---------------------------------------------------------------------

pub fn validate_component_graph(value: &Value) -> VResult<ComponentGraph> {
    let map = obj(value, "componentGraph must be an object")?;
    for required_field in ["rootABIE", "abies", "asbies", "bbies"] {
        ensure(map.contains_key(required_field), &format!("componentGraph.{required_field} is required"))?;
    }

    let root_abie = non_empty_string(&map["rootABIE"], "componentGraph.rootABIE must be non-empty string")?.to_string();
    let abies_raw = arr(&map["abies"], "componentGraph lists must be arrays")?;
    let asbies_raw = arr(&map["asbies"], "componentGraph lists must be arrays")?;
    let bbies_raw = arr(&map["bbies"], "componentGraph lists must be arrays")?;

    let rules = match map.get("rules") {
        Some(v) => {
            let rules_map = obj(v, "componentGraph.rules must be object")?;
            let rounds = match rules_map.get("maxFixpointRounds") {
                Some(r) => {
                    let n = r.as_u64().ok_or("componentGraph.rules.maxFixpointRounds must be positive integer")?;
                    ensure(n > 0, "componentGraph.rules.maxFixpointRounds must be positive integer")?;
                    n
                }
                None => 8,
            };
            GraphRules { max_fixpoint_rounds: rounds }
        }
        None => GraphRules::default(),
    };

    let mut abies = Vec::with_capacity(abies_raw.len());
    let mut abie_ids = Vec::with_capacity(abies_raw.len());
    for (idx, abie_value) in abies_raw.iter().enumerate() {
        let abie_map = obj(abie_value, &format!("componentGraph.abies[{idx}] must be object"))?;
        let id = non_empty_string(
            abie_map.get("id").ok_or("missing id")?,
            &format!("componentGraph.abies[{idx}].id is required"),
        )?
        .to_string();
        let children_bbie = match abie_map.get("childrenBBIE") {
            Some(v) => str_list(v, &format!("componentGraph.abies[{idx}].childrenBBIE must be array of strings"))?,
            None => Vec::new(),
        };
        let children_asbie = match abie_map.get("childrenASBIE") {
            Some(v) => str_list(v, &format!("componentGraph.abies[{idx}].childrenASBIE must be array of strings"))?,
            None => Vec::new(),
        };
        abie_ids.push(id.clone());
        abies.push(AbieDef { id, children_bbie, children_asbie });
    }

    let mut asbies = Vec::with_capacity(asbies_raw.len());
    let mut asbie_ids = Vec::with_capacity(asbies_raw.len());
    for (idx, asbie_value) in asbies_raw.iter().enumerate() {
        let asbie_map = obj(asbie_value, &format!("componentGraph.asbies[{idx}] must be object"))?;
        let id = non_empty_string(
            asbie_map.get("id").ok_or("missing id")?,
            &format!("componentGraph.asbies[{idx}].id is required"),
        )?
        .to_string();
        let source_abie = string(
            asbie_map.get("sourceABIE").ok_or("missing sourceABIE")?,
            &format!("componentGraph.asbies[{idx}].sourceABIE is required"),
        )?
        .to_string();
        let target_abie = string(
            asbie_map.get("targetABIE").ok_or("missing targetABIE")?,
            &format!("componentGraph.asbies[{idx}].targetABIE is required"),
        )?
        .to_string();
        asbie_ids.push(id.clone());
        asbies.push(AsbieDef { id, source_abie, target_abie });
    }

    let mut bbies = Vec::with_capacity(bbies_raw.len());
    let mut bbie_ids = Vec::with_capacity(bbies_raw.len());
    for (idx, bbie_value) in bbies_raw.iter().enumerate() {
        let bbie_map = obj(bbie_value, &format!("componentGraph.bbies[{idx}] must be object"))?;
        let id = non_empty_string(
            bbie_map.get("id").ok_or("missing id")?,
            &format!("componentGraph.bbies[{idx}].id is required"),
        )?
        .to_string();
        let owner_abie = string(
            bbie_map.get("ownerABIE").ok_or("missing ownerABIE")?,
            &format!("componentGraph.bbies[{idx}].ownerABIE is required"),
        )?
        .to_string();
        bbie_ids.push(id.clone());
        bbies.push(BbieDef { id, owner_abie });
    }

    let mut all_ids = Vec::new();
    all_ids.extend(abie_ids.iter().cloned());
    all_ids.extend(asbie_ids.iter().cloned());
    all_ids.extend(bbie_ids.iter().cloned());
    ensure(unique(&all_ids), "component graph IDs are globally unique")?;

    let abie_set: HashSet<&String> = abie_ids.iter().collect();
    let asbie_set: HashSet<&String> = asbie_ids.iter().collect();
    let bbie_set: HashSet<&String> = bbie_ids.iter().collect();
    ensure(abie_set.contains(&root_abie), "componentGraph.rootABIE must reference an ABIE id")?;

    for (idx, asbie) in asbies.iter().enumerate() {
        ensure(
            abie_set.contains(&asbie.source_abie),
            &format!("componentGraph.asbies[{idx}].sourceABIE must resolve to ABIE id"),
        )?;
        ensure(
            abie_set.contains(&asbie.target_abie),
            &format!("componentGraph.asbies[{idx}].targetABIE must resolve to ABIE id"),
        )?;
    }
    for (idx, bbie) in bbies.iter().enumerate() {
        ensure(
            abie_set.contains(&bbie.owner_abie),
            &format!("componentGraph.bbies[{idx}].ownerABIE must resolve to ABIE id"),
        )?;
    }
    for (idx, abie) in abies.iter().enumerate() {
        for child in &abie.children_asbie {
            ensure(
                asbie_set.contains(child),
                &format!("componentGraph.abies[{idx}].childrenASBIE must resolve to ASBIE ids"),
            )?;
        }
        for child in &abie.children_bbie {
            ensure(
                bbie_set.contains(child),
                &format!("componentGraph.abies[{idx}].childrenBBIE must resolve to BBIE ids"),
            )?;
        }
    }

    Ok(ComponentGraph { root_abie, abies, asbies, bbies, rules })
}

// ---------------------------------------------------------------------
// Assignments
// ---------------------------------------------------------------------

pub fn validate_assignments(value: &Value, taxonomy: &Taxonomy, graph: &ComponentGraph) -> VResult<Vec<Assignment>> {
    let items = arr(value, "assignedBusinessContext must be an array")?;

    let allowed: HashSet<&str> =
        graph.asbies.iter().map(|a| a.id.as_str()).chain(graph.bbies.iter().map(|b| b.id.as_str())).collect();

    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let map = obj(item, &format!("assignedBusinessContext[{idx}] must be object"))?;
        let component_id = non_empty_string(
            map.get("componentId").ok_or("missing componentId")?,
            &format!("assignedBusinessContext[{idx}].componentId is required"),
        )?
        .to_string();
        ensure(
            allowed.contains(component_id.as_str()),
            &format!("assignedBusinessContext[{idx}].componentId must resolve to BBIE/ASBIE id"),
        )?;
        let tuples_value = field(map, "tuples", &format!("assignedBusinessContext[{idx}].tuples must be an array"))?;
        let tuples_raw = arr(tuples_value, &format!("assignedBusinessContext[{idx}].tuples must be an array"))?;

        let mut tuples = Vec::with_capacity(tuples_raw.len());
        for (t_idx, tup) in tuples_raw.iter().enumerate() {
            validate_tuple_tokens(tup, taxonomy, &format!("assignedBusinessContext[{idx}].tuples[{t_idx}]"))?;
            let raw: HashMap<String, Value> = obj(tup, "unreachable")?.clone().into_iter().collect();
            tuples.push(raw);
        }
        out.push(Assignment { component_id, tuples });
    }
    Ok(out)
}

// ---------------------------------------------------------------------
// IUCs
// ---------------------------------------------------------------------

pub fn validate_iucs(value: &Value, taxonomy: &Taxonomy) -> VResult<Vec<Iuc>> {
    let items = arr(value, "iucs must be an array")?;
    let mut ids = Vec::with_capacity(items.len());
    let mut out = Vec::with_capacity(items.len());

    for (idx, iuc_value) in items.iter().enumerate() {
        let map = obj(iuc_value, &format!("iucs[{idx}] must be object"))?;
        let id =
            non_empty_string(map.get("id").ok_or("missing id")?, &format!("iucs[{idx}].id is required"))?.to_string();
        ids.push(id.clone());
        let tuples_value = field(map, "tuples", &format!("iucs[{idx}].tuples must be an array"))?;
        let tuples_raw = arr(tuples_value, &format!("iucs[{idx}].tuples must be an array"))?;
        let mut tuples = Vec::with_capacity(tuples_raw.len());
        for (t_idx, tup) in tuples_raw.iter().enumerate() {
            validate_tuple_tokens(tup, taxonomy, &format!("iucs[{idx}].tuples[{t_idx}]"))?;
            let raw: HashMap<String, Value> = obj(tup, "unreachable")?.clone().into_iter().collect();
            tuples.push(raw);
        }
        out.push(Iuc { id, tuples });
    }
    ensure(unique(&ids), "iucs ids must be unique")?;
    Ok(out)
}

// ---------------------------------------------------------------------
// Mapping config
// ---------------------------------------------------------------------

pub fn validate_mapping_config(value: &Value) -> VResult<MappingConfig> {
    let map = obj(value, "mappingConfig must be an object")?;
    ensure(map.contains_key("profilePairs"), "mappingConfig.profilePairs is required")?;
    ensure(map.contains_key("bie_catalog"), "mappingConfig.bie_catalog is required")?;
    ensure(map.contains_key("schemaPaths"), "mappingConfig.schemaPaths is required")?;

    let profile_pairs_raw = arr(&map["profilePairs"], "mappingConfig.profilePairs must be an array")?;
    let bie_catalog_raw = obj(&map["bie_catalog"], "mappingConfig.bie_catalog must be an object")?;
    let schema_paths_raw = obj(&map["schemaPaths"], "mappingConfig.schemaPaths must be an object")?;

    let mut profile_pairs = Vec::with_capacity(profile_pairs_raw.len());
    for (idx, pair_value) in profile_pairs_raw.iter().enumerate() {
        let pair_map = obj(pair_value, &format!("mappingConfig.profilePairs[{idx}] must be object"))?;
        let source_profile_id = non_empty_string(
            pair_map.get("sourceProfileId").ok_or("missing sourceProfileId")?,
            &format!("mappingConfig.profilePairs[{idx}].sourceProfileId is required"),
        )?
        .to_string();
        let target_profile_id = non_empty_string(
            pair_map.get("targetProfileId").ok_or("missing targetProfileId")?,
            &format!("mappingConfig.profilePairs[{idx}].targetProfileId is required"),
        )?
        .to_string();
        profile_pairs.push(ProfilePair { source_profile_id, target_profile_id });
    }

    let mut bie_catalog = HashMap::with_capacity(bie_catalog_raw.len());
    for (component_id, entry_value) in bie_catalog_raw {
        ensure(!component_id.is_empty(), "mappingConfig.bie_catalog keys must be non-empty strings")?;
        let entry_map = obj(entry_value, &format!("mappingConfig.bie_catalog['{component_id}'] must be object"))?;
        let anchor = non_empty_string(
            entry_map.get("anchor").ok_or("missing anchor")?,
            &format!("mappingConfig.bie_catalog['{component_id}'].anchor is required"),
        )?
        .to_string();
        let relevant_axes = match entry_map.get("relevantAxes") {
            Some(v) => str_list(v, &format!("mappingConfig.bie_catalog['{component_id}'].relevantAxes must be array of strings"))?,
            None => Vec::new(),
        };
        ensure(
            unique(&relevant_axes),
            &format!("mappingConfig.bie_catalog['{component_id}'].relevantAxes must be unique"),
        )?;
        bie_catalog.insert(component_id.clone(), BieCatalogEntry { anchor, relevant_axes });
    }

    let required_sides: HashSet<&str> = ["source", "target"].into_iter().collect();
    let given_sides: HashSet<&str> = schema_paths_raw.keys().map(String::as_str).collect();
    ensure(given_sides == required_sides, "mappingConfig.schemaPaths must contain source and target")?;

    let mut schema_paths = SchemaPaths::default();
    for side in ["source", "target"] {
        let side_map = obj(&schema_paths_raw[side], &format!("mappingConfig.schemaPaths.{side} must be object"))?;
        let mut paths = HashMap::with_capacity(side_map.len());
        for (component_id, path_value) in side_map {
            ensure(!component_id.is_empty(), &format!("mappingConfig.schemaPaths.{side} keys must be non-empty strings"))?;
            let path = non_empty_string(
                path_value,
                &format!("mappingConfig.schemaPaths.{side}['{component_id}'] must be non-empty string"),
            )?;
            paths.insert(component_id.clone(), path.to_string());
        }
        if side == "source" {
            schema_paths.source = paths;
        } else {
            schema_paths.target = paths;
        }
    }

    Ok(MappingConfig { profile_pairs, bie_catalog, schema_paths })
}

/// The fully validated EC input bundle, ready for Step 1.
pub struct EcInputs {
    pub taxonomy: Taxonomy,
    pub policy: Policy,
    pub component_graph: ComponentGraph,
    pub assignments: Vec<Assignment>,
    pub iucs: Vec<Iuc>,
}

/// Validates every §4.1 section in mission order, returning a section tag
/// alongside the first failure so the orchestrator can build the right
/// `{"section": ...}` envelope detail.
pub fn validate_ec_inputs(ec_bundle: &Value, iucs_value: &Value) -> Result<EcInputs, (String, String)> {
    let map = obj(ec_bundle, "ec bundle must be object").map_err(|e| ("bundle".to_string(), e))?;
    for section in ["taxonomy", "policy", "componentGraph", "assignedBusinessContext"] {
        if !map.contains_key(section) {
            return Err(("bundle".to_string(), format!("missing required section: {section}")));
        }
    }

    let taxonomy = validate_taxonomy(&map["taxonomy"]).map_err(|e| ("taxonomy".to_string(), e))?;
    let policy = validate_policy(&map["policy"], &taxonomy).map_err(|e| ("policy".to_string(), e))?;
    let component_graph = validate_component_graph(&map["componentGraph"]).map_err(|e| ("componentGraph".to_string(), e))?;
    let assignments = validate_assignments(&map["assignedBusinessContext"], &taxonomy, &component_graph)
        .map_err(|e| ("assignedBusinessContext".to_string(), e))?;
    let iucs = validate_iucs(iucs_value, &taxonomy).map_err(|e| ("iucs".to_string(), e))?;

    Ok(EcInputs { taxonomy, policy, component_graph, assignments, iucs })
}
