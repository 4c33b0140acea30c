//! Tuple algebra: the complete-tuple representation, exact dedup, and the
//! meet of two tuples / two tuple sets over a taxonomy.

use crate::taxonomy::Taxonomy;
use crate::token;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// A partial, not-yet-normalized assignment of tokens to taxonomy keys, as
/// read straight off the wire. Values stay JSON (not `String`) because a
/// caller that skips assignment validation (Step 1 can be driven directly)
/// may legitimately hand us a non-string token, which Step 1 must detect and
/// log rather than panic on.
pub type RawTuple = HashMap<String, Value>;

/// A complete tuple: one token for every taxonomy key, stored in taxonomy
/// order. That ordering is a structural invariant of this type, not a
/// convention callers have to remember — see SPEC_FULL.md §9.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tuple(Vec<(String, String)>);

impl Tuple {
    /// Builds a tuple over every taxonomy key by asking `f` for each key's
    /// token in turn. Returns `None` as soon as any key is undefined,
    /// mirroring the "meet over all taxonomy keys; any undefined key makes
    /// the whole meet undefined" rule.
    pub fn build<F>(taxonomy: &Taxonomy, mut f: F) -> Option<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut entries = Vec::with_capacity(taxonomy.keys.len());
        for key in &taxonomy.keys {
            entries.push((key.clone(), f(key)?));
        }
        Some(Tuple(entries))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (k, v) in &self.0 {
            map.insert(k.clone(), Value::String(v.clone()));
        }
        Value::Object(map)
    }
}

/// Exact dedup, preserving first-seen order.
pub fn dedup_exact(tuples: Vec<Tuple>) -> Vec<Tuple> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(tuples.len());
    for tuple in tuples {
        if seen.insert(tuple.clone()) {
            out.push(tuple);
        }
    }
    out
}

/// The meet of two complete tuples: per-key token meet, undefined if any
/// key's meet is undefined.
pub fn meet_tuple(left: &Tuple, right: &Tuple, taxonomy: &Taxonomy) -> Option<Tuple> {
    let case_sensitive = taxonomy.case_sensitive();
    let delimiter = taxonomy.delimiter();
    Tuple::build(taxonomy, |key| {
        let l = left.get(key)?;
        let r = right.get(key)?;
        let placeholder = taxonomy.placeholders.get(key)?;
        token::meet_token(l, r, placeholder, delimiter, case_sensitive)
    })
}

/// The meet of two tuple sets: cross product, keep the defined meets,
/// exact-dedup preserving first-seen order. Either side empty makes the
/// result empty.
pub fn meet_tuple_sets(left: &[Tuple], right: &[Tuple], taxonomy: &Taxonomy) -> Vec<Tuple> {
    let mut out = Vec::new();
    for l in left {
        for r in right {
            if let Some(meet) = meet_tuple(l, r, taxonomy) {
                out.push(meet);
            }
        }
    }
    dedup_exact(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn taxonomy() -> Taxonomy {
        serde_json::from_value(serde_json::json!({
            "keys": ["Region", "Channel"],
            "placeholders": {"Region": "Region.<Any>", "Channel": "Channel.<Any>"},
            "categories": {
                "Region": ["Region", "Region.EU", "Region.EU.DE", "Region.US"],
                "Channel": ["Channel", "Channel.B2B", "Channel.B2C"]
            },
            "defaults": {"Channel": "Channel.B2B"}
        }))
        .unwrap()
    }

    fn tuple(taxonomy: &Taxonomy, pairs: &[(&str, &str)]) -> Tuple {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Tuple::build(taxonomy, |key| map.get(key).cloned()).unwrap()
    }

    #[test]
    fn dedup_preserves_first_seen_order() {
        let tx = taxonomy();
        let a = tuple(&tx, &[("Region", "Region.EU"), ("Channel", "Channel.B2B")]);
        let b = tuple(&tx, &[("Region", "Region.US"), ("Channel", "Channel.B2C")]);
        let deduped = dedup_exact(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(deduped, vec![a, b]);
    }

    #[test]
    fn dedup_is_idempotent() {
        let tx = taxonomy();
        let a = tuple(&tx, &[("Region", "Region.EU"), ("Channel", "Channel.B2B")]);
        let once = dedup_exact(vec![a.clone(), a.clone()]);
        let twice = dedup_exact(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_set_meet_is_empty() {
        let tx = taxonomy();
        let a = tuple(&tx, &[("Region", "Region.EU"), ("Channel", "Channel.B2B")]);
        assert!(meet_tuple_sets(&[], &[a], &tx).is_empty());
    }

    #[test]
    fn meet_narrows_to_the_more_specific_side() {
        let tx = taxonomy();
        let broad = tuple(&tx, &[("Region", "Region.EU"), ("Channel", "Channel.<Any>")]);
        let narrow = tuple(&tx, &[("Region", "Region.EU.DE"), ("Channel", "Channel.B2B")]);
        let meet = meet_tuple(&broad, &narrow, &tx).unwrap();
        assert_eq!(meet.get("Region"), Some("Region.EU.DE"));
        assert_eq!(meet.get("Channel"), Some("Channel.B2B"));
    }
}
