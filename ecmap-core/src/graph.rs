//! The component graph data model and the one piece of graph algorithm
//! shared by Step 2 and Step 3: a deterministic topological order over the
//! ASBIE-induced ABIE dependency graph.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

#[derive(Debug, Clone, Deserialize)]
pub struct AbieDef {
    pub id: String,
    #[serde(rename = "childrenBBIE", default)]
    pub children_bbie: Vec<String>,
    #[serde(rename = "childrenASBIE", default)]
    pub children_asbie: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AsbieDef {
    pub id: String,
    #[serde(rename = "sourceABIE")]
    pub source_abie: String,
    #[serde(rename = "targetABIE")]
    pub target_abie: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BbieDef {
    pub id: String,
    #[serde(rename = "ownerABIE")]
    pub owner_abie: String,
}

fn default_max_fixpoint_rounds() -> u64 {
    8
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphRules {
    #[serde(rename = "maxFixpointRounds", default = "default_max_fixpoint_rounds")]
    pub max_fixpoint_rounds: u64,
}

impl Default for GraphRules {
    fn default() -> Self {
        Self { max_fixpoint_rounds: default_max_fixpoint_rounds() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentGraph {
    #[serde(rename = "rootABIE")]
    pub root_abie: String,
    pub abies: Vec<AbieDef>,
    pub asbies: Vec<AsbieDef>,
    pub bbies: Vec<BbieDef>,
    #[serde(default)]
    pub rules: GraphRules,
}

impl ComponentGraph {
    pub fn abie_map(&self) -> HashMap<&str, &AbieDef> {
        self.abies.iter().map(|a| (a.id.as_str(), a)).collect()
    }

    pub fn asbie_map(&self) -> HashMap<&str, &AsbieDef> {
        self.asbies.iter().map(|a| (a.id.as_str(), a)).collect()
    }

    pub fn bbie_map(&self) -> HashMap<&str, &BbieDef> {
        self.bbies.iter().map(|b| (b.id.as_str(), b)).collect()
    }
}

/// Kahn's algorithm over the ABIE dependency graph induced by ASBIEs
/// (`source -> target`). Every choice point — the initial queue and each
/// node's outgoing edges — is visited in lexicographic id order, so the
/// result depends only on the graph's contents. Returns `None` on a cycle.
pub fn topological_order(graph: &ComponentGraph) -> Option<Vec<String>> {
    let asbie_by_id = graph.asbie_map();

    let mut edges: BTreeMap<&str, BTreeSet<&str>> = graph.abies.iter().map(|a| (a.id.as_str(), BTreeSet::new())).collect();
    let mut indeg: BTreeMap<&str, usize> = graph.abies.iter().map(|a| (a.id.as_str(), 0usize)).collect();

    for abie in &graph.abies {
        for asbie_id in &abie.children_asbie {
            let target = asbie_by_id[asbie_id.as_str()].target_abie.as_str();
            if edges.get_mut(abie.id.as_str()).unwrap().insert(target) {
                *indeg.get_mut(target).unwrap() += 1;
            }
        }
    }

    // BTreeMap iteration is already key-sorted, so this starting queue is
    // lexicographic without an extra sort.
    let mut queue: VecDeque<&str> = indeg.iter().filter(|(_, &d)| d == 0).map(|(&id, _)| id).collect();

    let mut out: Vec<String> = Vec::with_capacity(graph.abies.len());
    while let Some(node) = queue.pop_front() {
        out.push(node.to_string());
        let mut next_ready: Vec<&str> = Vec::new();
        for &next in edges[node].iter() {
            let d = indeg.get_mut(next).unwrap();
            *d -= 1;
            if *d == 0 {
                next_ready.push(next);
            }
        }
        next_ready.sort_unstable();
        for n in next_ready {
            queue.push_back(n);
        }
    }

    if out.len() != graph.abies.len() {
        None
    } else {
        Some(out)
    }
}
