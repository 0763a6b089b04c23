//! The working network: nodes in declaration order plus annotated edges.
//!
//! An [`Environment`] built from a definition is the immutable template of a
//! simulation. Episodes clone it into their own working copy, so sharing one
//! template behind an `Arc` across many episodes is safe.

use crate::enums::{EdgeAnnotation, VulnerabilityType};
use crate::error::{ActionError, ValidationError};
use crate::normalize::normalize;
use crate::types::*;
use crate::validate::validate;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct Environment {
    version: String,
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,
    edges: BTreeMap<(NodeId, NodeId), EdgeAnnotation>,
    vulnerability_library: Vec<Vulnerability>,
    identifiers: Identifiers,
}

/// A directed, annotated edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub kind: EdgeAnnotation,
}

/// Nodes and edges restricted to a node subset.
#[derive(Clone, Debug)]
pub struct Subgraph<'a> {
    pub nodes: Vec<&'a Node>,
    pub edges: Vec<Edge<'a>>,
}

impl Environment {
    /// Validate and normalize a definition, then build the environment.
    ///
    /// A definition with any validation error never produces an environment.
    pub fn from_definition(def: NetworkDefinition) -> Result<Self, Vec<ValidationError>> {
        let result = validate(&def);
        for w in &result.warnings {
            warn!(code = %w.code, path = ?w.path, "{}", w.message);
        }
        if !result.is_valid() {
            return Err(result.errors);
        }
        Ok(Self::from_normalized(normalize(def)))
    }

    /// Build from a definition that already went through validation and normalization.
    pub(crate) fn from_normalized(def: NetworkDefinition) -> Self {
        let index = def
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        debug!(nodes = def.nodes.len(), "environment built");
        Environment {
            version: def.version,
            identifiers: def.identifiers.unwrap_or_default(),
            nodes: def.nodes,
            index,
            edges: BTreeMap::new(),
            vulnerability_library: def.vulnerability_library,
        }
    }

    /// Back to a definition, with the current node state.
    pub fn to_definition(&self) -> NetworkDefinition {
        NetworkDefinition {
            version: self.version.clone(),
            identifiers: Some(self.identifiers.clone()),
            vulnerability_library: self.vulnerability_library.clone(),
            nodes: self.nodes.clone(),
        }
    }

    pub fn identifiers(&self) -> &Identifiers {
        &self.identifiers
    }

    pub fn vulnerability_library(&self) -> &[Vulnerability] {
        &self.vulnerability_library
    }

    /// Whether any node or the library declares a vulnerability `id`.
    pub fn declares_vulnerability(&self, id: &str) -> bool {
        self.global_vulnerability(id).is_some()
            || self.nodes.iter().any(|n| n.vulnerability(id).is_some())
    }

    pub fn global_vulnerability(&self, id: &str) -> Option<&Vulnerability> {
        self.vulnerability_library.iter().find(|v| v.id == id)
    }

    pub fn global_remote_vulnerabilities(&self) -> impl Iterator<Item = &Vulnerability> {
        self.vulnerability_library
            .iter()
            .filter(|v| v.vulnerability_type == VulnerabilityType::Remote)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get_node(&self, id: &str) -> Result<&Node, ActionError> {
        self.index
            .get(id)
            .map(|&i| &self.nodes[i])
            .ok_or_else(|| ActionError::unknown_node(id))
    }

    pub fn get_node_mut(&mut self, id: &str) -> Result<&mut Node, ActionError> {
        match self.index.get(id) {
            Some(&i) => Ok(&mut self.nodes[i]),
            None => Err(ActionError::unknown_node(id)),
        }
    }

    /// The `index`-th remote vulnerability variant addressable on `node`:
    /// the node's own remote vulnerabilities first, then the global ones.
    pub fn remote_variant(&self, node: &str, index: usize) -> Option<&Vulnerability> {
        let node = self.get_node(node).ok()?;
        node.remote_vulnerabilities()
            .chain(self.global_remote_vulnerabilities())
            .nth(index)
    }

    /// Record an interaction. An existing edge keeps the strongest annotation.
    pub fn add_edge(&mut self, source: &str, target: &str, kind: EdgeAnnotation) {
        self.edges
            .entry((source.to_string(), target.to_string()))
            .and_modify(|k| *k = (*k).max(kind))
            .or_insert(kind);
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<EdgeAnnotation> {
        self.edges
            .get(&(source.to_string(), target.to_string()))
            .copied()
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge<'_>> {
        self.edges.iter().map(|((s, t), k)| Edge {
            source: s,
            target: t,
            kind: *k,
        })
    }

    /// Induced subgraph over `ids`, keeping the order of `ids`. Unknown ids are skipped.
    pub fn induced_subgraph<'a>(&'a self, ids: &[NodeId]) -> Subgraph<'a> {
        let keep: HashSet<&str> = ids.iter().map(String::as_str).collect();
        Subgraph {
            nodes: ids.iter().filter_map(|id| self.get_node(id).ok()).collect(),
            edges: self
                .edges()
                .filter(|e| keep.contains(e.source) && keep.contains(e.target))
                .collect(),
        }
    }

    /// Copy of this environment with switched-off detection points removed.
    ///
    /// Branches triggering a disabled detection point are dropped, and so are
    /// vulnerabilities left without branches. Unlisted detection points stay on.
    pub fn with_honeytokens(&self, toggles: &BTreeMap<String, bool>) -> Environment {
        let disabled: HashSet<&str> = toggles
            .iter()
            .filter(|(_, on)| !**on)
            .map(|(name, _)| name.as_str())
            .collect();
        let mut env = self.clone();
        if disabled.is_empty() {
            return env;
        }

        let strip = |vulns: &mut Vec<Vulnerability>| {
            for v in vulns.iter_mut() {
                v.branches
                    .retain(|b| !b.outcome.detection_points().any(|d| disabled.contains(d)));
            }
            vulns.retain(|v| !v.branches.is_empty());
        };
        strip(&mut env.vulnerability_library);
        for node in &mut env.nodes {
            strip(&mut node.vulnerabilities);
        }
        env.identifiers
            .detection_point_names
            .retain(|d| !disabled.contains(d.as_str()));
        debug!(disabled = ?disabled, "honeytokens switched off");
        env
    }
}
