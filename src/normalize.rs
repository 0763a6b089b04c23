use crate::enums::PrivilegeLevel;
use crate::identifiers::effective_identifiers;
use crate::types::*;

/// Normalize a validated definition into its canonical fully-expanded form.
/// Vocabularies are materialized and entry nodes get their implied privilege.
/// Vulnerability shorthand is already expanded into branches at parse time.
///
/// This is idempotent: `normalize(normalize(def)) == normalize(def)`.
pub fn normalize(mut def: NetworkDefinition) -> NetworkDefinition {
    // N-001: Materialize identifiers
    n001_identifiers(&mut def);

    // N-002: Entry nodes are owned at least as local user
    n002_entry_privilege(&mut def);

    def
}

// ─── N-001: Identifiers ─────────────────────────────────────────────────────

fn n001_identifiers(def: &mut NetworkDefinition) {
    def.identifiers = Some(effective_identifiers(def));
}

// ─── N-002: Entry node privilege ────────────────────────────────────────────

fn n002_entry_privilege(def: &mut NetworkDefinition) {
    for node in def.nodes.iter_mut().filter(|n| n.agent_installed) {
        node.privilege_level = node.privilege_level.escalate(PrivilegeLevel::LocalUser);
    }
}
