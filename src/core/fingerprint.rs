//! BLAKE3 fingerprints of compiled artifacts.
//!
//! Two compilations of the same sources yield the same fingerprint; any
//! change in numbering or action data changes it.

use super::codegen;
use super::types::CompilationArtifact;
use serde_json::Value;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Fingerprint of compact JSON text.
pub fn fingerprint_json(value: &Value) -> String {
    hash_string(&value.to_string())
}

/// Fingerprint of an artifact's runtime JSON.
pub fn fingerprint(artifact: &CompilationArtifact) -> String {
    fingerprint_json(&codegen::runtime_json(artifact))
}

/// Per-plan fingerprints, root first, keyed by plan id.
pub fn plan_fingerprints(artifact: &CompilationArtifact) -> Vec<(String, String)> {
    artifact
        .plans()
        .map(|plan| {
            (
                plan.plan_id.clone(),
                fingerprint_json(&codegen::plan_to_json(plan)),
            )
        })
        .collect()
}
