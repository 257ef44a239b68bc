//! Artifact files — save (atomic), load, and fingerprint verification.

use super::codegen;
use super::fingerprint;
use super::types::CompilationArtifact;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Derive the artifact path for a root executable within an output directory.
pub fn artifact_path(output_dir: &Path, root: &str) -> PathBuf {
    output_dir.join(format!("{}.plan.json", root))
}

/// Save an artifact document atomically (write to temp, then rename).
/// Returns the document's fingerprint.
pub fn save_artifact(
    path: &Path,
    artifact: &CompilationArtifact,
    pretty: bool,
) -> Result<String, String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create dir {}: {}", parent.display(), e))?;
    }

    let doc = codegen::artifact_document(artifact);
    let fp = doc["fingerprint"].as_str().unwrap_or_default().to_string();
    let json = if pretty {
        serde_json::to_string_pretty(&doc)
    } else {
        serde_json::to_string(&doc)
    }
    .map_err(|e| format!("serialize error: {}", e))?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json + "\n")
        .map_err(|e| format!("cannot write {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("cannot rename {} → {}: {}", tmp_path.display(), path.display(), e))?;

    tracing::debug!(path = %path.display(), fingerprint = %fp, "wrote artifact");
    Ok(fp)
}

/// Load an artifact document. Returns None if the file doesn't exist.
pub fn load_document(path: &Path) -> Result<Option<Value>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let doc: Value = serde_json::from_str(&content)
        .map_err(|e| format!("invalid artifact {}: {}", path.display(), e))?;
    Ok(Some(doc))
}

/// Check a loaded document against its recorded fingerprint.
pub fn verify_document(doc: &Value) -> Result<String, String> {
    let Value::Object(map) = doc else {
        return Err("artifact is not a JSON object".to_string());
    };
    let recorded = map
        .get("fingerprint")
        .and_then(Value::as_str)
        .ok_or("artifact has no fingerprint")?
        .to_string();

    let mut body = map.clone();
    body.remove("fingerprint");
    let actual = fingerprint::fingerprint_json(&Value::Object(body));
    if actual != recorded {
        return Err(format!(
            "fingerprint mismatch: recorded {}, computed {}",
            recorded, actual
        ));
    }
    Ok(recorded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::planner::plan_flow;
    use crate::core::types::*;

    fn sample() -> CompilationArtifact {
        let root = plan_flow(&Flow {
            name: "ns.flow".parse().unwrap(),
            inputs: vec![],
            outputs: vec![],
            workflow: Workflow::new(vec![Step::new("a", "ns.op".parse().unwrap())]),
        })
        .unwrap();
        CompilationArtifact {
            execution_plan: root,
            dependencies: Default::default(),
        }
    }

    #[test]
    fn test_artifact_path() {
        let p = artifact_path(Path::new("/out"), "ns.flow");
        assert_eq!(p, PathBuf::from("/out/ns.flow.plan.json"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact_path(&dir.path().join("build"), "ns.flow");
        let fp = save_artifact(&path, &sample(), true).unwrap();

        assert!(fp.starts_with("blake3:"));
        assert_eq!(fp, fingerprint::fingerprint(&sample()));
        assert!(!path.with_extension("json.tmp").exists());

        let doc = load_document(&path).unwrap().unwrap();
        assert_eq!(doc["executionPlan"]["planId"], "ns.flow");
        assert_eq!(verify_document(&doc).unwrap(), fp);
    }

    #[test]
    fn test_compact_and_pretty_share_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let a = save_artifact(&dir.path().join("a.json"), &sample(), true).unwrap();
        let b = save_artifact(&dir.path().join("b.json"), &sample(), false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_document(&dir.path().join("none.json")).unwrap().is_none());
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_document(&path).unwrap_err().contains("invalid artifact"));
    }

    #[test]
    fn test_verify_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        save_artifact(&path, &sample(), false).unwrap();
        let mut doc = load_document(&path).unwrap().unwrap();
        doc["executionPlan"]["beginStepId"] = serde_json::json!(2);
        assert!(verify_document(&doc).unwrap_err().contains("mismatch"));
    }

    #[test]
    fn test_verify_requires_fingerprint() {
        let doc = serde_json::json!({"executionPlan": {}});
        assert!(verify_document(&doc).is_err());
    }
}
