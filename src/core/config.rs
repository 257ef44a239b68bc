//! Project configuration (`flowplan.toml`) and source discovery.
//!
//! Source patterns in the file are relative to the file's directory. Glob
//! matches are sorted and de-duplicated so candidate loading is stable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Default config file name.
pub const CONFIG_FILE: &str = "flowplan.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompilerConfig {
    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Directory relative paths resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    /// Glob patterns of candidate source files
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            pretty: default_pretty(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_pretty() -> bool {
    true
}

impl CompilerConfig {
    pub fn output_dir(&self) -> PathBuf {
        self.base_dir.join(&self.output.dir)
    }

    /// Configured patterns (anchored at `base_dir`) followed by `extra` as given.
    pub fn source_patterns(&self, extra: &[String]) -> Vec<String> {
        self.sources
            .paths
            .iter()
            .map(|p| self.base_dir.join(p).to_string_lossy().into_owned())
            .chain(extra.iter().cloned())
            .collect()
    }
}

/// Parse a config from TOML text.
pub fn parse_config(content: &str) -> Result<CompilerConfig, String> {
    toml::from_str(content).map_err(|e| format!("TOML parse error: {}", e))
}

/// Load a config file; relative paths in it resolve against its directory.
pub fn load_config(path: &Path) -> Result<CompilerConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let mut config =
        parse_config(&content).map_err(|e| format!("{}: {}", path.display(), e))?;
    config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(config)
}

/// Load `explicit` if given, else `flowplan.toml` in the working directory
/// when present, else defaults.
pub fn load_or_default(explicit: Option<&Path>) -> Result<CompilerConfig, String> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    let implicit = Path::new(CONFIG_FILE);
    if implicit.exists() {
        return load_config(implicit);
    }
    Ok(CompilerConfig::default())
}

/// Expand glob patterns into a sorted, de-duplicated list of files.
pub fn expand_globs(patterns: &[String]) -> Result<Vec<PathBuf>, String> {
    let mut files = BTreeSet::new();
    for pattern in patterns {
        let paths =
            glob::glob(pattern).map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?;
        for entry in paths {
            let path = entry.map_err(|e| format!("cannot read {}: {}", pattern, e))?;
            if path.is_file() {
                files.insert(path);
            }
        }
    }
    Ok(files.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let config = parse_config("").unwrap();
        assert!(config.sources.paths.is_empty());
        assert_eq!(config.output.dir, PathBuf::from("build"));
        assert!(config.output.pretty);
    }

    #[test]
    fn test_parse_full() {
        let config = parse_config(
            r#"
[sources]
paths = ["lib/**/*.yaml", "ops/*.yaml"]

[output]
dir = "out"
pretty = false
"#,
        )
        .unwrap();
        assert_eq!(config.sources.paths.len(), 2);
        assert_eq!(config.output.dir, PathBuf::from("out"));
        assert!(!config.output.pretty);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = parse_config("[output]\ndirectory = \"x\"\n").unwrap_err();
        assert!(err.contains("TOML parse error"));
    }

    #[test]
    fn test_load_config_anchors_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[sources]\npaths = [\"lib/*.yaml\"]\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.base_dir, dir.path());
        assert_eq!(config.output_dir(), dir.path().join("build"));

        let patterns = config.source_patterns(&["extra/*.yaml".to_string()]);
        assert_eq!(
            patterns,
            vec![
                dir.path().join("lib/*.yaml").to_string_lossy().into_owned(),
                "extra/*.yaml".to_string(),
            ]
        );
    }

    #[test]
    fn test_load_explicit_missing() {
        let err = load_or_default(Some(Path::new("/nonexistent/flowplan.toml"))).unwrap_err();
        assert!(err.contains("failed to read"));
    }

    #[test]
    fn test_expand_globs_sorted_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.yaml", "a.yaml", "c.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let yaml = dir.path().join("*.yaml").to_string_lossy().into_owned();
        let a = dir.path().join("a.yaml").to_string_lossy().into_owned();

        let files = expand_globs(&[yaml, a]).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.yaml"), dir.path().join("b.yaml")]
        );
    }

    #[test]
    fn test_expand_globs_invalid_pattern() {
        let err = expand_globs(&["[".to_string()]).unwrap_err();
        assert!(err.contains("invalid pattern"));
    }
}
