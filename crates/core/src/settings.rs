//! Engine and deployment settings.
//!
//! Settings come from an optional YAML file and are then overridden by
//! `TABULOOKUP_*` environment variables.

use crate::error::{LookupError, LookupResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File in the state directory holding the dataset registry snapshot.
pub const DATASETS_FILE: &str = "datasets.json";
/// File in the state directory holding the query audit trail.
pub const AUDIT_FILE: &str = "query_log.jsonl";

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the HTTP server binds to.
    pub bind: String,
    /// Directory for persisted state. `None` keeps everything in memory.
    pub state_dir: Option<PathBuf>,
    /// Deadline for a single query, in milliseconds.
    pub query_timeout_ms: u64,
    /// Keep parsed sheets in memory between queries.
    pub row_cache: bool,
    /// Largest file accepted at registration, in bytes.
    pub max_upload_bytes: u64,
    /// Accepted file extensions (lowercase, without the dot).
    pub allowed_extensions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            state_dir: None,
            query_timeout_ms: 30_000,
            row_cache: false,
            max_upload_bytes: 10 * 1024 * 1024,
            allowed_extensions: ["xlsx", "xlsm", "xls", "ods", "csv"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl Settings {
    /// Parse settings from YAML. Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> LookupResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| LookupError::InvalidInput(format!("settings: {e}")))
    }

    /// Load settings from an optional YAML file, then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> LookupResult<Self> {
        let mut settings = match path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path).map_err(|e| {
                    LookupError::InvalidInput(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_yaml_str(&yaml)?
            }
            None => Self::default(),
        };
        settings.apply_overrides(std::env::vars())?;
        Ok(settings)
    }

    /// Apply `TABULOOKUP_*` overrides from key/value pairs.
    pub fn apply_overrides<I>(&mut self, vars: I) -> LookupResult<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "TABULOOKUP_BIND" => self.bind = value,
                "TABULOOKUP_STATE_DIR" => self.state_dir = Some(PathBuf::from(value)),
                "TABULOOKUP_QUERY_TIMEOUT_MS" => {
                    self.query_timeout_ms = parse_number(&key, &value)?;
                }
                "TABULOOKUP_ROW_CACHE" => {
                    self.row_cache = matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                }
                "TABULOOKUP_MAX_UPLOAD_BYTES" => {
                    self.max_upload_bytes = parse_number(&key, &value)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Path of the registry snapshot, when state is persisted.
    #[must_use]
    pub fn datasets_path(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join(DATASETS_FILE))
    }

    /// Path of the audit trail, when state is persisted.
    #[must_use]
    pub fn audit_path(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join(AUDIT_FILE))
    }

    /// Whether a path has an accepted extension.
    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_lowercase();
                self.allowed_extensions.iter().any(|allowed| *allowed == ext)
            })
    }
}

fn parse_number(key: &str, value: &str) -> LookupResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| LookupError::InvalidInput(format!("{key} must be a number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_keeps_defaults_for_missing_keys() {
        let settings = Settings::from_yaml_str("query_timeout_ms: 500\nrow_cache: true\n").unwrap();
        assert_eq!(settings.query_timeout(), Duration::from_millis(500));
        assert!(settings.row_cache);
        assert_eq!(settings.bind, "0.0.0.0:3000");
        assert!(settings.state_dir.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings
            .apply_overrides(vec![
                ("TABULOOKUP_STATE_DIR".to_string(), "/var/lib/tabulookup".to_string()),
                ("TABULOOKUP_ROW_CACHE".to_string(), "on".to_string()),
                ("TABULOOKUP_MAX_UPLOAD_BYTES".to_string(), "2048".to_string()),
                ("UNRELATED".to_string(), "x".to_string()),
            ])
            .unwrap();

        assert!(settings.row_cache);
        assert_eq!(settings.max_upload_bytes, 2048);
        assert_eq!(
            settings.datasets_path().unwrap(),
            PathBuf::from("/var/lib/tabulookup/datasets.json")
        );
    }

    #[test]
    fn test_bad_number_override() {
        let mut settings = Settings::default();
        let err = settings
            .apply_overrides(vec![("TABULOOKUP_QUERY_TIMEOUT_MS".to_string(), "soon".to_string())])
            .unwrap_err();
        assert!(matches!(err, LookupError::InvalidInput(_)));
    }

    #[test]
    fn test_accepts_extensions_case_insensitively() {
        let settings = Settings::default();
        assert!(settings.accepts(Path::new("report.XLSX")));
        assert!(settings.accepts(Path::new("data.csv")));
        assert!(!settings.accepts(Path::new("notes.txt")));
        assert!(!settings.accepts(Path::new("no_extension")));
    }
}
