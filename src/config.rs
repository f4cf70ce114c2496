//! Configuration for the driver generator
//!
//! The generator is driven by a single JSON config record. Key names keep
//! the casing the tool has always used, so existing config files continue
//! to work unchanged:
//!
//! ```json
//! {
//!     "import_from": "./json-schema",
//!     "output_path": "./output",
//!     "RootSchema": "ServiceRoot.v1_9_0.json",
//!     "edk2_template_path": "./template",
//!     "edk2_component_filelist": ["RedfishFeatureDrivers.inc"],
//!     "CacheDatabase": true,
//!     "SkipFeatureDriver": false,
//!     "SkipCollectionDriver": false,
//!     "AdditionalFeatureDriver": [],
//!     "ProxyHost": "",
//!     "ProxyPort": ""
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{GeneratorError, Result};
use crate::resolver::ResourceEntry;

/// The generator configuration record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Root directory (or single file) of local schema documents
    pub import_from: PathBuf,

    /// Destination root for generated drivers, caches and auxiliary files
    pub output_path: PathBuf,

    /// Entry schema filename, relative to `import_from`
    #[serde(rename = "RootSchema")]
    pub root_schema: String,

    /// Directory holding the boilerplate driver templates
    pub edk2_template_path: PathBuf,

    /// Auxiliary component list files, touch-created under `output_path`
    /// when absent
    #[serde(default)]
    pub edk2_component_filelist: Vec<String>,

    /// Enable the two independent registry cache files
    #[serde(rename = "CacheDatabase", default)]
    pub cache_database: bool,

    /// Suppress the feature-driver rendering phase
    #[serde(rename = "SkipFeatureDriver", default)]
    pub skip_feature_driver: bool,

    /// Suppress the collection-driver rendering phase
    #[serde(rename = "SkipCollectionDriver", default)]
    pub skip_collection_driver: bool,

    /// Allow-list of resource type names to render as feature drivers
    #[serde(rename = "GenVersionedFeatureDriver", default)]
    pub versioned_feature_drivers: Vec<String>,

    /// Apply the feature-driver allow-list
    #[serde(rename = "GenSelectedFeatureDriver", default)]
    pub selected_feature_driver: bool,

    /// Allow-list of collection type names to render
    #[serde(rename = "GenCollectionDriver", default)]
    pub collection_drivers: Vec<String>,

    /// Apply the collection-driver allow-list
    #[serde(rename = "GenSelectedCollectionDriver", default)]
    pub selected_collection_driver: bool,

    /// Pre-formed registry entries spliced in after the walk; these cover
    /// resources the root schema never references but the output still needs
    #[serde(rename = "AdditionalFeatureDriver", default)]
    pub additional_feature_drivers: Vec<ResourceEntry>,

    /// Outbound HTTP proxy host, empty to disable
    #[serde(rename = "ProxyHost", default)]
    pub proxy_host: String,

    /// Outbound HTTP proxy port, empty to use `proxy_host` verbatim
    #[serde(rename = "ProxyPort", default)]
    pub proxy_port: String,
}

impl GeneratorConfig {
    /// Load the configuration from a JSON file.
    ///
    /// An unreadable or malformed config is a fatal input error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| GeneratorError::InvalidConfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| GeneratorError::InvalidConfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Discover the run's input schema files under `import_from`.
    ///
    /// Directories are walked recursively; within a directory, files sort
    /// case-insensitively. A plain file path is accepted as a one-element
    /// list. Paths are returned absolutized so registry entries and the
    /// local-file check agree on spelling.
    pub fn input_files(&self) -> Result<Vec<PathBuf>> {
        let root = &self.import_from;
        let mut files = Vec::new();

        if root.is_dir() {
            let walker = WalkDir::new(root)
                .sort_by(|a, b| {
                    a.file_name()
                        .to_string_lossy()
                        .to_lowercase()
                        .cmp(&b.file_name().to_string_lossy().to_lowercase())
                })
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .filter(|e| e.path().extension().map(|ext| ext == "json").unwrap_or(false));
            for entry in walker {
                files.push(absolutize(entry.path()));
            }
        } else if root.is_file() {
            files.push(absolutize(root));
        } else {
            return Err(GeneratorError::NoInputFiles(root.clone()));
        }

        Ok(files)
    }

    /// Absolute path of the configured root schema document
    pub fn root_schema_path(&self) -> PathBuf {
        absolutize(&self.import_from.join(&self.root_schema))
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let json = r#"{
            "import_from": "./json-schema",
            "output_path": "./output",
            "RootSchema": "ServiceRoot.v1_9_0.json",
            "edk2_template_path": "./template"
        }"#;
        let config: GeneratorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.root_schema, "ServiceRoot.v1_9_0.json");
        assert!(!config.cache_database);
        assert!(config.additional_feature_drivers.is_empty());
        assert!(config.proxy_host.is_empty());
    }

    #[test]
    fn test_unreadable_config_is_fatal() {
        let result = GeneratorConfig::load("/nonexistent/config.json");
        assert!(matches!(result, Err(GeneratorError::InvalidConfig { .. })));
    }

    #[test]
    fn test_input_files_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Manager.v1_0_0.json");
        std::fs::write(&file, "{}").unwrap();

        let config: GeneratorConfig = serde_json::from_str(&format!(
            r#"{{"import_from": "{}", "output_path": "out",
                "RootSchema": "x.json", "edk2_template_path": "t"}}"#,
            file.display()
        ))
        .unwrap();
        let files = config.input_files().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_absolute());
    }

    #[test]
    fn test_input_files_directory_json_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("A.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let config: GeneratorConfig = serde_json::from_str(&format!(
            r#"{{"import_from": "{}", "output_path": "out",
                "RootSchema": "x.json", "edk2_template_path": "t"}}"#,
            dir.path().display()
        ))
        .unwrap();
        let files = config.input_files().unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["A.json", "b.json"]);
    }

    #[test]
    fn test_missing_input_dir_is_fatal() {
        let config: GeneratorConfig = serde_json::from_str(
            r#"{"import_from": "/no/such/dir", "output_path": "out",
                "RootSchema": "x.json", "edk2_template_path": "t"}"#,
        )
        .unwrap();
        assert!(matches!(
            config.input_files(),
            Err(GeneratorError::NoInputFiles(_))
        ));
    }
}
