//! Resource graph resolution
//!
//! Walks the schema reference graph breadth-first from the configured root
//! document, discovering every reachable versioned resource and the
//! collections that reference them. Discoveries land in two registries —
//! feature drivers and collection drivers — deduplicated by driver path,
//! with every discovery path recorded on the existing entry. Once the
//! graph is fully discovered the resolver drives synthesis and rendering
//! for each registry entry.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::GeneratorConfig;
use crate::error::Result;
use crate::parser::{classify_unversioned, extract_properties, locate_definition};
use crate::render::TemplateRenderer;
use crate::source::SchemaSource;
use crate::synth::{NestedCollectionRef, PropertyCodeSynthesizer};

/// One feature-driver registry row, keyed uniquely by `driver_path`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    /// Path or URI of the versioned schema file
    #[serde(rename = "driver_fname")]
    pub driver_path: String,

    /// Discovery paths under which this resource was reached, first-seen
    /// order, no duplicates
    #[serde(
        rename = "driver_depex",
        default,
        deserialize_with = "one_or_many_paths"
    )]
    pub dependency_paths: Vec<String>,

    /// Resolved schema type name; filled in when the entry is visited
    #[serde(default)]
    pub type_name: String,

    #[serde(rename = "exist", default)]
    pub exists: bool,
}

impl ResourceEntry {
    fn discovered(driver_path: String, dependency_path: &str) -> Self {
        Self {
            driver_path,
            dependency_paths: vec![dependency_path.to_string()],
            type_name: String::new(),
            exists: false,
        }
    }
}

/// One collection registry row, keyed uniquely by `driver_path`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionEntry {
    #[serde(rename = "driver_fname")]
    pub driver_path: String,

    #[serde(
        rename = "driver_depex",
        default,
        deserialize_with = "one_or_many_paths"
    )]
    pub dependency_paths: Vec<String>,

    /// Schema type name of the collection document
    #[serde(rename = "local_name", default)]
    pub resource_type_name: String,
}

/// Older config and cache files carry a single depex string; newer ones a
/// list. Accept both.
fn one_or_many_paths<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(path) => vec![path],
        OneOrMany::Many(paths) => paths,
    })
}

/// Entries that can live in a [`Registry`]
pub trait RegistryEntry {
    fn driver_path(&self) -> &str;
    fn dependency_paths(&self) -> &[String];
    fn dependency_paths_mut(&mut self) -> &mut Vec<String>;
}

impl RegistryEntry for ResourceEntry {
    fn driver_path(&self) -> &str {
        &self.driver_path
    }
    fn dependency_paths(&self) -> &[String] {
        &self.dependency_paths
    }
    fn dependency_paths_mut(&mut self) -> &mut Vec<String> {
        &mut self.dependency_paths
    }
}

impl RegistryEntry for CollectionEntry {
    fn driver_path(&self) -> &str {
        &self.driver_path
    }
    fn dependency_paths(&self) -> &[String] {
        &self.dependency_paths
    }
    fn dependency_paths_mut(&mut self) -> &mut Vec<String> {
        &mut self.dependency_paths
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    New,
    Existing,
}

/// Insertion-ordered, driver-path-keyed registry.
///
/// The vector preserves discovery order for deterministic output; the map
/// gives O(1) membership for the merge.
#[derive(Debug)]
pub struct Registry<T> {
    entries: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T: RegistryEntry> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Rebuild a registry from cached entries, verbatim
    pub fn from_entries(entries: Vec<T>) -> Self {
        let mut index = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            index.entry(entry.driver_path().to_string()).or_insert(i);
        }
        Self { entries, index }
    }

    /// The sole deduplication mechanism: a known `driver_path` gains the
    /// new entry's unseen dependency paths, an unknown one is appended.
    pub fn merge(&mut self, entry: T) -> MergeOutcome {
        match self.index.get(entry.driver_path()) {
            Some(&i) => {
                let known = self.entries[i].dependency_paths_mut();
                for dep in entry.dependency_paths() {
                    if !known.iter().any(|d| d == dep) {
                        known.push(dep.clone());
                    }
                }
                MergeOutcome::Existing
            }
            None => {
                self.index
                    .insert(entry.driver_path().to_string(), self.entries.len());
                self.entries.push(entry);
                MergeOutcome::New
            }
        }
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn get_mut(&mut self, index: usize) -> &mut T {
        &mut self.entries[index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: RegistryEntry> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// State of one registry cache file across a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheState {
    #[default]
    Miss,
    HitLoaded,
    WrittenThisRun,
}

/// A `{resource, property}` pair excluded from discovery, with the reason
/// on record. Additions here are deliberate and auditable.
pub struct DiscoveryException {
    /// `None` applies to every resource type
    pub resource_type: Option<&'static str>,
    pub property: &'static str,
    pub reason: &'static str,
}

pub const DISCOVERY_EXCEPTIONS: &[DiscoveryException] = &[DiscoveryException {
    resource_type: None,
    property: "StorageSystems",
    reason: "also refers to the ComputerSystem schema, which breaks resolution of Systems",
}];

pub fn discovery_exception(resource_type: &str, property: &str) -> Option<&'static DiscoveryException> {
    DISCOVERY_EXCEPTIONS.iter().find(|e| {
        e.property == property && e.resource_type.map(|r| r == resource_type).unwrap_or(true)
    })
}

/// Drives the whole pipeline: graph walk, registries, synthesis, rendering
pub struct ResourceGraphResolver<'a> {
    config: &'a GeneratorConfig,
    source: &'a dyn SchemaSource,
    pub features: Registry<ResourceEntry>,
    pub collections: Registry<CollectionEntry>,
    feature_cache: CacheState,
    collection_cache: CacheState,
}

impl<'a> ResourceGraphResolver<'a> {
    pub fn new(config: &'a GeneratorConfig, source: &'a dyn SchemaSource) -> Self {
        Self {
            config,
            source,
            features: Registry::new(),
            collections: Registry::new(),
            feature_cache: CacheState::default(),
            collection_cache: CacheState::default(),
        }
    }

    /// Run the full pipeline
    pub fn run(&mut self) -> Result<()> {
        let renderer = TemplateRenderer::new(self.config);

        self.load_feature_cache();
        if self.features.is_empty() {
            self.walk();
        }
        self.append_additional_drivers();

        let mut nested = Vec::new();
        if !self.config.skip_feature_driver {
            info!("generating feature drivers");
            nested = self.generate_feature_drivers(&renderer)?;
        }
        self.write_feature_cache()?;

        self.load_collection_cache();
        if self.collection_cache != CacheState::HitLoaded {
            self.absorb_nested_collections(&nested);
        }
        self.write_collection_cache()?;

        if !self.config.skip_collection_driver {
            info!("generating collection drivers");
            self.generate_collection_drivers(&renderer)?;
        }

        renderer.touch_component_files()?;
        Ok(())
    }

    /// Breadth-first traversal from the root schema. Every new feature
    /// entry is itself loaded and classified until no entry is left.
    pub fn walk(&mut self) {
        let root = self.config.root_schema_path().display().to_string();
        self.extract_versioned(&root, None);

        let mut index = 0;
        while index < self.features.len() {
            let entry = self.features.entries()[index].clone();
            let depex = entry.dependency_paths.first().cloned();
            self.extract_versioned(&entry.driver_path, depex.as_deref());
            index += 1;
        }
    }

    /// Discover the collection and non-collection references of one
    /// versioned document and merge them into the registries.
    fn extract_versioned(&mut self, path: &str, depex: Option<&str>) {
        let Some(doc) = self.source.load(path) else {
            warn!("unable to load {path}, reference skipped");
            return;
        };
        let typename = locate_definition(&doc)
            .map(|(name, _)| name)
            .unwrap_or_default();
        let Some((collection_props, non_collection_props)) = self.extract_prop_info(&doc) else {
            return;
        };
        let parent = depex.unwrap_or(&typename).to_string();
        debug!("[{path}] depex: {parent}");

        for (prop_name, reference) in collection_props {
            if let Some(exception) = discovery_exception(&typename, &prop_name) {
                warn!("skipping {typename}/{prop_name}: {}", exception.reason);
                continue;
            }
            let dep_path = format!("{parent}/{prop_name}/{{}}");
            let Some(collection_doc) = self.source.load(&reference) else {
                continue;
            };
            let resource_type_name = locate_definition(&collection_doc)
                .map(|(name, _)| name)
                .unwrap_or_default();
            let entry = CollectionEntry {
                driver_path: reference.clone(),
                dependency_paths: vec![dep_path.clone()],
                resource_type_name,
            };
            if self.collections.merge(entry) == MergeOutcome::Existing {
                continue;
            }
            debug!("collection {reference} at {dep_path}");
            for member in self.versioned_members(&collection_doc) {
                self.features
                    .merge(ResourceEntry::discovered(member, &dep_path));
            }
        }

        for (prop_name, reference) in non_collection_props {
            let dep_path = format!("{parent}/{prop_name}");
            let Some(unversioned) = self.source.load(&reference) else {
                continue;
            };
            for member in self.versioned_members(&unversioned) {
                self.features
                    .merge(ResourceEntry::discovered(member, &dep_path));
            }
        }
    }

    /// Partition a document's reference properties into collection and
    /// non-collection targets by classifying each referenced document.
    fn extract_prop_info(&self, doc: &Value) -> Option<(Vec<(String, String)>, Vec<(String, String)>)> {
        let (descriptors, _) = extract_properties(doc)?;
        let mut collection_props = Vec::new();
        let mut non_collection_props = Vec::new();

        for descriptor in descriptors {
            if descriptor.declared_type.is_some() {
                continue;
            }
            let Some(reference) = descriptor.reference else {
                continue;
            };
            if reference.starts_with("#/definitions/") {
                continue;
            }
            let Some(target) = self.source.load(&reference) else {
                continue;
            };
            let Some(result) = classify_unversioned(&target) else {
                continue;
            };
            if result.is_collection_of.is_some() {
                collection_props.push((descriptor.name, reference));
            } else {
                non_collection_props.push((descriptor.name, reference));
            }
        }

        Some((collection_props, non_collection_props))
    }

    /// Versioned schema paths behind an unversioned document. A collection
    /// hops to its member type first; the member fan-out comes from that
    /// document's own `anyOf`, never from the collection wrapper.
    fn versioned_members(&self, doc: &Value) -> Vec<String> {
        let Some(mut result) = classify_unversioned(doc) else {
            return Vec::new();
        };
        if let Some(member_path) = result.is_collection_of.clone() {
            match self
                .source
                .load(&member_path)
                .and_then(|d| classify_unversioned(&d))
            {
                Some(inner) => result = inner,
                None => return Vec::new(),
            }
        }
        result
            .alternatives
            .iter()
            .map(|alt| match self.source.local_path(&alt.reference) {
                Some(local) => local.display().to_string(),
                None => alt.reference.clone(),
            })
            .collect()
    }

    /// Splice in the configured resources unreachable from the root schema
    fn append_additional_drivers(&mut self) {
        for entry in self.config.additional_feature_drivers.clone() {
            if self.features.merge(entry) == MergeOutcome::Existing {
                debug!("additional driver already discovered");
            }
        }
    }

    /// Synthesize and render every feature registry entry, filling in type
    /// names as entries are visited. Returns the collection references
    /// discovered inside nested members.
    fn generate_feature_drivers(
        &mut self,
        renderer: &TemplateRenderer<'_>,
    ) -> Result<Vec<NestedCollectionRef>> {
        let synthesizer = PropertyCodeSynthesizer::new(self.source);
        let allowlist_active = !self.config.versioned_feature_drivers.is_empty()
            && self.config.selected_feature_driver;
        let mut nested = Vec::new();

        for index in 0..self.features.len() {
            let entry = self.features.entries()[index].clone();
            if allowlist_active
                && !(!entry.type_name.is_empty()
                    && self
                        .config
                        .versioned_feature_drivers
                        .contains(&entry.type_name))
            {
                continue;
            }

            info!("feature driver: {}", entry.driver_path);
            let Some(doc) = self.source.load(&entry.driver_path) else {
                continue;
            };
            if let Some((typename, _)) = locate_definition(&doc) {
                self.features.get_mut(index).type_name = typename;
            }

            let fname = driver_basename(&entry.driver_path);
            let Some(output) = synthesizer.synthesize(&fname, &doc) else {
                continue;
            };
            nested.extend(output.nested_collections);

            let parent_prop = entry
                .dependency_paths
                .first()
                .map(|dep| parent_property(dep))
                .unwrap_or_default();
            renderer.render_feature(&fname, &output.bundle, &parent_prop)?;
        }

        Ok(nested)
    }

    /// Fold the synthesis-discovered collection references into the one
    /// collection registry. New collections also contribute their member
    /// fan-out to the feature registry.
    fn absorb_nested_collections(&mut self, refs: &[NestedCollectionRef]) {
        for nested in refs {
            let dep_path = format!("{}/{{}}", nested.dependency_path);
            let Some(doc) = self.source.load(&nested.reference) else {
                continue;
            };
            let resource_type_name = locate_definition(&doc)
                .map(|(name, _)| name)
                .unwrap_or_default();
            let entry = CollectionEntry {
                driver_path: nested.reference.clone(),
                dependency_paths: vec![dep_path.clone()],
                resource_type_name,
            };
            if self.collections.merge(entry) == MergeOutcome::Existing {
                continue;
            }
            for member in self.versioned_members(&doc) {
                self.features
                    .merge(ResourceEntry::discovered(member, &dep_path));
            }
        }
    }

    fn generate_collection_drivers(&self, renderer: &TemplateRenderer<'_>) -> Result<()> {
        let allowlist_active = !self.config.versioned_feature_drivers.is_empty()
            && self.config.selected_collection_driver;
        for entry in self.collections.entries() {
            if allowlist_active
                && !self
                    .config
                    .collection_drivers
                    .contains(&entry.resource_type_name)
            {
                continue;
            }
            info!("collection driver: {}", entry.resource_type_name);
            renderer.render_collection(entry)?;
        }
        Ok(())
    }

    // Cache handling. The two cache files are independent: a run may mix a
    // cached feature registry with a freshly discovered collection
    // registry, or vice versa. Files are write-once — a file that already
    // exists is never overwritten.

    fn feature_cache_path(&self) -> PathBuf {
        self.config
            .output_path
            .join(format!("{}_FeatureDriverDatabase.json", self.config.root_schema))
    }

    fn collection_cache_path(&self) -> PathBuf {
        self.config
            .output_path
            .join(format!("{}_CollectionDriverDatabase.json", self.config.root_schema))
    }

    pub fn load_feature_cache(&mut self) {
        if !self.config.cache_database {
            return;
        }
        if let Some(entries) = read_cache::<ResourceEntry>(&self.feature_cache_path()) {
            info!("feature driver registry loaded from cache, walk skipped");
            self.features = Registry::from_entries(entries);
            self.feature_cache = CacheState::HitLoaded;
        }
    }

    pub fn load_collection_cache(&mut self) {
        if !self.config.cache_database {
            return;
        }
        if let Some(entries) = read_cache::<CollectionEntry>(&self.collection_cache_path()) {
            info!("collection driver registry loaded from cache");
            self.collections = Registry::from_entries(entries);
            self.collection_cache = CacheState::HitLoaded;
        }
    }

    pub fn write_feature_cache(&mut self) -> Result<()> {
        if self.write_cache(self.feature_cache, &self.feature_cache_path(), self.features.entries())? {
            self.feature_cache = CacheState::WrittenThisRun;
        }
        Ok(())
    }

    pub fn write_collection_cache(&mut self) -> Result<()> {
        if self.write_cache(
            self.collection_cache,
            &self.collection_cache_path(),
            self.collections.entries(),
        )? {
            self.collection_cache = CacheState::WrittenThisRun;
        }
        Ok(())
    }

    fn write_cache<T: Serialize>(&self, state: CacheState, path: &Path, entries: &[T]) -> Result<bool> {
        if !self.config.cache_database || state != CacheState::Miss || path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(entries)?)?;
        Ok(true)
    }
}

fn read_cache<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<Vec<T>> {
    if !path.exists() {
        return None;
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("unable to read cache {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(entries) => Some(entries),
        Err(e) => {
            warn!("cache {} is invalid, ignoring: {e}", path.display());
            None
        }
    }
}

/// Basename of a driver path, URI or filesystem path alike
fn driver_basename(driver_path: &str) -> String {
    if driver_path.contains("://") {
        driver_path
            .rsplit('/')
            .next()
            .unwrap_or(driver_path)
            .to_string()
    } else {
        Path::new(driver_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| driver_path.to_string())
    }
}

/// The property name a resource was discovered under: the last meaningful
/// segment of its discovery path, with the collection marker dropped
fn parent_property(dep_path: &str) -> String {
    dep_path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "{}")
        .last()
        .map(|segment| segment.replace("{}", ""))
        .unwrap_or_default()
}
