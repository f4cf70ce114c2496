//! Redfish Feature Driver Generator
//!
//! Converts versioned Redfish JSON resource schemas into EDK2 feature and
//! collection driver source code, by resolving the schema reference graph
//! rooted at one entry document, classifying every reachable resource,
//! extracting typed property descriptors, and splicing synthesized code
//! fragments into boilerplate driver templates.
//!
//! ## Pipeline
//!
//! ```text
//! config.json ──► GeneratorConfig
//!                      │
//! schema corpus ──► CorpusSource ──► ResourceGraphResolver
//!                                       │  walk + registries
//!                                       ├─► PropertyCodeSynthesizer
//!                                       │      consume/provision fragments
//!                                       └─► TemplateRenderer
//!                                              output/RedfishFeatureDrivers/
//! ```
//!
//! The resolver drives everything: it walks references breadth-first,
//! deduplicates discoveries into the feature and collection registries
//! (optionally short-circuited by per-registry cache files), then
//! synthesizes and renders one driver artifact set per entry.

pub mod config;
pub mod error;
pub mod parser;
pub mod render;
pub mod resolver;
pub mod source;
pub mod synth;

pub use config::GeneratorConfig;
pub use error::{GeneratorError, Result};
pub use resolver::{CollectionEntry, ResourceEntry, ResourceGraphResolver};
pub use source::{CorpusSource, SchemaSource};
pub use synth::{CodeFragmentBundle, PropertyCodeSynthesizer};

use std::fs;

/// Run the full generation pipeline for one configuration
pub fn run(config: &GeneratorConfig) -> Result<()> {
    fs::create_dir_all(&config.output_path)?;
    let files = config.input_files()?;
    let source = CorpusSource::new(config, &files)?;
    let mut resolver = ResourceGraphResolver::new(config, &source);
    resolver.run()
}
