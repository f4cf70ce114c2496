//! Schema document loading
//!
//! Documents are pulled on demand during the graph walk: local corpus files
//! are read directly, everything else goes out over HTTP with an on-disk
//! response cache. Every failure degrades to `None` — the walk treats an
//! unloadable document as "nothing to do here", never as fatal.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::GeneratorConfig;
use crate::error::Result;

/// Seconds before an outbound fetch is abandoned
const FETCH_TIMEOUT_SECS: u64 = 4;

/// Synthetic grouping URI that is never a real resource; loading it must
/// always yield nothing, without attempting I/O
const ODATA_SENTINEL: &str = "odata.json";

/// Capability for loading schema documents by path or URI.
///
/// The resolver and synthesizer only ever see this trait; tests stub it
/// with an in-memory corpus.
pub trait SchemaSource {
    /// Load a schema document. `None` means the reference is unresolvable
    /// and the caller should skip it.
    fn load(&self, target: &str) -> Option<Value>;

    /// Map a path or URI onto a known local input file, if any.
    fn local_path(&self, target: &str) -> Option<PathBuf>;
}

/// The production source: local-corpus-first with HTTP fallback
pub struct CorpusSource {
    root: PathBuf,
    files: HashSet<PathBuf>,
    cache_dir: PathBuf,
    client: reqwest::blocking::Client,
}

impl CorpusSource {
    pub fn new(config: &GeneratorConfig, files: &[PathBuf]) -> Result<Self> {
        let mut builder =
            reqwest::blocking::Client::builder().timeout(Duration::from_secs(FETCH_TIMEOUT_SECS));

        if !config.proxy_host.is_empty() {
            let proxy_uri = if config.proxy_port.is_empty() {
                config.proxy_host.clone()
            } else {
                format!("{}:{}", config.proxy_host, config.proxy_port)
            };
            builder = builder.proxy(reqwest::Proxy::http(proxy_uri.as_str())?);
        }

        Ok(Self {
            root: config.import_from.clone(),
            files: files.iter().cloned().collect(),
            cache_dir: config.output_path.join("HttpCache"),
            client: builder.build()?,
        })
    }

    fn fetch(&self, uri: &str) -> Option<Value> {
        let uri = if uri.contains("://") {
            uri.to_string()
        } else {
            format!("http://{uri}")
        };

        // Read-before-fetch cache, keyed by the final URI path segment.
        // Entries are never invalidated; stale data is an accepted tradeoff.
        let cache_key = uri.rsplit('/').next().unwrap_or(&uri).to_string();
        let cache_path = self.cache_dir.join(&cache_key);
        if cache_path.exists() {
            match fs::read_to_string(&cache_path) {
                Ok(text) => match serde_json::from_str(&text) {
                    Ok(json) => return Some(json),
                    Err(e) => warn!("cached response {} is invalid JSON: {e}", cache_path.display()),
                },
                Err(e) => warn!("unable to read cache file {}: {e}", cache_path.display()),
            }
        }

        debug!("fetching {uri}");
        let text = match self.client.get(&uri).send().and_then(|r| r.error_for_status()) {
            Ok(response) => match response.text() {
                Ok(text) => text,
                Err(e) => {
                    warn!("unable to retrieve data from '{uri}': {e}");
                    return None;
                }
            },
            Err(e) => {
                warn!("unable to retrieve data from '{uri}': {e}");
                return None;
            }
        };

        let json: Value = match serde_json::from_str(&text) {
            Ok(json) => json,
            Err(e) => {
                warn!("response from '{uri}' is not JSON: {e}");
                return None;
            }
        };

        if fs::create_dir_all(&self.cache_dir).is_ok() {
            if let Err(e) = fs::write(&cache_path, &text) {
                warn!("unable to cache response for '{uri}': {e}");
            }
        }

        Some(json)
    }

    fn read_local(&self, path: &Path) -> Option<Value> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!("unable to read {}: {e}", path.display());
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!("unable to parse {}: {e}", path.display());
                None
            }
        }
    }
}

impl SchemaSource for CorpusSource {
    fn load(&self, target: &str) -> Option<Value> {
        if target.contains(ODATA_SENTINEL) {
            return None;
        }

        if let Some(local) = self.local_path(target) {
            debug!("load {} from local corpus", local.display());
            return self.read_local(&local);
        }

        self.fetch(target)
    }

    fn local_path(&self, target: &str) -> Option<PathBuf> {
        let candidate = if target.contains("://") {
            // A URI whose basename matches a corpus file is served locally
            let fname = target.rsplit('/').next()?;
            self.root.join(fname)
        } else {
            PathBuf::from(target)
        };

        if self.files.contains(&candidate) {
            Some(candidate)
        } else {
            None
        }
    }
}

/// In-memory source shared by the crate's unit tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct StubSource {
        pub docs: HashMap<String, Value>,
        pub locals: HashSet<String>,
        pub load_count: Cell<usize>,
    }

    impl StubSource {
        pub fn insert(&mut self, target: &str, doc: Value) {
            self.docs.insert(target.to_string(), doc);
        }

        pub fn insert_local(&mut self, target: &str, doc: Value) {
            self.locals.insert(target.to_string());
            self.docs.insert(target.to_string(), doc);
        }
    }

    impl SchemaSource for StubSource {
        fn load(&self, target: &str) -> Option<Value> {
            if target.contains(ODATA_SENTINEL) {
                return None;
            }
            self.load_count.set(self.load_count.get() + 1);
            self.docs.get(target).cloned()
        }

        fn local_path(&self, target: &str) -> Option<PathBuf> {
            if self.locals.contains(target) {
                Some(PathBuf::from(target))
            } else {
                None
            }
        }
    }
}
