//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_QUERY__K=5`). Every setting has a
//! default, so an empty directory still yields a usable [`Settings`].

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::{DenseVectorField, IndexSchema, Similarity, MAX_DENSE_VECTOR_DIMS};

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
    env_name: String,
}

impl Config {
    /// Load configuration files from `dir`; relative data paths resolve against it.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment, base_dir: dir.to_path_buf(), env_name })
    }

    /// Wrap an already assembled figment, e.g. one built in a test.
    pub fn from_figment(figment: Figment, base_dir: &Path, env_name: &str) -> Self {
        Self { figment, base_dir: base_dir.to_path_buf(), env_name: env_name.to_string() }
    }

    /// Force `engine.kind` above every file and env layer. Validation in
    /// [`settings`](Self::settings) still applies to the result.
    #[must_use]
    pub fn with_engine_override(mut self, kind: EngineKind) -> Self {
        self.figment = self.figment.merge(Serialized::default("engine.kind", kind));
        self
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("failed to get '{key}': {e}")))
    }

    /// Extract, resolve and validate the typed settings.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.data.resolve(&self.base_dir);
        settings.validate()?;
        self.validate_for_env(&settings)?;
        Ok(settings)
    }

    fn validate_for_env(&self, settings: &Settings) -> Result<()> {
        match self.env_name.as_str() {
            "prod" | "production" => {
                if settings.engine.kind == EngineKind::Memory {
                    return Err(Error::InvalidConfig(
                        "the in-memory engine is not allowed in production".to_string(),
                    ));
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub index: IndexSettings,
    pub query: QuerySettings,
    pub data: DataSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.engine.url.trim().is_empty() && self.engine.kind == EngineKind::Elastic {
            return Err(Error::InvalidConfig("engine.url is required".to_string()));
        }
        if self.index.name.trim().is_empty() {
            return Err(Error::InvalidConfig("index.name is required".to_string()));
        }
        if self.query.k == 0 {
            return Err(Error::InvalidConfig("query.k must be at least 1".to_string()));
        }
        if self.query.num_candidates < self.query.k {
            return Err(Error::InvalidConfig(format!(
                "query.num_candidates ({}) must be >= query.k ({})",
                self.query.num_candidates, self.query.k
            )));
        }
        if self.query.concurrency == 0 {
            return Err(Error::InvalidConfig("query.concurrency must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Build the index schema described by `[index]`, checked against the engine limit.
    pub fn schema(&self) -> Result<IndexSchema> {
        let field = DenseVectorField {
            dimensions: self.index.dimensions,
            indexed: self.index.indexed,
            similarity: self.index.similarity,
        };
        IndexSchema::new(field, self.engine.max_dense_vector_dims)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Elastic,
    Memory,
}

impl FromStr for EngineKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "elastic" | "elasticsearch" => Ok(Self::Elastic),
            "memory" => Ok(Self::Memory),
            other => Err(Error::InvalidConfig(format!("unknown engine kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub kind: EngineKind,
    pub url: String,
    pub timeout_secs: u64,
    pub max_dense_vector_dims: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            kind: EngineKind::Elastic,
            url: "http://localhost:9200".to_string(),
            timeout_secs: 30,
            max_dense_vector_dims: MAX_DENSE_VECTOR_DIMS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub name: String,
    pub dimensions: usize,
    pub similarity: Similarity,
    pub indexed: bool,
    pub recreate: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            name: "knn-test".to_string(),
            dimensions: MAX_DENSE_VECTOR_DIMS,
            similarity: Similarity::Cosine,
            indexed: true,
            recreate: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub k: usize,
    pub num_candidates: usize,
    pub concurrency: usize,
    /// Force an index refresh between bulk load and the query loop.
    pub refresh_before_query: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self { k: 3, num_candidates: 3, concurrency: 4, refresh_before_query: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub embeddings: PathBuf,
    pub documents: PathBuf,
    pub queries: PathBuf,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            embeddings: PathBuf::from("data/embeddings.tsv"),
            documents: PathBuf::from("data/documents.tsv"),
            queries: PathBuf::from("data/queries.tsv"),
        }
    }
}

impl DataSettings {
    fn resolve(&mut self, base: &Path) {
        for p in [&mut self.embeddings, &mut self.documents, &mut self.queries] {
            let resolved = resolve_with_base(base, p.to_string_lossy());
            *p = resolved;
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
