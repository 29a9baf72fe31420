pub mod backend;
pub mod cache;
pub mod file;
pub mod http;
pub mod memory;

use std::{fmt, path::PathBuf, str::FromStr, sync::Arc};

pub use backend::Backend;
use cache::Cache;
use ensemble_scenario::{CapabilityRef, ComponentRef, ReportError};
pub use file::FileBackend;
pub use http::{HttpBackend, HttpBackendOptions};
pub use memory::MemoryBackend;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use url::Url;

#[derive(Debug, thiserror::Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("response body from `{url}` exceeds max size {max_bytes} bytes (got {size} bytes)")]
    #[diagnostic(code(registry::response_too_large))]
    ResponseTooLarge {
        url: Url,
        size: u64,
        max_bytes: usize,
    },
    #[error("unexpected response from `{url}`: {message}")]
    #[diagnostic(code(registry::unexpected_response))]
    UnexpectedResponse { url: Url, message: String },
    #[error("{count} resources match {capability} in environment `{environment}`")]
    #[diagnostic(
        code(registry::ambiguous_capability),
        help("A capability must be produced exactly once per environment.")
    )]
    AmbiguousCapability {
        capability: CapabilityRef,
        environment: String,
        count: usize,
    },
    #[error("`{url}` cannot be used as a registry base URL")]
    #[diagnostic(code(registry::invalid_base_url))]
    InvalidBaseUrl { url: Url },
    #[error("invalid environment report `{path}`")]
    #[diagnostic(code(registry::invalid_report))]
    InvalidReport {
        path: PathBuf,
        #[source]
        source: ReportError,
    },
    #[error("http error: {0}")]
    #[diagnostic(code(registry::http_error))]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    #[diagnostic(code(registry::io_error))]
    Io(#[from] std::io::Error),
}

/// A capability as recorded by whoever produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityValue {
    pub capability: CapabilityRef,
    pub environment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<ComponentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Json>,
}

/// Where a registry backend reads from, as written on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrySource {
    /// An environment report written by a previous compile.
    File(PathBuf),
    /// A PuppetDB-compatible resource query endpoint.
    Http(Url),
}

impl FromStr for RegistrySource {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.starts_with("http://") || input.starts_with("https://") {
            return Url::parse(input)
                .map(RegistrySource::Http)
                .map_err(|err| format!("invalid registry URL `{input}`: {err}"));
        }
        let path = input.strip_prefix("file:").unwrap_or(input);
        if path.is_empty() {
            return Err("registry path must not be empty".to_string());
        }
        Ok(RegistrySource::File(PathBuf::from(path)))
    }
}

impl fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrySource::File(path) => write!(f, "file:{}", path.display()),
            RegistrySource::Http(url) => write!(f, "{url}"),
        }
    }
}

#[derive(Clone)]
struct NamedBackend {
    name: Arc<str>,
    backend: Arc<dyn Backend>,
}

/// An ordered chain of backends. The first backend that knows a capability answers; a backend
/// error ends the lookup. Answers are cached per environment and capability.
#[derive(Clone, Default)]
pub struct Registry {
    backends: Vec<NamedBackend>,
    cache: Cache,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field(
                "backends",
                &self.backends.iter().map(|b| &*b.name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Return a new registry that consults `backend` after the existing ones.
    pub fn with_backend(&self, name: impl Into<Arc<str>>, backend: Arc<dyn Backend>) -> Self {
        let mut backends = self.backends.clone();
        backends.push(NamedBackend {
            name: name.into(),
            backend,
        });
        Self {
            backends,
            cache: self.cache.clone(),
        }
    }

    pub fn from_sources<'a>(
        sources: impl IntoIterator<Item = &'a RegistrySource>,
        http_options: &HttpBackendOptions,
    ) -> Self {
        Self::new().with_sources(sources, http_options)
    }

    /// Return a new registry that consults `sources`, in order, after the existing backends.
    pub fn with_sources<'a>(
        &self,
        sources: impl IntoIterator<Item = &'a RegistrySource>,
        http_options: &HttpBackendOptions,
    ) -> Self {
        sources.into_iter().fold(self.clone(), |registry, source| {
            let backend: Arc<dyn Backend> = match source {
                RegistrySource::File(path) => Arc::new(FileBackend::new(path.clone())),
                RegistrySource::Http(url) => {
                    Arc::new(HttpBackend::with_options(url.clone(), http_options.clone()))
                }
            };
            registry.with_backend(source.to_string(), backend)
        })
    }

    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.backends.iter().map(|b| &*b.name)
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub async fn find(
        &self,
        environment: &str,
        capability: &CapabilityRef,
    ) -> Result<Option<CapabilityValue>, Error> {
        if let Some(value) = self.cache.get(environment, capability) {
            tracing::trace!(%capability, environment, "registry cache hit");
            return Ok(Some(value));
        }

        for entry in &self.backends {
            tracing::debug!(%capability, environment, backend = %entry.name, "registry lookup");
            if let Some(value) = entry.backend.find(environment, capability).await? {
                self.cache.put(environment, capability, value.clone());
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}
