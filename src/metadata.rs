//! Best-effort placement metadata
//!
//! Resolves the availability zone and cluster name once per process.
//! The zone comes from the instance metadata endpoint; the cluster name
//! comes from the first non-empty candidate environment variable. A
//! network error or timeout resolves both values to `"local"`; any HTTP
//! reply counts as an answer. Whatever is resolved first is kept for the
//! process lifetime.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::CLUSTER_ENV_CANDIDATES;

/// Value used for zone and cluster when the lookup fails
pub const FALLBACK_VALUE: &str = "local";

/// Cluster name when the lookup succeeds but no candidate variable is set
pub const UNKNOWN_CLUSTER: &str = "unknown";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata request failed: {0}")]
    Http(String),

    #[error("metadata lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Where a resolved placement came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementSource {
    Imds,
    Fallback,
}

impl PlacementSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementSource::Imds => "imds",
            PlacementSource::Fallback => "fallback",
        }
    }
}

/// Resolved zone and cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub zone: String,
    pub cluster: String,
    pub source: PlacementSource,
}

impl Placement {
    fn fallback() -> Self {
        Placement {
            zone: FALLBACK_VALUE.to_string(),
            cluster: FALLBACK_VALUE.to_string(),
            source: PlacementSource::Fallback,
        }
    }
}

/// Shared, set-once placement cache
///
/// Cloned into the request pipeline; written exactly once by
/// [`MetadataFetcher`]. Until then `get()` returns `None`.
#[derive(Debug, Clone, Default)]
pub struct MetadataCache {
    cell: Arc<OnceCell<Placement>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved placement, if the fetch has completed
    pub fn get(&self) -> Option<&Placement> {
        self.cell.get()
    }

    pub fn is_fetched(&self) -> bool {
        self.cell.initialized()
    }

    /// Cache that is already resolved (test fixtures, static deployments)
    pub fn resolved(placement: Placement) -> Self {
        Self {
            cell: Arc::new(OnceCell::new_with(Some(placement))),
        }
    }
}

/// Source of the availability zone
///
/// Production code uses `HttpZoneLookup` against the metadata endpoint.
/// Tests substitute in-memory lookups.
#[async_trait]
pub trait ZoneLookup: Send + Sync {
    async fn availability_zone(&self) -> Result<String, MetadataError>;
}

/// Zone lookup over plain HTTP
///
/// The trimmed body is the zone whatever the status code.
pub struct HttpZoneLookup {
    client: reqwest::Client,
    url: String,
}

impl HttpZoneLookup {
    pub fn new(url: impl Into<String>) -> Result<Self, MetadataError> {
        // Link-local endpoint; a configured HTTP proxy must not intercept it
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| MetadataError::Http(e.to_string()))?;

        Ok(HttpZoneLookup {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ZoneLookup for HttpZoneLookup {
    async fn availability_zone(&self) -> Result<String, MetadataError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| MetadataError::Http(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| MetadataError::Http(e.to_string()))?;

        Ok(body.trim().to_string())
    }
}

/// Resolve the cluster name from candidate variables, first non-empty wins
pub fn resolve_cluster<F>(candidates: &[&str], lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    candidates
        .iter()
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| UNKNOWN_CLUSTER.to_string())
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// One-shot placement resolver
pub struct MetadataFetcher {
    cache: MetadataCache,
    lookup: Arc<dyn ZoneLookup>,
    timeout: Duration,
    env: EnvLookup,
}

impl MetadataFetcher {
    /// Create a fetcher that fills `cache` using `lookup`
    ///
    /// The cluster name is read from the process environment.
    pub fn new(cache: MetadataCache, lookup: impl ZoneLookup + 'static, timeout: Duration) -> Self {
        MetadataFetcher {
            cache,
            lookup: Arc::new(lookup),
            timeout,
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Replace the environment lookup used for the cluster name
    pub fn with_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(env);
        self
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Resolve placement, performing at most one lookup per cache
    ///
    /// Concurrent callers wait on the same in-flight lookup. Once resolved,
    /// every call returns the cached value without I/O.
    pub async fn fetch(&self) -> Placement {
        self.cache.cell.get_or_init(|| self.resolve()).await.clone()
    }

    async fn resolve(&self) -> Placement {
        let outcome = match tokio::time::timeout(self.timeout, self.lookup.availability_zone()).await
        {
            Ok(result) => result,
            Err(_) => Err(MetadataError::Timeout(self.timeout)),
        };

        let placement = match outcome {
            Ok(zone) => Placement {
                zone,
                cluster: resolve_cluster(&CLUSTER_ENV_CANDIDATES, |name| (self.env)(name)),
                source: PlacementSource::Imds,
            },
            Err(e) => {
                debug!(error = %e, "Placement lookup failed, using fallback values");
                Placement::fallback()
            }
        };

        info!(
            zone = %placement.zone,
            cluster = %placement.cluster,
            source = placement.source.as_str(),
            fetched = true,
            "Placement metadata loaded"
        );

        placement
    }
}

#[cfg(test)]
#[path = "metadata_test.rs"]
mod tests;
