//! Tool registry with TTL-bounded discovery.
//!
//! The catalog is an immutable snapshot swapped wholesale on refresh. Refreshes
//! are serialized through a gate so only one discovery round-trip is in flight;
//! callers that queued behind a refresh reuse its outcome instead of starting
//! another.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use nlq_catalog::{Category, ToolDescriptor};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{DiscoveryError, InvokeError};
use crate::invoker::{RawTool, ToolInvoker};
use crate::options::{DEFAULT_DISCOVERY_RETRY, DEFAULT_DISCOVERY_TIMEOUT, DEFAULT_DISCOVERY_TTL, PipelineOptions};

/// One consistent view of the remote tool set.
#[derive(Debug)]
pub struct Catalog {
    tools: Vec<Arc<ToolDescriptor>>,
    index: BTreeMap<Category, Vec<usize>>,
    refreshed_at: DateTime<Utc>,
    loaded_at: Instant,
    skipped: Vec<String>,
}

impl Catalog {
    /// Parses a discovery listing. Tools with malformed schemas are skipped; a
    /// listing with no usable tools is an error.
    ///
    /// # Errors
    /// Returns `DiscoveryError` if the listing is empty or nothing in it parses.
    pub fn from_listing(listing: Vec<RawTool>, refreshed_at: DateTime<Utc>) -> Result<Self, DiscoveryError> {
        if listing.is_empty() {
            return Err(DiscoveryError::EmptyCatalog);
        }

        let mut seen = HashSet::new();
        let mut tools = Vec::with_capacity(listing.len());
        let mut skipped = Vec::new();
        let mut last_error = None;

        for raw in listing {
            if !seen.insert(raw.name.clone()) {
                warn!(tool = %raw.name, "duplicate tool in discovery listing; keeping the first");
                continue;
            }
            match ToolDescriptor::from_listing(&raw.name, &raw.description, &raw.input_schema, refreshed_at) {
                Ok(descriptor) => tools.push(descriptor),
                Err(err) => {
                    warn!(tool = %raw.name, error = %err, "skipping tool with malformed schema");
                    skipped.push(raw.name);
                    last_error = Some(err);
                }
            }
        }

        if tools.is_empty() {
            return Err(last_error.map_or(DiscoveryError::EmptyCatalog, DiscoveryError::from));
        }

        let mut catalog = Self::from_descriptors(tools);
        catalog.refreshed_at = refreshed_at;
        catalog.skipped = skipped;
        Ok(catalog)
    }

    /// Builds a catalog from already-parsed descriptors, preserving order.
    #[must_use]
    pub fn from_descriptors(tools: Vec<ToolDescriptor>) -> Self {
        let tools: Vec<Arc<ToolDescriptor>> = tools.into_iter().map(Arc::new).collect();
        let mut index: BTreeMap<Category, Vec<usize>> = BTreeMap::new();
        for (position, tool) in tools.iter().enumerate() {
            for category in &tool.categories {
                index.entry(*category).or_default().push(position);
            }
        }
        Self {
            tools,
            index,
            refreshed_at: Utc::now(),
            loaded_at: Instant::now(),
            skipped: Vec::new(),
        }
    }

    /// All tools in discovery order.
    #[must_use]
    pub fn tools(&self) -> &[Arc<ToolDescriptor>] {
        &self.tools
    }

    /// Tools assigned to `category`, in discovery order.
    #[must_use]
    pub fn category(&self, category: Category) -> Vec<Arc<ToolDescriptor>> {
        self.index
            .get(&category)
            .map(|positions| positions.iter().map(|&pos| self.tools[pos].clone()).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        self.tools.iter().find(|tool| tool.name == name).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[must_use]
    pub const fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.loaded_at.elapsed()
    }

    /// Names of listed tools dropped because their schema did not parse.
    #[must_use]
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    fn category_counts(&self) -> BTreeMap<Category, usize> {
        self.index
            .iter()
            .map(|(category, positions)| (*category, positions.len()))
            .collect()
    }
}

/// Point-in-time registry statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_tools: usize,
    pub categories: BTreeMap<Category, usize>,
    pub skipped_tools: Vec<String>,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub cache_age_secs: Option<u64>,
    pub ttl_secs: Option<u64>,
    pub discoveries: u64,
    pub last_error: Option<String>,
}

/// Discovery timing for a [`ToolRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum catalog age before rediscovery; `None` keeps a snapshot until a
    /// forced refresh.
    pub ttl: Option<Duration>,
    /// Upper bound on one discovery round-trip.
    pub discovery_timeout: Duration,
    /// How long a stale snapshot is served after a failed discovery before
    /// the next attempt.
    pub retry_after: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl: Some(DEFAULT_DISCOVERY_TTL),
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            retry_after: DEFAULT_DISCOVERY_RETRY,
        }
    }
}

impl RegistryConfig {
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub const fn with_discovery_timeout(mut self, discovery_timeout: Duration) -> Self {
        self.discovery_timeout = discovery_timeout;
        self
    }

    #[must_use]
    pub const fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }
}

impl From<&PipelineOptions> for RegistryConfig {
    fn from(options: &PipelineOptions) -> Self {
        Self {
            ttl: options.discovery_ttl,
            discovery_timeout: options.discovery_timeout,
            retry_after: options.discovery_retry,
        }
    }
}

/// Shared, cloneable handle to the tool catalog cache.
#[derive(Clone)]
pub struct ToolRegistry {
    inner: Arc<ToolRegistryInner>,
}

/// Internal registry state shared across clones.
struct ToolRegistryInner {
    invoker: Arc<dyn ToolInvoker>,
    config: RegistryConfig,
    snapshot: RwLock<Option<Arc<Catalog>>>,
    refresh_gate: Mutex<()>,
    completed: AtomicU64,
    last_error: StdMutex<Option<DiscoveryError>>,
    last_failure: StdMutex<Option<Instant>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new(invoker: Arc<dyn ToolInvoker>) -> Self {
        Self::with_config(invoker, RegistryConfig::default())
    }

    #[must_use]
    pub fn with_config(invoker: Arc<dyn ToolInvoker>, config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(ToolRegistryInner {
                invoker,
                config,
                snapshot: RwLock::new(None),
                refresh_gate: Mutex::new(()),
                completed: AtomicU64::new(0),
                last_error: StdMutex::new(None),
                last_failure: StdMutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> RegistryConfig {
        self.inner.config
    }

    /// The invoker this registry discovers through.
    #[must_use]
    pub fn invoker(&self) -> Arc<dyn ToolInvoker> {
        self.inner.invoker.clone()
    }

    /// Returns the current catalog, rediscovering when it is missing or stale.
    ///
    /// After a failed discovery the stale snapshot is served without another
    /// round-trip until `retry_after` has passed.
    ///
    /// # Errors
    /// Returns `DiscoveryError` only when discovery fails and no earlier
    /// snapshot exists.
    pub async fn get_tools(&self) -> Result<Arc<Catalog>, DiscoveryError> {
        if let Some(catalog) = self.fresh_snapshot().await {
            return Ok(catalog);
        }
        if let Some(stale) = self.backing_off().await {
            debug!(age_secs = stale.age().as_secs(), "discovery backing off; serving stale tool catalog");
            return Ok(stale);
        }

        let seen = self.inner.completed.load(Ordering::SeqCst);
        let _gate = self.inner.refresh_gate.lock().await;

        if let Some(catalog) = self.fresh_snapshot().await {
            return Ok(catalog);
        }
        if self.inner.completed.load(Ordering::SeqCst) != seen {
            // A refresh finished (and failed) while this caller was queued.
            return self.stale_or_last_error().await;
        }

        match self.discover_locked().await {
            Ok(catalog) => Ok(catalog),
            Err(err) => match self.current().await {
                Some(stale) => {
                    warn!(error = %err, age_secs = stale.age().as_secs(), "serving stale tool catalog");
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }

    /// Returns the tools assigned to one category.
    ///
    /// # Errors
    /// Returns `DiscoveryError` under the same conditions as [`Self::get_tools`].
    pub async fn get_category(&self, category: Category) -> Result<Vec<Arc<ToolDescriptor>>, DiscoveryError> {
        Ok(self.get_tools().await?.category(category))
    }

    /// Looks up a tool by name.
    ///
    /// # Errors
    /// Returns `DiscoveryError` under the same conditions as [`Self::get_tools`].
    pub async fn get_tool(&self, name: &str) -> Result<Option<Arc<ToolDescriptor>>, DiscoveryError> {
        Ok(self.get_tools().await?.get(name))
    }

    /// Forces a discovery round-trip regardless of snapshot age.
    ///
    /// A failed refresh leaves the previous snapshot in place.
    ///
    /// # Errors
    /// Returns `DiscoveryError` if this discovery fails.
    pub async fn refresh(&self) -> Result<(), DiscoveryError> {
        let _gate = self.inner.refresh_gate.lock().await;
        self.discover_locked().await.map(|_| ())
    }

    pub async fn stats(&self) -> RegistryStats {
        let snapshot = self.current().await;
        let last_error = self
            .inner
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(ToString::to_string);
        RegistryStats {
            total_tools: snapshot.as_ref().map_or(0, |catalog| catalog.len()),
            categories: snapshot
                .as_ref()
                .map(|catalog| catalog.category_counts())
                .unwrap_or_default(),
            skipped_tools: snapshot
                .as_ref()
                .map(|catalog| catalog.skipped().to_vec())
                .unwrap_or_default(),
            refreshed_at: snapshot.as_ref().map(|catalog| catalog.refreshed_at()),
            cache_age_secs: snapshot.as_ref().map(|catalog| catalog.age().as_secs()),
            ttl_secs: self.inner.config.ttl.map(|ttl| ttl.as_secs()),
            discoveries: self.inner.completed.load(Ordering::SeqCst),
            last_error,
        }
    }

    async fn current(&self) -> Option<Arc<Catalog>> {
        self.inner.snapshot.read().await.clone()
    }

    async fn fresh_snapshot(&self) -> Option<Arc<Catalog>> {
        let snapshot = self.current().await?;
        match self.inner.config.ttl {
            Some(ttl) if snapshot.age() >= ttl => None,
            _ => Some(snapshot),
        }
    }

    /// The stale snapshot, while the last failed discovery is still recent.
    async fn backing_off(&self) -> Option<Arc<Catalog>> {
        let failed_at = *self
            .inner
            .last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if failed_at?.elapsed() >= self.inner.config.retry_after {
            return None;
        }
        self.current().await
    }

    async fn stale_or_last_error(&self) -> Result<Arc<Catalog>, DiscoveryError> {
        if let Some(stale) = self.current().await {
            return Ok(stale);
        }
        let last_error = self
            .inner
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Err(last_error.unwrap_or(DiscoveryError::EmptyCatalog))
    }

    /// Runs one discovery. Callers must hold the refresh gate.
    async fn discover_locked(&self) -> Result<Arc<Catalog>, DiscoveryError> {
        debug!("discovering tools from remote server");
        let started = Instant::now();
        let timeout = self.inner.config.discovery_timeout;
        let outcome = match tokio::time::timeout(timeout, self.inner.invoker.list_tools()).await {
            Ok(Ok(listing)) => Catalog::from_listing(listing, Utc::now()),
            Ok(Err(err)) => Err(DiscoveryError::from(err)),
            Err(_) => Err(DiscoveryError::Unavailable(InvokeError::timeout(timeout))),
        };

        let result = match outcome {
            Ok(catalog) => {
                let catalog = Arc::new(catalog);
                *self.inner.snapshot.write().await = Some(catalog.clone());
                *self
                    .inner
                    .last_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = None;
                *self
                    .inner
                    .last_failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = None;
                info!(
                    tools = catalog.len(),
                    skipped = catalog.skipped().len(),
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "refreshed tool catalog"
                );
                Ok(catalog)
            }
            Err(err) => {
                warn!(error = %err, "tool discovery failed");
                *self
                    .inner
                    .last_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(err.clone());
                *self
                    .inner
                    .last_failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
                Err(err)
            }
        };
        self.inner.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}
