use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::corpus::{CorpusBuilder, SearchIndex};
use super::types::{SearchFilters, SearchResult};
use crate::catalog::CatalogSource;

pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// Shared result of one build, handed to every waiter
type BuildOutcome = Result<Arc<SearchIndex>, Arc<anyhow::Error>>;

#[derive(Debug)]
struct InFlight {
    generation: u64,
    rx: watch::Receiver<Option<BuildOutcome>>,
}

#[derive(Debug, Default)]
struct CacheState {
    index: Option<Arc<SearchIndex>>,
    built_at: Option<Instant>,
    built_at_utc: Option<DateTime<Utc>>,
    /// Bumped by every invalidation
    generation: u64,
    in_flight: Option<InFlight>,
    last_build_ms: Option<u64>,
    last_error: Option<String>,
}

impl CacheState {
    fn fresh_index(&self, ttl: Duration) -> Option<Arc<SearchIndex>> {
        match (&self.index, self.built_at) {
            (Some(index), Some(built_at)) if built_at.elapsed() < ttl => Some(Arc::clone(index)),
            _ => None,
        }
    }

    /// Receiver for a live build that will install into the current generation
    fn current_build(&self) -> Option<watch::Receiver<Option<BuildOutcome>>> {
        self.in_flight
            .as_ref()
            .filter(|f| f.generation == self.generation && !f.is_abandoned())
            .map(|f| f.rx.clone())
    }

    /// Forget a build whose task went away without reporting
    fn clear_abandoned(&mut self) {
        if self.in_flight.as_ref().is_some_and(InFlight::is_abandoned) {
            warn!("Search index build was abandoned, a new one will start");
            self.in_flight = None;
        }
    }
}

impl InFlight {
    /// The sender is gone and no outcome was ever published
    fn is_abandoned(&self) -> bool {
        self.rx.has_changed().is_err() && self.rx.borrow().is_none()
    }
}

#[derive(Debug)]
struct CacheInner {
    builder: CorpusBuilder,
    ttl: Duration,
    state: Mutex<CacheState>,
    build_count: AtomicU64,
}

impl CacheInner {
    fn finish_build(&self, generation: u64, outcome: &BuildOutcome, elapsed: Duration) {
        let mut state = self.state.lock();

        if state
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == generation)
        {
            state.in_flight = None;
        }

        // Superseded builds never touch the reported state
        if generation != state.generation {
            match outcome {
                Ok(_) => debug!(
                    "Discarding search index from generation {} (now {})",
                    generation, state.generation
                ),
                Err(e) => warn!(
                    "Superseded search index build (generation {}) failed: {:#}",
                    generation, e
                ),
            }
            return;
        }

        state.last_build_ms = Some(elapsed.as_millis() as u64);
        match outcome {
            Ok(index) => {
                state.index = Some(Arc::clone(index));
                state.built_at = Some(Instant::now());
                state.built_at_utc = Some(Utc::now());
                state.last_error = None;
            }
            Err(e) => {
                error!("Search index build failed: {:#}", e);
                state.last_error = Some(format!("{e:#}"));
            }
        }
    }
}

/// Snapshot of the cache for status endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    /// A fresh corpus is held
    pub ready: bool,
    pub building: bool,
    pub item_count: usize,
    pub built_at: Option<DateTime<Utc>>,
    pub build_count: u64,
    pub last_build_ms: Option<u64>,
    pub last_error: Option<String>,
    pub ttl_secs: u64,
}

/// Lazily built, TTL-bounded search corpus with single-flight rebuilds.
///
/// Cloning is cheap and every clone shares the same state. Concurrent
/// callers arriving while a build is running all wait on that one build.
#[derive(Debug, Clone)]
pub struct IndexCache {
    inner: Arc<CacheInner>,
}

impl IndexCache {
    pub fn new(source: Arc<dyn CatalogSource>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                builder: CorpusBuilder::new(source),
                ttl,
                state: Mutex::new(CacheState::default()),
                build_count: AtomicU64::new(0),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Return the current corpus, building it first when missing or expired.
    ///
    /// A build whose task disappears without reporting (its runtime shut
    /// down) is dropped and a fresh one is started once.
    pub async fn get_index(&self) -> Result<Arc<SearchIndex>> {
        for attempt in 0..2 {
            let mut rx = {
                let mut state = self.inner.state.lock();
                if let Some(index) = state.fresh_index(self.inner.ttl) {
                    return Ok(index);
                }
                state.clear_abandoned();
                match state.current_build() {
                    Some(rx) => {
                        debug!("Joining in-flight search index build");
                        rx
                    }
                    None => self.start_build(&mut state),
                }
            };

            let outcome = match rx.wait_for(Option::is_some).await {
                Ok(value) => value.clone(),
                Err(_) => {
                    debug!("Search index build abandoned (attempt {})", attempt + 1);
                    continue;
                }
            };

            return match outcome {
                Some(Ok(index)) => Ok(index),
                Some(Err(e)) => Err(anyhow!("Search index build failed: {e:#}")),
                None => Err(anyhow!("Search index build finished without a result")),
            };
        }

        Err(anyhow!("Search index build was abandoned"))
    }

    /// Drop the corpus and start a background rebuild.
    ///
    /// Never blocks. A build already running for an older generation still
    /// finishes but its corpus is discarded.
    pub fn invalidate(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        state.index = None;
        state.built_at = None;
        info!("Search index invalidated (generation {})", state.generation);

        if Handle::try_current().is_ok() {
            self.start_build(&mut state);
        } else {
            warn!("No async runtime, search index will rebuild on the next query");
        }
    }

    /// Start a build unless a fresh corpus or a current build exists
    pub fn warm(&self) {
        let mut state = self.inner.state.lock();
        state.clear_abandoned();
        if state.fresh_index(self.inner.ttl).is_some() || state.current_build().is_some() {
            return;
        }
        if Handle::try_current().is_err() {
            warn!("No async runtime, cannot warm search index");
            return;
        }
        info!("Warming search index");
        self.start_build(&mut state);
    }

    pub fn status(&self) -> IndexStatus {
        let state = self.inner.state.lock();
        let fresh = state.fresh_index(self.inner.ttl);
        IndexStatus {
            ready: fresh.is_some(),
            building: state.in_flight.as_ref().is_some_and(|f| !f.is_abandoned()),
            item_count: state.index.as_ref().map_or(0, |index| index.len()),
            built_at: state.built_at_utc.filter(|_| state.index.is_some()),
            build_count: self.inner.build_count.load(Ordering::Relaxed),
            last_build_ms: state.last_build_ms,
            last_error: state.last_error.clone(),
            ttl_secs: self.inner.ttl.as_secs(),
        }
    }

    /// Fetch the corpus and run a query against it
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let index = self.get_index().await?;
        Ok(super::query::search(&index, query, filters, limit))
    }

    /// Must be called with the state lock held and inside a runtime
    fn start_build(&self, state: &mut CacheState) -> watch::Receiver<Option<BuildOutcome>> {
        let (tx, rx) = watch::channel(None);
        let generation = state.generation;
        state.in_flight = Some(InFlight {
            generation,
            rx: rx.clone(),
        });
        let count = self.inner.build_count.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Starting search index build #{} (generation {})", count, generation);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let started = Instant::now();
            let builder = inner.builder.clone();

            // A nested task turns a panicking build into an error for the waiters
            let outcome: BuildOutcome = match tokio::spawn(async move { builder.build().await }).await {
                Ok(Ok(index)) => Ok(Arc::new(index)),
                Ok(Err(e)) => Err(Arc::new(e)),
                Err(e) => Err(Arc::new(anyhow!("Search index build task failed: {e}"))),
            };

            inner.finish_build(generation, &outcome, started.elapsed());
            // Nobody waiting is fine
            let _ = tx.send(Some(outcome));
        });

        rx
    }
}
