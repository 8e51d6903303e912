//! The worker lifecycle controller.
//!
//! One [`WorkerController`] exists per worker instance. The hosting runtime
//! calls [`install`](WorkerController::install) when a new script is found,
//! [`activate`](WorkerController::activate) when there is no previous
//! controller to wait for, [`handle_fetch`](WorkerController::handle_fetch)
//! for every intercepted request and
//! [`handle_message`](WorkerController::handle_message) for page messages.
//!
//! All methods take `&self`; concurrent fetches may race on the same cache
//! key and the last write wins. Activation runs at most once and is
//! serialized: a `SKIP_WAITING` arriving mid-activation waits for it before
//! broadcasting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use ft_common::{
    ClientMessage, Clock, SystemClock, VersionDescriptor, WorkerMessage, with_cache_bust,
};
use reqwest::Url;

use crate::cache::{CacheGeneration, CacheNames, CacheStorage};
use crate::config::WorkerConfig;
use crate::error::{NetworkError, Result, WorkerError};
use crate::host::WorkerHost;
use crate::http::{Request, Response};
use crate::lifecycle::{WorkerState, transition};
use crate::network::Network;
use crate::router::{RouteDecision, Router, Strategy};

/// Result of handling an intercepted fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The worker answered the request.
    Respond(Response),
    /// The worker did not intercept; the page talks to the network itself.
    Passthrough,
}

impl FetchOutcome {
    /// The response, if the worker answered.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Respond(response) => Some(response),
            Self::Passthrough => None,
        }
    }
}

/// What install managed to precache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Shell paths now in the static generation.
    pub precached: Vec<String>,
    /// Shell paths that could not be fetched or stored.
    pub skipped: Vec<String>,
}

/// What activation cleaned up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Stale caches that were deleted.
    pub deleted_caches: Vec<String>,
    /// Whether the runtime generation was recreated empty.
    pub runtime_reset: bool,
}

/// Owned state of one worker instance.
pub struct WorkerController {
    config: WorkerConfig,
    origin: Url,
    names: CacheNames,
    router: Router,
    bypassed: bool,
    caches: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    host: Arc<dyn WorkerHost>,
    clock: Arc<dyn Clock>,
    state: Mutex<WorkerState>,
    skip_requested: AtomicBool,
    activation: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for WorkerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerController")
            .field("origin", &self.origin.as_str())
            .field("names", &self.names)
            .field("bypassed", &self.bypassed)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl WorkerController {
    /// Create a controller in the [`WorkerState::Parsed`] state.
    pub fn new(
        config: WorkerConfig,
        caches: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        host: Arc<dyn WorkerHost>,
    ) -> Result<Self> {
        config.validate()?;
        let origin = config.origin_url()?;
        let router = Router::from_config(&config)?;

        Ok(Self {
            names: config.cache_names(),
            bypassed: config.is_bypassed(),
            config,
            origin,
            router,
            caches,
            network,
            host,
            clock: Arc::new(SystemClock),
            state: Mutex::new(WorkerState::Parsed),
            skip_requested: AtomicBool::new(false),
            activation: tokio::sync::Mutex::new(()),
        })
    }

    /// Use a different clock for cache-busting tokens.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The two current cache names.
    #[must_use]
    pub fn cache_names(&self) -> &CacheNames {
        &self.names
    }

    /// The configuration this worker was built with.
    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// The routing table.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    fn advance(&self, to: WorkerState) -> Result<WorkerState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        transition(&mut state, to)
    }

    /// Run the install step: precache the shell manifest, best effort.
    ///
    /// Individual failures are logged and skipped; install itself only fails
    /// on an illegal state transition. If a page already asked this worker
    /// to skip waiting, activation follows immediately.
    pub async fn install(&self) -> Result<InstallReport> {
        self.advance(WorkerState::Installing)?;
        let mut report = InstallReport::default();

        if self.bypassed {
            tracing::info!("Development host detected, skipping shell precache");
        } else {
            report = self.precache_shell().await;
            tracing::info!(
                "Installed worker ({} of {} shell entries precached)",
                report.precached.len(),
                self.config.shell_manifest.len()
            );
        }

        self.advance(WorkerState::Installed)?;

        if self.skip_requested.swap(false, Ordering::SeqCst) {
            tracing::info!("Skip waiting was requested during install");
            self.release_and_announce().await?;
        }

        Ok(report)
    }

    async fn precache_shell(&self) -> InstallReport {
        let static_cache = self.names.name(CacheGeneration::Static);
        if let Err(err) = self.caches.open(static_cache).await {
            tracing::warn!("Failed to open {}: {}", static_cache, err);
        }

        let token = self.config.build_stamp().cache_bust_token(self.clock.now());
        let mut report = InstallReport::default();

        for path in &self.config.shell_manifest {
            let target = if *path == self.config.version_path {
                with_cache_bust(path, &token)
            } else {
                path.clone()
            };

            let stored = match self.origin.join(&target) {
                Ok(url) => {
                    let mut request = Request::get(url);
                    if *path == self.config.version_path {
                        request = request.no_store();
                    }
                    self.fetch_into(&request, CacheGeneration::Static, path).await
                }
                Err(err) => {
                    tracing::warn!("Skipping shell entry {}: {}", path, err);
                    false
                }
            };

            if stored {
                report.precached.push(path.clone());
            } else {
                report.skipped.push(path.clone());
            }
        }

        report
    }

    /// Fetch `request` and store a 2xx answer under `key`. Returns whether an
    /// entry was stored.
    async fn fetch_into(&self, request: &Request, generation: CacheGeneration, key: &str) -> bool {
        match self.network.fetch(request).await {
            Ok(response) if response.is_ok() => self.store(generation, key, response).await,
            Ok(response) => {
                tracing::warn!("Precache of {} returned HTTP {}", key, response.status);
                false
            }
            Err(err) => {
                tracing::warn!("Precache of {} failed: {}", key, err);
                false
            }
        }
    }

    /// Run the activate step: drop stale generations, reset the runtime
    /// generation, then claim every open page.
    pub async fn activate(&self) -> Result<ActivationReport> {
        let _activation = self.activation.lock().await;
        self.activate_locked().await
    }

    /// Activation body; callers hold `self.activation`.
    async fn activate_locked(&self) -> Result<ActivationReport> {
        self.advance(WorkerState::Activating)?;
        let mut report = ActivationReport::default();

        if self.bypassed {
            tracing::info!("Development host detected, skipping cache cleanup");
        } else {
            report.deleted_caches = self.delete_stale_caches().await;
            report.runtime_reset = self.reset_runtime_cache().await;
        }

        self.host.claim_clients().await;
        self.advance(WorkerState::Activated)?;
        tracing::info!(
            "Activated worker {} ({} stale caches removed)",
            self.names.name(CacheGeneration::Static),
            report.deleted_caches.len()
        );
        Ok(report)
    }

    async fn delete_stale_caches(&self) -> Vec<String> {
        let existing = match self.caches.keys().await {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!("Failed to list caches: {}", err);
                return Vec::new();
            }
        };

        let mut deleted = Vec::new();
        for name in existing.into_iter().filter(|n| !self.names.is_current(n)) {
            match self.caches.delete(&name).await {
                Ok(_) => {
                    tracing::info!("Deleted stale cache {}", name);
                    deleted.push(name);
                }
                Err(err) => tracing::warn!("Failed to delete stale cache {}: {}", name, err),
            }
        }
        deleted
    }

    async fn reset_runtime_cache(&self) -> bool {
        let runtime = self.names.name(CacheGeneration::Runtime);
        if let Err(err) = self.caches.delete(runtime).await {
            tracing::warn!("Failed to delete {}: {}", runtime, err);
            return false;
        }
        match self.caches.open(runtime).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("Failed to recreate {}: {}", runtime, err);
                false
            }
        }
    }

    /// Decode and handle a raw page message. Unknown kinds are ignored.
    pub async fn handle_raw_message(&self, raw: &str) -> Result<usize> {
        match ClientMessage::from_json(raw) {
            Ok(message) => self.handle_message(message).await,
            Err(err) => {
                tracing::debug!("Ignoring unrecognised page message: {}", err);
                Ok(0)
            }
        }
    }

    /// Handle a page message. Returns how many pages were told to reload.
    pub async fn handle_message(&self, message: ClientMessage) -> Result<usize> {
        match message {
            ClientMessage::SkipWaiting => {
                tracing::info!("SKIP_WAITING received in state {}", self.state());
                match self.state() {
                    WorkerState::Parsed | WorkerState::Installing => {
                        self.skip_requested.store(true, Ordering::SeqCst);
                        Ok(0)
                    }
                    WorkerState::Redundant => Ok(0),
                    _ => self.release_and_announce().await,
                }
            }
        }
    }

    /// Activate if still waiting, then tell every page to reload. The
    /// broadcast always follows activation-time cleanup, including one
    /// started elsewhere.
    async fn release_and_announce(&self) -> Result<usize> {
        self.host.skip_waiting().await;
        {
            let _activation = self.activation.lock().await;
            if self.state().is_waiting() {
                self.activate_locked().await?;
            }
        }

        let version = self.fetch_fresh_descriptor().await;
        let recipients = self
            .host
            .broadcast(&WorkerMessage::ReloadRequired { version })
            .await;
        tracing::info!("Broadcast RELOAD_REQUIRED to {} page(s)", recipients);
        Ok(recipients)
    }

    async fn fetch_fresh_descriptor(&self) -> Option<VersionDescriptor> {
        let token = self.clock.now_millis().to_string();
        let url = self
            .origin
            .join(&with_cache_bust(&self.config.version_path, &token))
            .ok()?;

        match self.network.fetch(&Request::get(url).no_store()).await {
            Ok(response) if response.is_ok() => match response.json::<VersionDescriptor>() {
                Ok(descriptor) => Some(descriptor),
                Err(err) => {
                    tracing::debug!("Version descriptor is not valid JSON: {}", err);
                    None
                }
            },
            Ok(response) => {
                tracing::debug!("Version descriptor returned HTTP {}", response.status);
                None
            }
            Err(err) => {
                tracing::debug!("Version descriptor fetch failed: {}", err);
                None
            }
        }
    }

    /// Answer an intercepted request.
    ///
    /// Only the version descriptor route can fail: when the network is down
    /// and no copy is cached, the network error is propagated to the page.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome> {
        let route = match self.router.resolve(request) {
            RouteDecision::Passthrough => return Ok(FetchOutcome::Passthrough),
            RouteDecision::Handle(route) => route,
        };

        let response = match route.strategy {
            Strategy::NetworkOnly => self.network_only(request).await,
            Strategy::NetworkFirst { cache } => self.network_first(request, cache).await?,
            Strategy::ShellFirst => self.shell_first(request).await,
            Strategy::CacheFirst { cache } => self.cache_first(request, cache).await,
        };
        Ok(FetchOutcome::Respond(response))
    }

    async fn network_only(&self, request: &Request) -> Response {
        match self.network.fetch(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!("Offline while fetching {}: {}", request.url, err);
                Response::offline()
            }
        }
    }

    async fn network_first(
        &self,
        request: &Request,
        generation: CacheGeneration,
    ) -> Result<Response> {
        let key = self.config.version_path.clone();
        let token = self.config.build_stamp().cache_bust_token(self.clock.now());
        let busted = self
            .origin
            .join(&with_cache_bust(&request.cache_key(), &token))
            .map_err(|e| NetworkError::InvalidUrl(e.to_string()))?;
        let fresh = Request {
            url: busted,
            ..request.clone()
        }
        .no_store();

        match self.network.fetch(&fresh).await {
            Ok(response) => {
                if response.is_ok() {
                    self.store(generation, &key, response.clone()).await;
                }
                Ok(response)
            }
            Err(err) => {
                tracing::debug!("Version descriptor fetch failed, trying cache: {}", err);
                match self.lookup_any(&key, generation).await {
                    Some(cached) => Ok(cached),
                    None => Err(WorkerError::Network(err)),
                }
            }
        }
    }

    async fn shell_first(&self, request: &Request) -> Response {
        let shell = self.config.shell_document.clone();
        if let Some(cached) = self.lookup_any(&shell, CacheGeneration::Runtime).await {
            return cached;
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.store(CacheGeneration::Runtime, &shell, response.clone())
                        .await;
                }
                response
            }
            Err(err) => {
                tracing::debug!("Offline navigation to {}: {}", request.url, err);
                self.lookup_any(&request.cache_key(), CacheGeneration::Runtime)
                    .await
                    .unwrap_or_else(Response::offline)
            }
        }
    }

    async fn cache_first(&self, request: &Request, generation: CacheGeneration) -> Response {
        let key = request.cache_key();
        if let Some(cached) = self.lookup(generation, &key).await {
            return cached;
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.store(generation, &key, response.clone()).await;
                }
                response
            }
            Err(err) => {
                tracing::debug!("Offline while fetching {}: {}", request.url, err);
                Response::offline()
            }
        }
    }

    /// Look in `first`, then in the other generation.
    async fn lookup_any(&self, key: &str, first: CacheGeneration) -> Option<Response> {
        let second = match first {
            CacheGeneration::Static => CacheGeneration::Runtime,
            CacheGeneration::Runtime => CacheGeneration::Static,
        };
        match self.lookup(first, key).await {
            Some(hit) => Some(hit),
            None => self.lookup(second, key).await,
        }
    }

    async fn lookup(&self, generation: CacheGeneration, key: &str) -> Option<Response> {
        let cache = self.names.name(generation);
        match self.caches.match_in(cache, key).await {
            Ok(hit) => hit,
            Err(err) => {
                tracing::warn!("Cache read from {} failed for {}: {}", cache, key, err);
                None
            }
        }
    }

    /// Store a response, swallowing storage failures.
    async fn store(&self, generation: CacheGeneration, key: &str, response: Response) -> bool {
        let cache = self.names.name(generation);
        match self.caches.put(cache, key, response).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("Cache write to {} failed for {}: {}", cache, key, err);
                false
            }
        }
    }
}
