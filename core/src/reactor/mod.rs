//! ReactorCore - the telemetry poll loop.
//!
//! Owns the connection to an engaged language server, polls its status
//! endpoint, decodes responses into [`QuotaSnapshot`]s and publishes them to
//! subscribers.
//!
//! # Retry policy
//! - Initial sync: up to [`INIT_MAX_RETRIES`] retries with a linear backoff
//!   of [`INIT_BACKOFF_STEP`] per attempt.
//! - Periodic sync: no retry; a failed tick waits for the next one, except
//!   when the failure suggests the server moved. Then the re-scan hook runs
//!   up to the re-scan limit before the failure is reported.

mod decode;
pub mod grouping;
pub mod wire;

#[cfg(test)]
pub(crate) mod fixtures;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::domain::{
    EnvironmentScanResult, GroupingConfig, MappingCorrection, QuotaSnapshot, ScanDiagnostics,
};
use crate::error::{Error, Result};
use crate::ports::{ErrorReport, ErrorReporter, Transport, TransportRequest};
use crate::protocol::{user_status_payload, NETWORK_TIMEOUT, USER_STATUS_PATH};

pub use decode::{decode_signal, DecodeOutcome};
pub use grouping::{build_groups, calculate_group_mappings, family_of, GroupingOutcome};

/// Retries of the initial sync after the first attempt.
pub const INIT_MAX_RETRIES: u32 = 3;

/// Backoff of the n-th initial retry is `n * INIT_BACKOFF_STEP`.
pub const INIT_BACKOFF_STEP: Duration = Duration::from_secs(2);

/// Consecutive re-scans before a moved server is reported.
pub const DEFAULT_RESCAN_ATTEMPTS: u32 = 5;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Caller-supplied full re-scan.
pub type RescanHook = Arc<dyn Fn() -> BoxFuture<Option<EnvironmentScanResult>> + Send + Sync>;

type TelemetryHandler = Box<dyn Fn(&QuotaSnapshot) + Send + Sync>;
type MalfunctionHandler = Box<dyn Fn(&Error) + Send + Sync>;
type CorrectionsHandler = Box<dyn Fn(&[MappingCorrection]) + Send + Sync>;

/// Lifecycle of the reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReactorState {
    /// No port or token yet.
    Unengaged,
    /// Connection known, no timer running.
    Engaged,
    /// Periodic sync timer running.
    Polling,
}

struct Session {
    port: u16,
    token: String,
    diagnostics: Option<ScanDiagnostics>,
}

#[derive(Default)]
struct SignalCache {
    raw: Option<Value>,
    snapshot: Option<QuotaSnapshot>,
}

#[derive(Default)]
struct Handlers {
    telemetry: Vec<TelemetryHandler>,
    malfunction: Vec<MalfunctionHandler>,
    corrections: Vec<CorrectionsHandler>,
}

/// Holds the in-flight flag; clears it on drop.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Polls one language server and publishes decoded telemetry.
pub struct ReactorCore<T: Transport> {
    transport: T,
    reporter: Arc<dyn ErrorReporter>,
    session: RwLock<Option<Session>>,
    cache: RwLock<SignalCache>,
    grouping: RwLock<GroupingConfig>,
    handlers: RwLock<Handlers>,
    rescan_hook: RwLock<Option<RescanHook>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    /// Serializes decode and publish between syncs and `reprocess`.
    decode_lock: Mutex<()>,
    in_flight: AtomicBool,
    ever_succeeded: AtomicBool,
    rescan_limit: AtomicU32,
}

impl<T: Transport + 'static> ReactorCore<T> {
    pub fn new(transport: T, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            transport,
            reporter,
            session: RwLock::new(None),
            cache: RwLock::new(SignalCache::default()),
            grouping: RwLock::new(GroupingConfig::default()),
            handlers: RwLock::new(Handlers::default()),
            rescan_hook: RwLock::new(None),
            timer: Mutex::new(None),
            decode_lock: Mutex::new(()),
            in_flight: AtomicBool::new(false),
            ever_succeeded: AtomicBool::new(false),
            rescan_limit: AtomicU32::new(DEFAULT_RESCAN_ATTEMPTS),
        }
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    /// Store the connection parameters and the diagnostics of the scan that found them.
    pub fn engage(&self, port: u16, token: impl Into<String>, diagnostics: Option<ScanDiagnostics>) {
        info!(port, "Reactor engaged");
        *self.session.write() = Some(Session {
            port,
            token: token.into(),
            diagnostics,
        });
    }

    /// Point at a re-discovered server, keeping the original diagnostics.
    fn reengage(&self, found: &EnvironmentScanResult) {
        let mut session = self.session.write();
        let diagnostics = session.take().and_then(|s| s.diagnostics);
        info!(port = found.connect_port, "Reactor re-engaged");
        *session = Some(Session {
            port: found.connect_port,
            token: found.csrf_token.clone(),
            diagnostics,
        });
    }

    pub fn state(&self) -> ReactorState {
        if self.session.read().is_none() {
            ReactorState::Unengaged
        } else if self.is_polling() {
            ReactorState::Polling
        } else {
            ReactorState::Engaged
        }
    }

    pub fn is_polling(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn connected_port(&self) -> Option<u16> {
        self.session.read().as_ref().map(|s| s.port)
    }

    pub fn has_ever_succeeded(&self) -> bool {
        self.ever_succeeded.load(Ordering::Acquire)
    }

    pub fn latest_snapshot(&self) -> Option<QuotaSnapshot> {
        self.cache.read().snapshot.clone()
    }

    pub fn last_raw_response(&self) -> Option<Value> {
        self.cache.read().raw.clone()
    }

    #[cfg(test)]
    pub(crate) fn cache_raw_response(&self, raw: Value) {
        self.cache.write().raw = Some(raw);
    }

    // ------------------------------------------------------------------
    // Configuration and subscriptions
    // ------------------------------------------------------------------

    pub fn grouping_config(&self) -> GroupingConfig {
        self.grouping.read().clone()
    }

    /// Replace the grouping inputs. Call `reprocess` to see the effect.
    pub fn set_grouping_config(&self, config: GroupingConfig) {
        *self.grouping.write() = config;
    }

    pub fn set_rescan_limit(&self, attempts: u32) {
        self.rescan_limit.store(attempts, Ordering::Release);
    }

    pub fn on_telemetry<F>(&self, handler: F)
    where
        F: Fn(&QuotaSnapshot) + Send + Sync + 'static,
    {
        self.handlers.write().telemetry.push(Box::new(handler));
    }

    pub fn on_malfunction<F>(&self, handler: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.handlers.write().malfunction.push(Box::new(handler));
    }

    /// Receive mapping corrections for persistence. They are already applied
    /// to the reactor's own grouping configuration.
    pub fn on_corrections<F>(&self, handler: F)
    where
        F: Fn(&[MappingCorrection]) + Send + Sync + 'static,
    {
        self.handlers.write().corrections.push(Box::new(handler));
    }

    pub fn set_rescan_hook<F, Fut>(&self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<EnvironmentScanResult>> + Send + 'static,
    {
        let hook: RescanHook = Arc::new(move || Box::pin(hook()));
        *self.rescan_hook.write() = Some(hook);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Run the retrying initial sync, then poll every `interval`.
    ///
    /// Returns whether the initial sync succeeded. Polling starts either way.
    pub async fn start_reactor(self: &Arc<Self>, interval: Duration) -> bool {
        self.shutdown();

        let initial_ok = self.init_with_retry(INIT_MAX_RETRIES).await;

        let interval = interval.max(Duration::from_secs(1));
        let reactor: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(reactor) = reactor.upgrade() else {
                    break;
                };
                reactor.sync_telemetry().await;
            }
        });
        *self.timer.lock() = Some(handle);

        info!(interval_secs = interval.as_secs(), initial_ok, "Reactor polling");
        initial_ok
    }

    /// Stop the timer. In-flight requests finish on their own timeout.
    pub fn shutdown(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
            info!("Reactor stopped");
        }
    }

    /// Sync with up to `max_retries` retries; report only the final failure.
    pub async fn init_with_retry(&self, max_retries: u32) -> bool {
        let Some(_in_flight) = InFlight::acquire(&self.in_flight) else {
            debug!("Sync in flight; initial sync skipped");
            return false;
        };

        let mut retries = 0;
        loop {
            match self.sync_core().await {
                Ok(_) => return true,
                Err(e) if retries < max_retries => {
                    retries += 1;
                    let delay = INIT_BACKOFF_STEP * retries;
                    warn!(
                        retry = retries,
                        max_retries,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "Initial sync failed"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.handle_failure("initial_sync", &e);
                    return false;
                }
            }
        }
    }

    /// One periodic sync. Skipped when another sync is in flight.
    pub async fn sync_telemetry(&self) {
        let Some(_in_flight) = InFlight::acquire(&self.in_flight) else {
            debug!("Sync in flight; tick skipped");
            return;
        };

        let mut result = self.sync_core().await;
        let limit = self.rescan_limit.load(Ordering::Acquire);
        let mut rescans = 0;

        while let Err(e) = &result {
            if !e.indicates_port_change() {
                break;
            }
            let Some(hook) = self.rescan_hook.read().clone() else {
                break;
            };
            if rescans >= limit {
                error!(attempts = rescans, error = %e, "Language server lost; giving up re-scan");
                break;
            }

            rescans += 1;
            warn!(attempt = rescans, limit, error = %e, "Language server may have moved; re-scanning");
            match hook().await {
                Some(found) => {
                    self.reengage(&found);
                    result = self.sync_core().await;
                }
                None => debug!(attempt = rescans, "Re-scan found no language server"),
            }
        }

        if let Err(e) = result {
            self.handle_failure("sync", &e);
        }
    }

    /// One sync that returns its result instead of notifying malfunction
    /// subscribers. For one-shot callers.
    ///
    /// While another sync is in flight this returns the cached snapshot,
    /// or `SyncInProgress` when there is none yet.
    pub async fn fetch_snapshot(&self) -> Result<QuotaSnapshot> {
        let Some(_in_flight) = InFlight::acquire(&self.in_flight) else {
            return self.latest_snapshot().ok_or(Error::SyncInProgress);
        };
        self.sync_core().await
    }

    /// Fetch, decode and publish one snapshot.
    async fn sync_core(&self) -> Result<QuotaSnapshot> {
        let raw = self.transmit(USER_STATUS_PATH, &user_status_payload()).await?;

        let _decoding = self.decode_lock.lock();
        let outcome = decode_signal(&raw, &self.grouping.read(), Utc::now())?;
        self.cache.write().raw = Some(raw);
        let snapshot = self.publish(outcome);
        self.ever_succeeded.store(true, Ordering::Release);
        Ok(snapshot)
    }

    /// Re-run decode on the cached raw response, e.g. after a grouping change.
    pub fn reprocess(&self) -> Option<QuotaSnapshot> {
        let raw = self.cache.read().raw.clone()?;

        let _decoding = self.decode_lock.lock();
        let decoded = decode_signal(&raw, &self.grouping.read(), Utc::now());
        match decoded {
            Ok(outcome) => Some(self.publish(outcome)),
            Err(e) => {
                warn!(error = %e, "Reprocess failed");
                None
            }
        }
    }

    fn publish(&self, outcome: DecodeOutcome) -> QuotaSnapshot {
        let DecodeOutcome {
            snapshot,
            corrections,
        } = outcome;

        if !corrections.is_empty() && self.grouping.write().apply(&corrections) {
            info!(count = corrections.len(), "Group mapping drifted; corrections applied");
            for handler in &self.handlers.read().corrections {
                handler(&corrections);
            }
        }

        self.cache.write().snapshot = Some(snapshot.clone());
        for handler in &self.handlers.read().telemetry {
            handler(&snapshot);
        }
        snapshot
    }

    /// One POST to the engaged server, returning the parsed JSON body.
    pub async fn transmit(&self, path: &str, payload: &Value) -> Result<Value> {
        let (port, token) = {
            let session = self.session.read();
            let session = session.as_ref().ok_or(Error::NotEngaged)?;
            (session.port, session.token.clone())
        };

        let response = self
            .transport
            .post(TransportRequest {
                port,
                token: &token,
                path,
                body: payload,
                timeout: NETWORK_TIMEOUT,
            })
            .await?;

        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::EmptyOrCorruptResponse(format!(
                "empty body (HTTP {})",
                response.status
            )));
        }

        match serde_json::from_slice::<Value>(&response.body) {
            Ok(value) => Ok(value),
            Err(e) if response.is_success() => Err(Error::EmptyOrCorruptResponse(e.to_string())),
            Err(_) => Err(Error::MalformedResponse(format!(
                "HTTP {} with a non-JSON body",
                response.status
            ))),
        }
    }

    /// Notify subscribers, then escalate unless the server reported it
    /// or telemetry has worked before.
    fn handle_failure(&self, context: &'static str, error: &Error) {
        warn!(context, category = ?error.category(), error = %error, "Telemetry malfunction");

        for handler in &self.handlers.read().malfunction {
            handler(error);
        }

        if error.is_server_reported() || self.has_ever_succeeded() {
            return;
        }

        let (port, diagnostics) = match self.session.read().as_ref() {
            Some(s) => (Some(s.port), s.diagnostics.clone()),
            None => (None, None),
        };
        self.reporter
            .report(ErrorReport::new(context, error, port, diagnostics));
    }
}

impl<T: Transport> Drop for ReactorCore<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}
