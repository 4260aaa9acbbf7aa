//! Wi-Fi connection management
//!
//! Sequences device gateway commands into the workflows of the Wi-Fi setup
//! view and owns the session state those workflows operate on. Workflows never
//! fail past this boundary: they resolve to a [`WorkflowReport`] and keep the
//! user visible status message and loading indicator consistent.

mod connection;
mod saved;
mod scan;
mod types;
mod workflows;

pub use connection::ConnectError;
pub use saved::parse_saved_parameters;
pub use scan::parse_scan_results;
pub use types::{
    Dismissal, NO_SELECTION, NetworkDescriptor, NetworkRequest, READY, Rejection,
    SavedNetworkDescriptor, View, WepKeyMaterial, WifiState, WorkflowOutcome, WorkflowReport,
};

use crate::openlogger_client::DeviceGateway;
use anyhow::{Context, Result};
use log::{error, info, warn};
use std::{
    future::Future,
    sync::{Mutex, PoisonError},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    sync::{Mutex as WorkflowLock, MutexGuard},
    time::sleep,
};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Delay between two consecutive device queries of a polling loop
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound for an adapter to report a connection after `nicConnect`
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Still-working retries granted to `wifiReadScannedNetworks`
pub const MAX_SCAN_RETRIES: u32 = 20;

/// Added to the settle time reported by `wifiLoadParameters`
pub const LOAD_SETTLE_MARGIN: Duration = Duration::from_millis(3000);

/// Pause before reconnecting with an updated parameter set
pub const UPDATE_SETTLE: Duration = Duration::from_millis(500);

pub const LEAVE_DEVICE_MANAGER_PROMPT: &str = "Connecting to a network over wifi will send you back to the Device Manager Page. Are you sure?";

// ============================================================================
// Service
// ============================================================================

/// Metadata of the device handle the service was created for
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DeviceContext {
    /// The device is reached through a network bridge and keeps talking to us
    /// while its wifi adapter reconnects
    pub bridge: bool,
}

#[derive(Debug, Error)]
#[error("workflow cancelled")]
pub struct Cancelled;

/// Whether `err` originates from a cancelled workflow
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Cancelled>().is_some()
        || matches!(
            err.downcast_ref::<ConnectError>(),
            Some(ConnectError::Cancelled)
        )
}

/// Run `fut` unless `cancel` fires first
pub async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, Cancelled> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        output = fut => Ok(output),
    }
}

pub async fn sleep_cancellable(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    cancellable(cancel, sleep(duration)).await?;
    Ok(())
}

/// Issue a gateway call that gets abandoned when `cancel` fires
async fn call<T>(cancel: &CancellationToken, fut: impl Future<Output = Result<T>>) -> Result<T> {
    cancellable(cancel, fut).await?
}

pub struct WifiSetupService<G> {
    gateway: G,
    context: DeviceContext,
    state: Mutex<WifiState>,
    workflow: WorkflowLock<()>,
    cancel: Mutex<CancellationToken>,
}

impl<G> WifiSetupService<G>
where
    G: DeviceGateway,
{
    /// Create the service without talking to the device
    pub fn new(gateway: G, context: DeviceContext) -> Self {
        WifiSetupService {
            gateway,
            context,
            state: Mutex::new(WifiState::default()),
            workflow: WorkflowLock::new(()),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Create the service and populate it from the device
    pub async fn start(gateway: G, context: DeviceContext) -> Self {
        let service = Self::new(gateway, context);
        let report = service.bootstrap().await;

        if !report.secondary_failures.is_empty() {
            info!(
                "wifi setup started with partial device information ({} failures)",
                report.secondary_failures.len()
            );
        }

        service
    }

    pub fn snapshot(&self) -> WifiState {
        self.read(Clone::clone)
    }

    /// Token of the current session; fires when workflows get cancelled
    pub fn session_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop every running workflow and start a fresh session
    pub fn cancel_workflows(&self) {
        let mut token = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
        info!("cancelled running wifi workflows");
    }

    /// Query adapters, status and storage locations, then the saved networks
    ///
    /// Partial initialization is accepted: failures are reported as secondary
    /// failures and leave the defaults in place.
    pub async fn bootstrap(&self) -> WorkflowReport {
        let Some(_guard) = self.try_begin() else {
            return WorkflowReport::rejected(Rejection::Busy);
        };

        let cancel = self.session_token();
        let mut report = WorkflowReport::default();

        if let Err(e) = self.discover_device(&cancel).await {
            Self::secondary(&mut report, "failed to discover device", e);
        }

        let storage_location = self.selected_storage_location();
        if let Err(e) = self.load_saved_networks(&storage_location, &cancel).await {
            Self::secondary(&mut report, "failed to list saved networks", e);
        }

        report
    }

    async fn discover_device(&self, cancel: &CancellationToken) -> Result<()> {
        let adapters = call(cancel, self.gateway.list_adapters())
            .await
            .context("failed to list adapters")?;
        let adapter = adapters
            .first()
            .cloned()
            .context("device reported no wifi adapters")?;

        self.update(|state| {
            state.adapters = adapters;
            state.selected_adapter = adapter.clone();
        });

        let status = call(cancel, self.gateway.adapter_status(&adapter))
            .await
            .context(format!("failed to get status of {adapter}"))?;
        self.update(|state| state.adapter_status = Some(status));

        let locations = call(cancel, self.gateway.storage_locations())
            .await
            .context("failed to list storage locations")?;
        let location = locations
            .first()
            .cloned()
            .context("device reported no storage locations")?;

        self.update(|state| {
            state.storage_locations = locations;
            state.selected_storage_location = location;
        });

        Ok(())
    }

    fn try_begin(&self) -> Option<MutexGuard<'_, ()>> {
        let guard = self.workflow.try_lock().ok();
        if guard.is_none() {
            warn!("rejected wifi workflow: another workflow is in progress");
        }
        guard
    }

    fn update<R>(&self, f: impl FnOnce(&mut WifiState) -> R) -> R {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn read<R>(&self, f: impl FnOnce(&WifiState) -> R) -> R {
        f(&self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn selected_adapter(&self) -> String {
        self.read(|state| state.selected_adapter.clone())
    }

    fn selected_storage_location(&self) -> String {
        self.read(|state| state.selected_storage_location.clone())
    }

    fn set_status(&self, message: &str) {
        self.update(|state| state.status_message = message.to_string());
    }

    fn show_loading(&self, message: &str) {
        self.update(|state| state.loading = Some(message.to_string()));
    }

    fn secondary(report: &mut WorkflowReport, context: &str, e: anyhow::Error) {
        warn!("{context}: {e:#}");
        report.secondary_failures.push(format!("{context}: {e:#}"));
    }

    /// Dismiss the loading indicator and turn `result` into the report outcome
    fn finish(
        &self,
        result: Result<()>,
        failure_status: Option<&str>,
        mut report: WorkflowReport,
    ) -> WorkflowReport {
        self.update(|state| state.loading = None);

        report.outcome = match result {
            Ok(()) => WorkflowOutcome::Completed,
            Err(e) if is_cancelled(&e) => {
                info!("wifi workflow cancelled");
                WorkflowOutcome::Cancelled
            }
            Err(e) => {
                error!("wifi workflow failed: {e:#}");
                if let Some(message) = failure_status {
                    self.set_status(message);
                }
                WorkflowOutcome::Failed(format!("{e:#}"))
            }
        };

        report
    }
}
