use super::{
    LEAVE_DEVICE_MANAGER_PROMPT, LOAD_SETTLE_MARGIN, READY, Rejection, UPDATE_SETTLE,
    WifiSetupService, WorkflowReport, call, is_cancelled, sleep_cancellable,
    types::{Dismissal, NetworkDescriptor, NetworkRequest, View, WifiState},
};
use crate::openlogger_client::{DeviceGateway, SecurityType};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde_valid::Validate;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SET_PARAMETERS_FAILED: &str = "Error setting wifi parameters.";
const UPDATE_PARAMETERS_FAILED: &str = "Error updating wifi parameters.";
const INVALID_SSID: &str = "Please enter a valid SSID.";
const MISSING_SECURITY_TYPE: &str = "Please select a security type.";

fn show_networks(state: &mut WifiState) {
    state.view = View::Networks;
    state.modifying = None;
    state.custom_network = false;
}

fn show_configuration(state: &mut WifiState, network: NetworkDescriptor, custom: bool) {
    state.selected_network = Some(network);
    state.custom_network = custom;
    state.status_message = READY.to_string();
    state.view = View::Configure;
}

impl<G> WifiSetupService<G>
where
    G: DeviceGateway,
{
    // ========================================================================
    // Navigation
    // ========================================================================

    pub fn select_adapter(&self, adapter: &str) -> WorkflowReport {
        let known = self.read(|state| state.adapters.iter().any(|name| name == adapter));
        if !known {
            return WorkflowReport::rejected(Rejection::Invalid(format!(
                "unknown adapter: {adapter}"
            )));
        }

        self.update(|state| state.selected_adapter = adapter.to_string());
        info!("selected adapter {adapter}");
        WorkflowReport::default()
    }

    /// Open the configuration view for a scanned network
    pub fn select_network(&self, network: NetworkDescriptor) {
        self.update(|state| {
            state.modifying = None;
            show_configuration(state, network, false);
        });
    }

    /// Open the configuration view for a manually entered network
    pub fn add_custom_network(&self) {
        self.update(|state| {
            state.modifying = None;
            show_configuration(state, NetworkDescriptor::custom(), true);
        });
    }

    /// Open the configuration view to edit a saved network
    pub fn modify_saved_network(&self, index: usize) -> WorkflowReport {
        let found = self.update(|state| {
            let saved = state.saved_networks.get(index).cloned()?;
            show_configuration(state, saved.network.clone(), false);
            state.modifying = Some(saved);
            Some(())
        });

        match found {
            Some(()) => WorkflowReport::default(),
            None => WorkflowReport::rejected(Rejection::NoSuchSavedNetwork),
        }
    }

    pub fn back_to_networks(&self) {
        self.update(show_networks);
    }

    /// Leave the setup view, either to the device manager or with the latest
    /// adapter status
    pub async fn close(&self, to_device_manager: bool) -> Dismissal {
        self.cancel_workflows();

        if to_device_manager {
            return Dismissal::ToDeviceManager;
        }

        let adapter = self.selected_adapter();
        match self.gateway.adapter_status(&adapter).await {
            Ok(status) => {
                self.update(|state| state.adapter_status = Some(status.clone()));
                Dismissal::WithStatus(Some(status))
            }
            Err(e) => {
                warn!("failed to get status of {adapter} on close: {e:#}");
                Dismissal::WithStatus(None)
            }
        }
    }

    // ========================================================================
    // Device workflows
    // ========================================================================

    fn check_request(&self, request: &NetworkRequest) -> Result<SecurityType, Rejection> {
        if !request.network.has_identifier() {
            self.set_status(INVALID_SSID);
            return Err(Rejection::MissingIdentifier);
        }

        if let Err(e) = request.validate() {
            let message = format!("Invalid network settings: {e}");
            self.set_status(&message);
            return Err(Rejection::Invalid(message));
        }

        request.network.security_type.ok_or_else(|| {
            self.set_status(MISSING_SECURITY_TYPE);
            Rejection::Invalid(MISSING_SECURITY_TYPE.to_string())
        })
    }

    /// Set parameters for a new network, optionally connect and save it
    pub async fn add_network(
        &self,
        request: NetworkRequest,
        cancel: CancellationToken,
    ) -> WorkflowReport {
        let duplicate = self.read(|state| {
            state
                .saved_networks
                .iter()
                .any(|saved| saved.network == request.network)
        });
        if duplicate {
            debug!("network is saved already");
            return WorkflowReport::rejected(Rejection::Duplicate);
        }

        let Some(_guard) = self.try_begin() else {
            return WorkflowReport::rejected(Rejection::Busy);
        };

        let security_type = match self.check_request(&request) {
            Ok(security_type) => security_type,
            Err(rejection) => return WorkflowReport::rejected(rejection),
        };

        self.show_loading(if request.custom {
            "Adding Network"
        } else {
            "Connecting To Network"
        });

        let mut report = WorkflowReport::default();
        let result = self
            .apply_network(&request, security_type, &cancel, &mut report)
            .await;

        self.finish(result, Some(SET_PARAMETERS_FAILED), report)
    }

    async fn apply_network(
        &self,
        request: &NetworkRequest,
        security_type: SecurityType,
        cancel: &CancellationToken,
        report: &mut WorkflowReport,
    ) -> Result<()> {
        let adapter = self.selected_adapter();
        let storage_location = self.selected_storage_location();
        let parameters = request.parameters(security_type);
        let ssid = parameters.ssid.clone();

        call(cancel, self.gateway.set_parameters(&adapter, parameters))
            .await
            .context(format!("failed to set parameters for {ssid}"))?;

        if request.connect_now && self.context.bridge {
            self.connect_and_wait(&adapter, None, cancel).await?;
        }

        if request.save {
            call(cancel, self.gateway.save_parameters(&storage_location))
                .await
                .context(format!("failed to save {ssid} to {storage_location}"))?;

            if let Err(e) = self.load_saved_networks(&storage_location, cancel).await {
                if is_cancelled(&e) {
                    return Err(e);
                }
                Self::secondary(report, "failed to list saved networks", e);
            }
        }

        info!("configured network {ssid} on {adapter}");
        self.update(show_networks);

        Ok(())
    }

    /// Replace the saved network under modification with the edited values
    pub async fn update_saved_network(
        &self,
        request: NetworkRequest,
        cancel: CancellationToken,
    ) -> WorkflowReport {
        let Some(saved) = self.read(|state| state.modifying.clone()) else {
            return WorkflowReport::rejected(Rejection::NotModifying);
        };

        let mut request = request;
        if request.network.security_type.is_none() {
            request.network.security_type = saved.network.security_type;
        }
        if !request.network.has_identifier() {
            request.network.ssid = saved.network.ssid.clone();
        }

        let Some(_guard) = self.try_begin() else {
            return WorkflowReport::rejected(Rejection::Busy);
        };

        let security_type = match self.check_request(&request) {
            Ok(security_type) => security_type,
            Err(rejection) => return WorkflowReport::rejected(rejection),
        };

        self.show_loading("Updating Network");

        let ssid = saved.network.display_name().unwrap_or_default().to_string();
        let removed: Result<()> = async {
            call(
                &cancel,
                self.gateway.load_parameters(&saved.storage_location, &ssid),
            )
            .await
            .context(format!("failed to load saved network {ssid}"))?;

            call(
                &cancel,
                self.gateway
                    .delete_saved_parameters(&saved.storage_location, &ssid),
            )
            .await
            .context(format!("failed to delete saved network {ssid}"))
        }
        .await;

        let mut report = WorkflowReport::default();
        if let Err(e) = removed {
            return self.finish(Err(e), None, report);
        }

        let result = self.reapply_network(&request, security_type, &cancel).await;
        if matches!(&result, Err(e) if is_cancelled(e)) {
            return self.finish(result, None, report);
        }

        let storage_location = self.selected_storage_location();
        if let Err(e) = self.load_saved_networks(&storage_location, &cancel).await {
            if is_cancelled(&e) {
                return self.finish(Err(e), None, report);
            }
            Self::secondary(&mut report, "failed to list saved networks", e);
        }

        if result.is_ok() {
            self.update(show_networks);
        }

        self.finish(result, Some(UPDATE_PARAMETERS_FAILED), report)
    }

    async fn reapply_network(
        &self,
        request: &NetworkRequest,
        security_type: SecurityType,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let adapter = self.selected_adapter();
        let storage_location = self.selected_storage_location();
        let parameters = request.parameters(security_type);
        let ssid = parameters.ssid.clone();

        call(cancel, self.gateway.set_parameters(&adapter, parameters))
            .await
            .context(format!("failed to set parameters for {ssid}"))?;

        call(cancel, self.gateway.save_parameters(&storage_location))
            .await
            .context(format!("failed to save {ssid} to {storage_location}"))?;

        if request.connect_now && self.context.bridge {
            self.connect_and_wait(&adapter, Some(UPDATE_SETTLE), cancel)
                .await?;
        }

        info!("updated saved network {ssid}");
        Ok(())
    }

    /// Confirmation the user has to give before [`Self::load_and_connect`]
    pub fn load_and_connect_precheck(&self) -> Option<&'static str> {
        (!self.context.bridge).then_some(LEAVE_DEVICE_MANAGER_PROMPT)
    }

    /// Load a saved network into the working parameter set and connect it
    ///
    /// Outside bridge mode the connection to the device is lost, so the report
    /// always carries a dismissal to the device manager, whatever the outcome.
    pub async fn load_and_connect(
        &self,
        index: usize,
        confirmed: bool,
        cancel: CancellationToken,
    ) -> WorkflowReport {
        if self.load_and_connect_precheck().is_some() && !confirmed {
            return WorkflowReport::rejected(Rejection::ConfirmationRequired);
        }

        let Some(_guard) = self.try_begin() else {
            return WorkflowReport::rejected(Rejection::Busy);
        };

        let Some(saved) = self.read(|state| state.saved_networks.get(index).cloned()) else {
            return WorkflowReport::rejected(Rejection::NoSuchSavedNetwork);
        };

        self.show_loading("Connecting To Saved Network...");

        let adapter = self.selected_adapter();
        let ssid = saved.network.display_name().unwrap_or_default().to_string();

        let result = async {
            let loaded = call(
                &cancel,
                self.gateway.load_parameters(&saved.storage_location, &ssid),
            )
            .await
            .context(format!("failed to load saved network {ssid}"))?;

            sleep_cancellable(
                &cancel,
                Duration::from_millis(loaded.wait) + LOAD_SETTLE_MARGIN,
            )
            .await?;

            self.connect_and_wait(&adapter, None, &cancel).await?;

            let status = call(&cancel, self.gateway.adapter_status(&adapter))
                .await
                .context(format!("failed to get status of {adapter}"))?;
            self.update(|state| state.adapter_status = Some(status));

            info!("connected {adapter} to saved network {ssid}");
            anyhow::Ok(())
        }
        .await;

        let mut report = self.finish(result, None, WorkflowReport::default());
        if !self.context.bridge {
            report.dismissal = Some(Dismissal::ToDeviceManager);
        }
        report
    }

    /// Disconnect the selected adapter and refresh its status
    pub async fn manual_disconnect(&self, cancel: CancellationToken) -> WorkflowReport {
        let Some(_guard) = self.try_begin() else {
            return WorkflowReport::rejected(Rejection::Busy);
        };

        let adapter = self.selected_adapter();
        let mut report = WorkflowReport::default();

        let result = call(&cancel, self.gateway.disconnect(&adapter))
            .await
            .context(format!("failed to disconnect {adapter}"));

        if result.is_ok() {
            match call(&cancel, self.gateway.adapter_status(&adapter)).await {
                Ok(status) => self.update(|state| state.adapter_status = Some(status)),
                Err(e) if is_cancelled(&e) => return self.finish(Err(e), None, report),
                Err(e) => Self::secondary(&mut report, "failed to refresh adapter status", e),
            }
        }

        self.finish(result, None, report)
    }
}
