use super::{
    Rejection, WifiSetupService, WorkflowReport, call, is_cancelled,
    types::{NetworkDescriptor, SavedNetworkDescriptor},
};
use crate::openlogger_client::{DeviceGateway, SavedParameterSet};
use anyhow::{Context, Result};
use log::{debug, info};
use tokio_util::sync::CancellationToken;

const DELETE_DONE: &str = "Done deleting saved network.";
const DELETE_FAILED: &str = "Error deleting saved network.";

/// Saved parameter sets as descriptors; only ssid and security are known
pub fn parse_saved_parameters(
    sets: Vec<SavedParameterSet>,
    storage_location: &str,
) -> Vec<SavedNetworkDescriptor> {
    sets.into_iter()
        .map(|set| SavedNetworkDescriptor {
            network: NetworkDescriptor {
                ssid: Some(set.ssid),
                security_type: set
                    .security_type
                    .and_then(|security_type| security_type.parse().ok()),
                ..Default::default()
            },
            storage_location: storage_location.to_string(),
            auto_connect: set.auto_connect,
        })
        .collect()
}

impl<G> WifiSetupService<G>
where
    G: DeviceGateway,
{
    /// Replace the saved networks with the sets stored on `storage_location`
    ///
    /// The list is cleared before the device is asked, so a failure leaves it
    /// empty.
    pub(super) async fn load_saved_networks(
        &self,
        storage_location: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.update(|state| state.saved_networks.clear());

        let sets = call(cancel, self.gateway.list_saved_parameters(storage_location))
            .await
            .context(format!("failed to list saved networks on {storage_location}"))?;
        let saved = parse_saved_parameters(sets, storage_location);

        debug!("{} saved networks on {storage_location}", saved.len());
        self.update(|state| state.saved_networks = saved);

        Ok(())
    }

    pub async fn refresh_saved_networks(&self, cancel: CancellationToken) -> WorkflowReport {
        let Some(_guard) = self.try_begin() else {
            return WorkflowReport::rejected(Rejection::Busy);
        };

        let storage_location = self.selected_storage_location();
        let result = self.load_saved_networks(&storage_location, &cancel).await;
        self.finish(result, None, WorkflowReport::default())
    }

    /// Select a storage location and list the networks saved on it
    pub async fn select_storage_location(
        &self,
        storage_location: &str,
        cancel: CancellationToken,
    ) -> WorkflowReport {
        let known = self.read(|state| {
            state
                .storage_locations
                .iter()
                .any(|location| location == storage_location)
        });
        if !known {
            return WorkflowReport::rejected(Rejection::Invalid(format!(
                "unknown storage location: {storage_location}"
            )));
        }

        let Some(_guard) = self.try_begin() else {
            return WorkflowReport::rejected(Rejection::Busy);
        };

        self.update(|state| state.selected_storage_location = storage_location.to_string());
        info!("selected storage location {storage_location}");

        let mut report = WorkflowReport::default();
        let result = match self.load_saved_networks(storage_location, &cancel).await {
            Err(e) if !is_cancelled(&e) => {
                Self::secondary(&mut report, "failed to list saved networks", e);
                Ok(())
            }
            other => other,
        };

        self.finish(result, None, report)
    }

    /// Delete a saved network from its storage location
    pub async fn forget_saved_network(
        &self,
        index: usize,
        cancel: CancellationToken,
    ) -> WorkflowReport {
        let Some(_guard) = self.try_begin() else {
            return WorkflowReport::rejected(Rejection::Busy);
        };

        let Some(saved) = self.read(|state| state.saved_networks.get(index).cloned()) else {
            return WorkflowReport::rejected(Rejection::NoSuchSavedNetwork);
        };

        let ssid = saved.network.display_name().unwrap_or_default().to_string();
        let mut report = WorkflowReport::default();

        let result = call(
            &cancel,
            self.gateway
                .delete_saved_parameters(&saved.storage_location, &ssid),
        )
        .await
        .context(format!(
            "failed to delete {ssid} from {}",
            saved.storage_location
        ));

        if result.is_ok() {
            info!("deleted saved network {ssid} from {}", saved.storage_location);
            self.set_status(DELETE_DONE);

            let storage_location = self.selected_storage_location();
            if let Err(e) = self.load_saved_networks(&storage_location, &cancel).await {
                if is_cancelled(&e) {
                    return self.finish(Err(e), None, report);
                }
                Self::secondary(&mut report, "failed to list saved networks", e);
            }
        }

        self.finish(result, Some(DELETE_FAILED), report)
    }
}
