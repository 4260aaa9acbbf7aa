use super::{
    MAX_SCAN_RETRIES, POLL_INTERVAL, Rejection, WifiSetupService, WorkflowReport, call,
    is_cancelled, sleep_cancellable, types::NetworkDescriptor,
};
use crate::openlogger_client::{DeviceGateway, RawNetwork, is_still_working};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

/// Turn raw scan entries into descriptors, strongest signal first
///
/// The sort is stable and entries without a signal strength go last.
pub fn parse_scan_results(raw: Vec<RawNetwork>) -> Vec<NetworkDescriptor> {
    let mut networks: Vec<NetworkDescriptor> =
        raw.into_iter().map(NetworkDescriptor::from).collect();
    networks.sort_by(|a, b| b.signal_strength.cmp(&a.signal_strength));
    networks
}

impl<G> WifiSetupService<G>
where
    G: DeviceGateway,
{
    /// Disconnect if needed, scan and read the results into the available
    /// networks
    pub async fn refresh_available_networks(&self, cancel: CancellationToken) -> WorkflowReport {
        let Some(_guard) = self.try_begin() else {
            return WorkflowReport::rejected(Rejection::Busy);
        };

        let adapter = self.selected_adapter();
        let mut report = WorkflowReport::default();
        let result = self.scan_networks(&adapter, &cancel, &mut report).await;

        self.update(|state| state.scanning = false);
        self.finish(result, None, report)
    }

    async fn scan_networks(
        &self,
        adapter: &str,
        cancel: &CancellationToken,
        report: &mut WorkflowReport,
    ) -> Result<()> {
        match call(cancel, self.gateway.adapter_status(adapter)).await {
            Ok(status) => {
                let active = status.status.is_active();
                self.update(|state| state.adapter_status = Some(status));

                if active {
                    if let Err(e) = call(cancel, self.gateway.disconnect(adapter)).await {
                        if is_cancelled(&e) {
                            return Err(e);
                        }
                        warn!("failed to disconnect {adapter} before scanning: {e:#}");
                    }
                }
            }
            Err(e) if is_cancelled(&e) => return Err(e),
            Err(e) => warn!("failed to get status of {adapter} before scanning: {e:#}"),
        }

        let status = call(cancel, self.gateway.adapter_status(adapter))
            .await
            .context(format!("failed to get status of {adapter}"))?;
        self.update(|state| state.adapter_status = Some(status));

        call(cancel, self.gateway.scan(adapter))
            .await
            .context(format!("failed to start scan on {adapter}"))?;

        self.update(|state| {
            state.scanning = true;
            state.scan_attempts = 0;
        });

        loop {
            sleep_cancellable(cancel, POLL_INTERVAL).await?;

            match call(cancel, self.gateway.read_scan_results(adapter)).await {
                Ok(raw) => {
                    let networks = parse_scan_results(raw);
                    debug!("scan on {adapter} found {} networks", networks.len());
                    self.update(|state| {
                        state.available_networks = networks;
                        state.scanning = false;
                    });
                    return Ok(());
                }
                Err(e) if is_cancelled(&e) => return Err(e),
                Err(e) if is_still_working(&e) => {
                    let retry = self.update(|state| {
                        (state.scan_attempts < MAX_SCAN_RETRIES).then(|| {
                            state.scan_attempts += 1;
                            state.scan_attempts
                        })
                    });

                    match retry {
                        Some(retry) => debug!("scan on {adapter} still in progress ({retry})"),
                        None => {
                            info!("no scan results from {adapter} after {MAX_SCAN_RETRIES} retries");
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    Self::secondary(report, "failed to read scan results", e);
                    return Ok(());
                }
            }
        }
    }
}
