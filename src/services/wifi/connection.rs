use super::{CONNECT_TIMEOUT, POLL_INTERVAL, WifiSetupService, call, cancellable, sleep_cancellable};
use crate::openlogger_client::{
    AdapterStatus, ConnectionState, DeviceGateway, ParameterSet, STILL_WORKING_REASON,
};
use anyhow::{Context, Result};
use log::debug;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

/// Terminal outcome of a connection-completion poll
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Failed to connect to the network")]
    Timeout,
    #[error("An error has occured while connecting. Please try again.")]
    DeviceReported { status_code: i64 },
    #[error("Failed connecting")]
    FailedConnecting { reason: Option<i64> },
    #[error("connection poll cancelled")]
    Cancelled,
    #[error(transparent)]
    Gateway(#[from] anyhow::Error),
}

impl<G> WifiSetupService<G>
where
    G: DeviceGateway,
{
    /// Poll the selected adapter until it reports a connection with an ip
    /// address or `deadline` passes
    pub async fn wait_until_connected(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<AdapterStatus, ConnectError> {
        let adapter = self.selected_adapter();
        self.poll_until_connected(&adapter, deadline, cancel).await
    }

    async fn poll_until_connected(
        &self,
        adapter: &str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<AdapterStatus, ConnectError> {
        let mut iteration = 0u32;

        loop {
            if Instant::now() >= deadline {
                return Err(ConnectError::Timeout);
            }

            if cancellable(cancel, sleep(POLL_INTERVAL)).await.is_err() {
                return Err(ConnectError::Cancelled);
            }

            let status = match cancellable(cancel, self.gateway.adapter_status(adapter)).await {
                Ok(status) => status?,
                Err(_) => return Err(ConnectError::Cancelled),
            };

            iteration += 1;
            self.update(|state| state.adapter_status = Some(status.clone()));

            if status.status_code != 0 {
                return Err(ConnectError::DeviceReported {
                    status_code: status.status_code,
                });
            }

            if status.is_connected() {
                debug!(
                    "{adapter} connected with {} after {iteration} polls",
                    status.ip_address
                );
                return Ok(status);
            }

            if status.status == ConnectionState::Disconnected
                && status.reason != Some(STILL_WORKING_REASON)
            {
                return Err(ConnectError::FailedConnecting {
                    reason: status.reason,
                });
            }

            debug!("{adapter} not connected yet: {:?}", status.status);
        }
    }

    /// Connect the working parameter set and wait for the adapter to come up
    pub(super) async fn connect_and_wait(
        &self,
        adapter: &str,
        settle: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<AdapterStatus> {
        if let Some(settle) = settle {
            sleep_cancellable(cancel, settle).await?;
        }

        call(
            cancel,
            self.gateway.connect(adapter, ParameterSet::Working, true),
        )
        .await
        .context(format!("failed to connect {adapter}"))?;

        let deadline = Instant::now() + CONNECT_TIMEOUT;
        self.poll_until_connected(adapter, deadline, cancel)
            .await
            .context(format!("{adapter} did not connect"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        openlogger_client::MockDeviceGateway,
        services::wifi::{is_cancelled, test_support::*},
    };
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn scripted(responses: Vec<AdapterStatus>) -> (MockDeviceGateway, Arc<AtomicUsize>) {
        let queries = Arc::new(AtomicUsize::new(0));
        let counter = queries.clone();
        let mut gateway = MockDeviceGateway::new();

        gateway.expect_adapter_status().returning(move |_| {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let response = responses
                .get(index)
                .or(responses.last())
                .cloned()
                .expect("at least one scripted status");
            reply(Ok(response))
        });

        (gateway, queries)
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_fails_without_query() {
        let mut gateway = MockDeviceGateway::new();
        gateway.expect_adapter_status().never();
        let service = service(gateway, true);

        let result = service
            .wait_until_connected(Instant::now(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ConnectError::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_after_fourth_poll() {
        let connecting = status(ConnectionState::Connecting, "none", None);
        let (gateway, queries) = scripted(vec![
            connecting.clone(),
            connecting.clone(),
            connecting,
            status(ConnectionState::Connected, "10.0.0.5", None),
        ]);
        let service = service(gateway, true);
        let started = Instant::now();

        let result = service
            .wait_until_connected(started + CONNECT_TIMEOUT, &CancellationToken::new())
            .await;

        assert_eq!(result.unwrap().ip_address, "10.0.0.5");
        assert_eq!(queries.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn connected_without_ip_keeps_polling() {
        let (gateway, queries) = scripted(vec![
            status(ConnectionState::Connected, "none", None),
            status(ConnectionState::Connected, "10.0.0.5", None),
        ]);
        let service = service(gateway, true);

        let result = service
            .wait_until_connected(Instant::now() + CONNECT_TIMEOUT, &CancellationToken::new())
            .await;

        assert!(result.is_ok());
        assert_eq!(queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_with_other_reason_fails() {
        let (gateway, queries) = scripted(vec![status(
            ConnectionState::Disconnected,
            "none",
            Some(7),
        )]);
        let service = service(gateway, true);

        let result = service
            .wait_until_connected(Instant::now() + CONNECT_TIMEOUT, &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(ConnectError::FailedConnecting { reason: Some(7) })
        ));
        assert_eq!(queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn still_working_retries_until_deadline() {
        let (gateway, queries) = scripted(vec![status(
            ConnectionState::Disconnected,
            "none",
            Some(STILL_WORKING_REASON),
        )]);
        let service = service(gateway, true);
        let started = Instant::now();

        let result = service
            .wait_until_connected(started + Duration::from_secs(5), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ConnectError::Timeout)));
        assert_eq!(queries.load(Ordering::SeqCst), 10);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn non_zero_status_code_is_device_error() {
        let mut failing = status(ConnectionState::Connecting, "none", None);
        failing.status_code = 2;
        let (gateway, _) = scripted(vec![failing]);
        let service = service(gateway, true);

        let result = service
            .wait_until_connected(Instant::now() + CONNECT_TIMEOUT, &CancellationToken::new())
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, ConnectError::DeviceReported { status_code: 2 }));
        assert_eq!(
            err.to_string(),
            "An error has occured while connecting. Please try again."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn query_failure_propagates() {
        let mut gateway = MockDeviceGateway::new();
        gateway
            .expect_adapter_status()
            .times(1)
            .returning(|_| reply(Err(anyhow::anyhow!("device unreachable"))));
        let service = service(gateway, true);

        let result = service
            .wait_until_connected(Instant::now() + CONNECT_TIMEOUT, &CancellationToken::new())
            .await;

        match result {
            Err(ConnectError::Gateway(e)) => assert_eq!(e.to_string(), "device unreachable"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_poll_stops_querying() {
        let mut gateway = MockDeviceGateway::new();
        gateway.expect_adapter_status().never();
        let service = service(gateway, true);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = service
            .wait_until_connected(Instant::now() + CONNECT_TIMEOUT, &cancel)
            .await;

        assert!(matches!(result, Err(ConnectError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_and_wait_uses_working_parameter_set() {
        let (mut gateway, _) = scripted(vec![status(ConnectionState::Connected, "10.0.0.5", None)]);
        gateway
            .expect_connect()
            .withf(|adapter, parameter_set, force| {
                adapter == "wlan0" && *parameter_set == ParameterSet::Working && *force
            })
            .times(1)
            .returning(|_, _, _| reply(Ok(())));
        let service = service(gateway, true);
        let started = Instant::now();

        let result = service
            .connect_and_wait("wlan0", Some(Duration::from_millis(500)), &CancellationToken::new())
            .await;

        assert!(result.is_ok());
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_and_wait_keeps_cancellation_visible() {
        let mut gateway = MockDeviceGateway::new();
        gateway.expect_connect().never();
        let service = service(gateway, true);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = service
            .connect_and_wait("wlan0", Some(Duration::from_millis(500)), &cancel)
            .await
            .unwrap_err();

        assert!(is_cancelled(&err));
    }
}
