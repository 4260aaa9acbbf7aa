use crate::{
    config::AppConfig,
    http_client::{device_client, handle_http_response},
};
use anyhow::{Context, Result};
use log::{debug, info};
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error;
use trait_variant::make;

/// Reason code the device reports while it is still busy with a previous request
pub const STILL_WORKING_REASON: i64 = 4;

/// Ip address reported by an adapter without a lease
pub const NO_IP_ADDRESS: &str = "none";

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Connecting,
    #[default]
    Disconnected,
    #[serde(other)]
    Unknown,
}

impl ConnectionState {
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Connecting)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityType {
    Wpa2,
    Wpa,
    Wep40,
    Wep104,
    Open,
}

impl SecurityType {
    pub fn is_wep(self) -> bool {
        matches!(self, SecurityType::Wep40 | SecurityType::Wep104)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SecurityType::Wpa2 => "wpa2",
            SecurityType::Wpa => "wpa",
            SecurityType::Wep40 => "wep40",
            SecurityType::Wep104 => "wep104",
            SecurityType::Open => "open",
        }
    }
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown security type: {0}")]
pub struct UnknownSecurityType(String);

impl FromStr for SecurityType {
    type Err = UnknownSecurityType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wpa2" => Ok(SecurityType::Wpa2),
            "wpa" => Ok(SecurityType::Wpa),
            "wep40" => Ok(SecurityType::Wep40),
            "wep104" => Ok(SecurityType::Wep104),
            "open" => Ok(SecurityType::Open),
            other => Err(UnknownSecurityType(other.to_string())),
        }
    }
}

/// Wireless configuration slot on the device
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ParameterSet {
    #[serde(rename = "activeParameterSet")]
    Active,
    #[serde(rename = "workingParameterSet")]
    Working,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterStatus {
    #[serde(default)]
    pub status_code: i64,
    #[serde(default)]
    pub adapter: String,
    #[serde(default)]
    pub status: ConnectionState,
    #[serde(default = "no_ip_address")]
    pub ip_address: String,
    pub ssid: Option<String>,
    pub security_type: Option<String>,
    pub reason: Option<i64>,
}

fn no_ip_address() -> String {
    NO_IP_ADDRESS.to_string()
}

impl AdapterStatus {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionState::Connected && self.ip_address != NO_IP_ADDRESS
    }
}

/// Network entry as returned by `wifiReadScannedNetworks`
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNetwork {
    pub ssid: Option<String>,
    pub bssid: Option<String>,
    pub security_type: Option<String>,
    pub channel: Option<i64>,
    pub signal_strength: Option<i64>,
}

/// Parameter set entry as returned by `wifiListSavedParameters`
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedParameterSet {
    pub ssid: String,
    pub security_type: Option<String>,
    #[serde(default)]
    pub auto_connect: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiParameters {
    pub ssid: String,
    pub security_type: SecurityType,
    pub auto_connect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_index: Option<u8>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct LoadedParameters {
    /// Milliseconds the device needs before it accepts the next command
    #[serde(default)]
    pub wait: u64,
}

/// A command the device answered with a non-zero status code
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{command} rejected by device with status code {status_code} (reason: {reason:?})")]
pub struct CommandError {
    pub command: String,
    pub status_code: i64,
    pub reason: Option<i64>,
}

impl CommandError {
    pub fn is_still_working(&self) -> bool {
        self.reason == Some(STILL_WORKING_REASON)
    }
}

/// Whether `err` (or anything in its chain) is a still-working rejection
pub fn is_still_working(err: &anyhow::Error) -> bool {
    err.downcast_ref::<CommandError>()
        .is_some_and(CommandError::is_still_working)
}

#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait DeviceGateway {
    async fn list_adapters(&self) -> Result<Vec<String>>;
    async fn storage_locations(&self) -> Result<Vec<String>>;
    async fn adapter_status(&self, adapter: &str) -> Result<AdapterStatus>;
    async fn scan(&self, adapter: &str) -> Result<()>;
    async fn read_scan_results(&self, adapter: &str) -> Result<Vec<RawNetwork>>;
    async fn set_parameters(&self, adapter: &str, parameters: WifiParameters) -> Result<()>;
    async fn connect(
        &self,
        adapter: &str,
        parameter_set: ParameterSet,
        force: bool,
    ) -> Result<()>;
    async fn disconnect(&self, adapter: &str) -> Result<()>;
    async fn save_parameters(&self, storage_location: &str) -> Result<()>;
    async fn load_parameters(
        &self,
        storage_location: &str,
        ssid: &str,
    ) -> Result<LoadedParameters>;
    async fn list_saved_parameters(
        &self,
        storage_location: &str,
    ) -> Result<Vec<SavedParameterSet>>;
    async fn delete_saved_parameters(&self, storage_location: &str, ssid: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct NicList {
    nics: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageLocations {
    storage_locations: Vec<String>,
}

#[derive(Deserialize)]
struct ScannedNetworks {
    #[serde(default)]
    networks: Vec<RawNetwork>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedParameterSets {
    #[serde(default)]
    parameter_set: Vec<SavedParameterSet>,
}

#[derive(Deserialize)]
struct CommandResponse {
    device: Vec<Value>,
}

#[derive(Clone)]
pub struct OpenLoggerClient {
    client: Client,
    url: String,
}

impl OpenLoggerClient {
    pub fn new() -> Result<Self> {
        let config = &AppConfig::get().device;
        Self::with_url(&config.url, config.request_timeout)
    }

    pub fn with_url(url: &str, request_timeout: Duration) -> Result<Self> {
        let client = device_client(request_timeout)?;

        Ok(OpenLoggerClient {
            client,
            url: Self::normalize_url(url),
        })
    }

    fn normalize_url(url: &str) -> String {
        format!("{}/", url.trim_end_matches('/'))
    }

    fn request_body(command: &str, args: Value) -> Value {
        let mut entry = json!({ "command": command });
        if let (Some(entry), Value::Object(args)) = (entry.as_object_mut(), args) {
            entry.extend(args);
        }
        json!({ "device": [entry] })
    }

    /// Send a command and return the first `device` entry of the response
    ///
    /// With `check_status` set, a non-zero `statusCode` is turned into a
    /// [`CommandError`].
    async fn send(&self, command: &str, args: Value, check_status: bool) -> Result<Value> {
        let body = Self::request_body(command, args);
        info!("POST {} {command}", self.url);
        debug!("request body: {body}");

        let res = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context(format!("failed to send {command} command to {}", self.url))?;

        let text = handle_http_response(res, &format!("{command} command")).await?;
        debug!("response body: {text}");

        let response: CommandResponse = serde_json::from_str(&text)
            .context(format!("failed to parse {command} response"))?;

        let entry = response
            .device
            .into_iter()
            .next()
            .context(format!("{command} response contains no device entry"))?;

        if check_status {
            let status_code = entry.get("statusCode").and_then(Value::as_i64).unwrap_or(0);
            if status_code != 0 {
                return Err(CommandError {
                    command: command.to_string(),
                    status_code,
                    reason: entry.get("reason").and_then(Value::as_i64),
                }
                .into());
            }
        }

        Ok(entry)
    }

    async fn command<T: DeserializeOwned>(&self, command: &str, args: Value) -> Result<T> {
        let entry = self.send(command, args, true).await?;
        serde_json::from_value(entry).context(format!("failed to parse {command} payload"))
    }

    async fn acknowledge(&self, command: &str, args: Value) -> Result<()> {
        self.send(command, args, true).await.map(|_| ())
    }
}

impl DeviceGateway for OpenLoggerClient {
    async fn list_adapters(&self) -> Result<Vec<String>> {
        let list: NicList = self.command("nicList", json!({})).await?;
        Ok(list.nics)
    }

    async fn storage_locations(&self) -> Result<Vec<String>> {
        let locations: StorageLocations = self.command("storageGetLocations", json!({})).await?;
        Ok(locations.storage_locations)
    }

    async fn adapter_status(&self, adapter: &str) -> Result<AdapterStatus> {
        // the status code is part of the payload and judged by the caller
        let entry = self
            .send("nicGetStatus", json!({ "adapter": adapter }), false)
            .await?;
        serde_json::from_value(entry).context("failed to parse nicGetStatus payload")
    }

    async fn scan(&self, adapter: &str) -> Result<()> {
        self.acknowledge("wifiScan", json!({ "adapter": adapter }))
            .await
    }

    async fn read_scan_results(&self, adapter: &str) -> Result<Vec<RawNetwork>> {
        let scanned: ScannedNetworks = self
            .command("wifiReadScannedNetworks", json!({ "adapter": adapter }))
            .await?;
        Ok(scanned.networks)
    }

    async fn set_parameters(&self, adapter: &str, parameters: WifiParameters) -> Result<()> {
        let mut args = serde_json::to_value(&parameters)
            .context("failed to serialize wifi parameters")?;
        if let Some(args) = args.as_object_mut() {
            args.insert("adapter".to_string(), json!(adapter));
        }
        self.acknowledge("wifiSetParameters", args).await
    }

    async fn connect(
        &self,
        adapter: &str,
        parameter_set: ParameterSet,
        force: bool,
    ) -> Result<()> {
        self.acknowledge(
            "nicConnect",
            json!({ "adapter": adapter, "parameterSet": parameter_set, "force": force }),
        )
        .await
    }

    async fn disconnect(&self, adapter: &str) -> Result<()> {
        self.acknowledge("nicDisconnect", json!({ "adapter": adapter }))
            .await
    }

    async fn save_parameters(&self, storage_location: &str) -> Result<()> {
        self.acknowledge(
            "wifiSaveParameters",
            json!({ "storageLocation": storage_location }),
        )
        .await
    }

    async fn load_parameters(&self, storage_location: &str, ssid: &str) -> Result<LoadedParameters> {
        self.command(
            "wifiLoadParameters",
            json!({ "storageLocation": storage_location, "ssid": ssid }),
        )
        .await
    }

    async fn list_saved_parameters(&self, storage_location: &str) -> Result<Vec<SavedParameterSet>> {
        let saved: SavedParameterSets = self
            .command(
                "wifiListSavedParameters",
                json!({ "storageLocation": storage_location }),
            )
            .await?;
        Ok(saved.parameter_set)
    }

    async fn delete_saved_parameters(&self, storage_location: &str, ssid: &str) -> Result<()> {
        self.acknowledge(
            "wifiDeleteParameters",
            json!({ "storageLocation": storage_location, "ssid": ssid }),
        )
        .await
    }
}
