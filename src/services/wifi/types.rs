use crate::openlogger_client::{AdapterStatus, RawNetwork, SecurityType, WifiParameters};
use serde::{Deserialize, Serialize};
use serde_valid::Validate;

/// A network discovered by a scan or edited by the user
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDescriptor {
    #[validate(max_length = 32)]
    pub ssid: Option<String>,
    pub bssid: Option<String>,
    pub security_type: Option<SecurityType>,
    pub channel: Option<i64>,
    pub signal_strength: Option<i64>,
}

impl NetworkDescriptor {
    /// Network entered manually by the user
    pub fn custom() -> Self {
        NetworkDescriptor {
            ssid: Some(String::new()),
            bssid: Some(String::new()),
            security_type: Some(SecurityType::Wpa2),
            channel: Some(0),
            signal_strength: Some(0),
        }
    }

    /// Ssid, or the bssid for hidden networks
    pub fn display_name(&self) -> Option<&str> {
        non_empty(self.ssid.as_deref()).or_else(|| non_empty(self.bssid.as_deref()))
    }

    pub fn has_identifier(&self) -> bool {
        self.display_name().is_some()
    }
}

impl From<RawNetwork> for NetworkDescriptor {
    fn from(raw: RawNetwork) -> Self {
        let bssid = raw.bssid.filter(|bssid| !bssid.is_empty());
        let ssid = raw
            .ssid
            .filter(|ssid| !ssid.is_empty())
            .or_else(|| bssid.clone());

        NetworkDescriptor {
            ssid,
            bssid,
            security_type: raw
                .security_type
                .and_then(|security_type| security_type.parse().ok()),
            channel: raw.channel,
            signal_strength: raw.signal_strength,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

/// A network profile persisted on one of the device's storage locations
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedNetworkDescriptor {
    #[serde(flatten)]
    pub network: NetworkDescriptor,
    pub storage_location: String,
    pub auto_connect: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WepKeyMaterial {
    #[validate(max_items = 4)]
    pub keys: Vec<String>,
    #[validate(maximum = 3)]
    pub key_index: u8,
}

impl WepKeyMaterial {
    /// Key slots in the colon-delimited form the device expects
    pub fn joined(&self) -> String {
        self.keys.join(":")
    }
}

fn enabled() -> bool {
    true
}

/// Everything the user entered on the configuration view
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    #[validate]
    pub network: NetworkDescriptor,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    #[validate]
    pub wep: WepKeyMaterial,
    #[serde(default = "enabled")]
    pub auto_connect: bool,
    #[serde(default = "enabled")]
    pub save: bool,
    #[serde(default = "enabled")]
    pub connect_now: bool,
    #[serde(default)]
    pub custom: bool,
}

impl NetworkRequest {
    pub fn new(network: NetworkDescriptor) -> Self {
        NetworkRequest {
            network,
            password: String::new(),
            wep: WepKeyMaterial::default(),
            auto_connect: true,
            save: true,
            connect_now: true,
            custom: false,
        }
    }

    /// Auto connect only makes sense for networks that get saved
    pub fn effective_auto_connect(&self) -> bool {
        self.save && self.auto_connect
    }

    /// Parameters for `wifiSetParameters` given the resolved security type
    pub fn parameters(&self, security_type: SecurityType) -> WifiParameters {
        let ssid = self.network.display_name().unwrap_or_default().to_string();

        let (passphrase, keys, key_index) = match security_type {
            SecurityType::Open => (Some(String::new()), None, None),
            SecurityType::Wpa | SecurityType::Wpa2 => (Some(self.password.clone()), None, None),
            SecurityType::Wep40 | SecurityType::Wep104 => {
                (None, Some(self.wep.joined()), Some(self.wep.key_index))
            }
        };

        WifiParameters {
            ssid,
            security_type,
            auto_connect: self.effective_auto_connect(),
            passphrase,
            keys,
            key_index,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum View {
    #[default]
    Networks,
    Configure,
}

/// How the owning view should be left
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "status")]
pub enum Dismissal {
    ToDeviceManager,
    WithStatus(Option<AdapterStatus>),
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "reason", content = "detail")]
pub enum Rejection {
    Duplicate,
    MissingIdentifier,
    Invalid(String),
    Busy,
    ConfirmationRequired,
    NoSuchSavedNetwork,
    NotModifying,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "detail")]
pub enum WorkflowOutcome {
    #[default]
    Completed,
    Rejected(Rejection),
    Failed(String),
    Cancelled,
}

/// Result of a workflow as seen by the presentation shell
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReport {
    pub outcome: WorkflowOutcome,
    /// Failures of follow-up steps that did not change the outcome
    pub secondary_failures: Vec<String>,
    pub dismissal: Option<Dismissal>,
}

impl WorkflowReport {
    pub fn rejected(rejection: Rejection) -> Self {
        WorkflowReport {
            outcome: WorkflowOutcome::Rejected(rejection),
            ..Default::default()
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == WorkflowOutcome::Completed
    }
}

/// Session state owned by the orchestrator
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiState {
    pub adapters: Vec<String>,
    pub selected_adapter: String,
    pub adapter_status: Option<AdapterStatus>,
    pub storage_locations: Vec<String>,
    pub selected_storage_location: String,
    pub available_networks: Vec<NetworkDescriptor>,
    pub saved_networks: Vec<SavedNetworkDescriptor>,
    pub selected_network: Option<NetworkDescriptor>,
    pub modifying: Option<SavedNetworkDescriptor>,
    pub custom_network: bool,
    pub scanning: bool,
    pub scan_attempts: u32,
    pub status_message: String,
    pub loading: Option<String>,
    pub view: View,
}

pub const NO_SELECTION: &str = "None";
pub const READY: &str = "Ready";

impl Default for WifiState {
    fn default() -> Self {
        WifiState {
            adapters: vec![NO_SELECTION.to_string()],
            selected_adapter: NO_SELECTION.to_string(),
            adapter_status: None,
            storage_locations: vec![NO_SELECTION.to_string()],
            selected_storage_location: NO_SELECTION.to_string(),
            available_networks: vec![],
            saved_networks: vec![],
            selected_network: None,
            modifying: None,
            custom_network: false,
            scanning: false,
            scan_attempts: 0,
            status_message: READY.to_string(),
            loading: None,
            view: View::Networks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(ssid: Option<&str>, bssid: Option<&str>) -> RawNetwork {
        RawNetwork {
            ssid: ssid.map(String::from),
            bssid: bssid.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn empty_ssid_falls_back_to_bssid() {
        let network = NetworkDescriptor::from(raw(Some(""), Some("aa:bb:cc:dd:ee:ff")));
        assert_eq!(network.ssid.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(network.display_name(), Some("aa:bb:cc:dd:ee:ff"));

        let network = NetworkDescriptor::from(raw(None, Some("aa:bb:cc:dd:ee:ff")));
        assert_eq!(network.display_name(), Some("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn unknown_security_types_become_none() {
        let network = NetworkDescriptor::from(RawNetwork {
            ssid: Some("Lab".to_string()),
            security_type: Some("wpa2-enterprise".to_string()),
            ..Default::default()
        });
        assert_eq!(network.security_type, None);
    }

    #[test]
    fn custom_network_has_no_identifier() {
        assert!(!NetworkDescriptor::custom().has_identifier());
        assert_eq!(
            NetworkDescriptor::custom().security_type,
            Some(SecurityType::Wpa2)
        );
    }

    #[test]
    fn wep_keys_are_colon_joined() {
        let wep = WepKeyMaterial {
            keys: vec!["k0".into(), "k1".into(), "".into(), "k3".into()],
            key_index: 3,
        };
        assert_eq!(wep.joined(), "k0:k1::k3");
    }

    mod parameters {
        use super::*;

        fn request(security_type: SecurityType) -> NetworkRequest {
            let mut request = NetworkRequest::new(NetworkDescriptor {
                ssid: Some("Lab".to_string()),
                security_type: Some(security_type),
                ..Default::default()
            });
            request.password = "secret".to_string();
            request.wep = WepKeyMaterial {
                keys: vec!["k0".into(), "k1".into()],
                key_index: 1,
            };
            request
        }

        #[test]
        fn open_networks_send_empty_passphrase() {
            let parameters = request(SecurityType::Open).parameters(SecurityType::Open);
            assert_eq!(parameters.passphrase.as_deref(), Some(""));
            assert_eq!(parameters.keys, None);
        }

        #[test]
        fn wpa_networks_send_password() {
            let parameters = request(SecurityType::Wpa2).parameters(SecurityType::Wpa2);
            assert_eq!(parameters.passphrase.as_deref(), Some("secret"));
            assert_eq!(parameters.key_index, None);
        }

        #[test]
        fn wep_networks_send_keys_and_index() {
            let parameters = request(SecurityType::Wep104).parameters(SecurityType::Wep104);
            assert_eq!(parameters.passphrase, None);
            assert_eq!(parameters.keys.as_deref(), Some("k0:k1"));
            assert_eq!(parameters.key_index, Some(1));
        }

        #[test]
        fn auto_connect_requires_save() {
            let mut request = request(SecurityType::Wpa);
            request.save = false;
            assert!(!request.parameters(SecurityType::Wpa).auto_connect);
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn rejects_long_ssid() {
            let request = NetworkRequest::new(NetworkDescriptor {
                ssid: Some("x".repeat(33)),
                ..Default::default()
            });
            assert!(request.validate().is_err());
        }

        #[test]
        fn rejects_too_many_wep_keys() {
            let mut request = NetworkRequest::new(NetworkDescriptor {
                ssid: Some("Lab".to_string()),
                ..Default::default()
            });
            request.wep.keys = vec!["k".to_string(); 5];
            assert!(request.validate().is_err());
        }

        #[test]
        fn rejects_out_of_range_key_index() {
            let mut request = NetworkRequest::new(NetworkDescriptor {
                ssid: Some("Lab".to_string()),
                ..Default::default()
            });
            request.wep.key_index = 4;
            assert!(request.validate().is_err());
        }

        #[test]
        fn accepts_regular_request() {
            let request = NetworkRequest::new(NetworkDescriptor {
                ssid: Some("Lab".to_string()),
                security_type: Some(SecurityType::Wpa2),
                ..Default::default()
            });
            assert!(request.validate().is_ok());
        }
    }
}
