use crate::config::ClientOptions;
use crate::identity::AccountIdentity;
use crate::keys::PublicKey;
use crate::net::{HttpClient, HttpRequest};
use log::debug;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

const MOBILE_USER_AGENT: &str = "okhttp/3.12.1";
const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport failure calling {endpoint}: {detail}")]
    Transport { endpoint: String, detail: String },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("malformed response from {endpoint}: {detail}")]
    Malformed { endpoint: String, detail: String },

    #[error("failed to encode request body for {endpoint}: {detail}")]
    Encode { endpoint: String, detail: String },

    #[error("server echoed warp_enabled={got}, requested {want}")]
    EchoMismatch { want: bool, got: bool },

    #[error("device {device_token} missing from activation response")]
    DeviceMissing { device_token: String },
}

/// Account tier reported by the registration service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Free,
    Limited,
    Unlimited,
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Free => f.write_str("free"),
            AccountType::Limited => f.write_str("limited"),
            AccountType::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Result of registering a new device.
#[derive(Debug, Clone)]
pub struct RegisterResult {
    pub account_id: String,
    pub access_token: String,
    pub license_key: String,
}

/// The relay parameters and entitlement state for one device, as reported by
/// the server on a single fetch. Never persisted; derived fields are
/// recomputed on every call.
#[derive(Debug, Clone)]
pub struct RelayConfiguration {
    pub local_address_v4: String,
    pub local_address_v6: String,
    pub endpoint_host: String,
    pub endpoint_v4: String,
    pub endpoint_v6: String,
    pub peer_public_key: String,
    pub warp_enabled: bool,
    pub account_type: AccountType,
    pub warp_plus_enabled: bool,
    /// The server's authoritative license key; absent when the response
    /// carried no account object.
    pub account_license: Option<String>,
    /// True when the server license differs from the locally stored one.
    /// Compared with surrounding whitespace trimmed on both sides.
    pub license_key_stale: bool,
}

// Wire shapes. Account defaulting happens here, at the decoding boundary,
// never inside the reconciler.

#[derive(Deserialize)]
struct RegResponse {
    id: String,
    token: String,
    #[serde(default)]
    account: Option<AccountInfo>,
}

#[derive(Deserialize, Default)]
struct AccountInfo {
    #[serde(default)]
    account_type: AccountType,
    #[serde(default)]
    warp_plus: bool,
    #[serde(default)]
    license: String,
}

#[derive(Deserialize)]
struct ConfigResponse {
    warp_enabled: bool,
    #[serde(default)]
    account: Option<AccountInfo>,
    config: WgSettings,
}

#[derive(Deserialize)]
struct WgSettings {
    interface: InterfaceSettings,
    peers: Vec<PeerSettings>,
}

#[derive(Deserialize)]
struct InterfaceSettings {
    addresses: InterfaceAddresses,
}

#[derive(Deserialize)]
struct InterfaceAddresses {
    v4: String,
    v6: String,
}

#[derive(Deserialize)]
struct PeerSettings {
    public_key: String,
    endpoint: PeerEndpoint,
}

#[derive(Deserialize)]
struct PeerEndpoint {
    host: String,
    v4: String,
    v6: String,
}

#[derive(Deserialize)]
struct WarpFlagResponse {
    warp_enabled: bool,
}

#[derive(Deserialize)]
struct LicenseResponse {
    #[serde(default)]
    warp_plus: bool,
}

#[derive(Deserialize)]
struct DeviceEntry {
    id: String,
    #[serde(default)]
    active: bool,
}

/// Typed wrapper over the registration service's REST endpoints. Stateless
/// besides the bearer token attached per call.
pub struct RelayApiClient {
    http: Arc<dyn HttpClient>,
    options: ClientOptions,
}

impl RelayApiClient {
    pub fn new(http: Arc<dyn HttpClient>, options: ClientOptions) -> Self {
        Self { http, options }
    }

    fn reg_url(&self) -> String {
        format!("{}/reg", self.options.api_base)
    }

    fn config_url(&self, account_id: &str) -> String {
        format!("{}/{}", self.reg_url(), account_id)
    }

    fn account_url(&self, account_id: &str) -> String {
        format!("{}/account", self.config_url(account_id))
    }

    fn with_client_headers(request: HttpRequest) -> HttpRequest {
        request
            .with_header("Accept-Encoding", "gzip")
            .with_header("User-Agent", MOBILE_USER_AGENT)
    }

    fn authorized(request: HttpRequest, identity: &AccountIdentity) -> HttpRequest {
        Self::with_client_headers(request)
            .with_header("Authorization", format!("Bearer {}", identity.access_token))
    }

    fn json_body(
        endpoint: &str,
        request: HttpRequest,
        body: &serde_json::Value,
    ) -> Result<HttpRequest, ApiError> {
        let encoded = serde_json::to_vec(body).map_err(|e| ApiError::Encode {
            endpoint: endpoint.to_string(),
            detail: e.to_string(),
        })?;
        Ok(request
            .with_header("Content-Type", JSON_CONTENT_TYPE)
            .with_body(encoded))
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: HttpRequest,
    ) -> Result<T, ApiError> {
        debug!("{} {}", request.method, request.url);
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| ApiError::Transport {
                endpoint: endpoint.to_string(),
                detail: format!("{e:#}"),
            })?;
        if !response.is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: response.status_code,
            });
        }
        serde_json::from_slice(&response.body).map_err(|e| ApiError::Malformed {
            endpoint: endpoint.to_string(),
            detail: e.to_string(),
        })
    }

    /// Registers a new device and returns its account identity material.
    pub async fn register(
        &self,
        public_key: &PublicKey,
        timestamp: &str,
    ) -> Result<RegisterResult, ApiError> {
        let endpoint = "POST /reg";
        let body = serde_json::json!({
            "install_id": "",
            "tos": timestamp,
            "key": public_key.to_base64(),
            "fcm_token": "",
            "type": "Android",
            "locale": "en_US",
        });
        let request = Self::json_body(
            endpoint,
            Self::with_client_headers(HttpRequest::post(self.reg_url())),
            &body,
        )?;
        let response: RegResponse = self.execute(endpoint, request).await?;
        Ok(RegisterResult {
            account_id: response.id,
            access_token: response.token,
            license_key: response.account.map(|a| a.license).unwrap_or_default(),
        })
    }

    /// Fetches the current relay configuration and entitlement state.
    pub async fn fetch_configuration(
        &self,
        identity: &AccountIdentity,
    ) -> Result<RelayConfiguration, ApiError> {
        let endpoint = "GET /reg/{id}";
        let request = Self::authorized(
            HttpRequest::get(self.config_url(&identity.account_id)),
            identity,
        );
        let response: ConfigResponse = self.execute(endpoint, request).await?;

        let (account_type, warp_plus_enabled, account_license) = match response.account {
            Some(account) => (account.account_type, account.warp_plus, Some(account.license)),
            None => (AccountType::Free, false, None),
        };
        let license_key_stale = account_license
            .as_deref()
            .is_some_and(|license| license.trim() != identity.license_key.trim());

        let peer = response
            .config
            .peers
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Malformed {
                endpoint: endpoint.to_string(),
                detail: "no peers in configuration".to_string(),
            })?;
        let addresses = response.config.interface.addresses;

        Ok(RelayConfiguration {
            local_address_v4: addresses.v4,
            local_address_v6: addresses.v6,
            endpoint_host: peer.endpoint.host,
            endpoint_v4: peer.endpoint.v4,
            endpoint_v6: peer.endpoint.v6,
            peer_public_key: peer.public_key,
            warp_enabled: response.warp_enabled,
            account_type,
            warp_plus_enabled,
            account_license,
            license_key_stale,
        })
    }

    /// Sets the WARP routing flag and asserts the server's echo. A mismatched
    /// echo is a hard failure, never silently retried.
    pub async fn set_warp_enabled(
        &self,
        identity: &AccountIdentity,
        enabled: bool,
    ) -> Result<bool, ApiError> {
        let endpoint = "PATCH /reg/{id}";
        let body = serde_json::json!({ "warp_enabled": enabled });
        let request = Self::json_body(
            endpoint,
            Self::authorized(
                HttpRequest::patch(self.config_url(&identity.account_id)),
                identity,
            ),
            &body,
        )?;
        let response: WarpFlagResponse = self.execute(endpoint, request).await?;
        if response.warp_enabled != enabled {
            return Err(ApiError::EchoMismatch {
                want: enabled,
                got: response.warp_enabled,
            });
        }
        Ok(response.warp_enabled)
    }

    /// Pushes the locally stored license key to the account and returns the
    /// resulting Warp+ entitlement state.
    ///
    /// An `unlimited` account is already fully entitled; this returns `true`
    /// without touching the server in that case.
    pub async fn update_license_key(
        &self,
        identity: &AccountIdentity,
        account_type: AccountType,
    ) -> Result<bool, ApiError> {
        if account_type == AccountType::Unlimited {
            return Ok(true);
        }
        let endpoint = "PUT /reg/{id}/account";
        let body = serde_json::json!({ "license": identity.license_key });
        let request = Self::json_body(
            endpoint,
            Self::authorized(
                HttpRequest::put(self.account_url(&identity.account_id)),
                identity,
            ),
            &body,
        )?;
        let response: LicenseResponse = self.execute(endpoint, request).await?;
        Ok(response.warp_plus)
    }

    /// Looks up this device in the account's device list.
    ///
    /// Returns `None` when the device is absent entirely, which is distinct
    /// from a present-but-inactive device (`Some(false)`).
    pub async fn list_device_activation(
        &self,
        identity: &AccountIdentity,
    ) -> Result<Option<bool>, ApiError> {
        let endpoint = "GET /reg/{id}/account/devices";
        let request = Self::authorized(
            HttpRequest::get(format!("{}/devices", self.account_url(&identity.account_id))),
            identity,
        );
        let devices: Vec<DeviceEntry> = self.execute(endpoint, request).await?;
        Ok(devices
            .into_iter()
            .find(|device| device.id == identity.account_id)
            .map(|device| device.active))
    }

    /// Patches the device activation flag and returns the server-confirmed
    /// state for this device.
    pub async fn set_device_activation(
        &self,
        identity: &AccountIdentity,
        active: bool,
    ) -> Result<bool, ApiError> {
        let endpoint = "PATCH /reg/{id}/account/reg/{device}";
        // The mobile client addresses the device by its account id here.
        // Whether that is a real protocol invariant is unconfirmed, so it is
        // preserved as observed.
        let device_token = identity.account_id.clone();
        let body = serde_json::json!({ "active": active });
        let request = Self::json_body(
            endpoint,
            Self::authorized(
                HttpRequest::patch(format!(
                    "{}/reg/{}",
                    self.account_url(&identity.account_id),
                    device_token
                )),
                identity,
            ),
            &body,
        )?;
        let devices: Vec<DeviceEntry> = self.execute(endpoint, request).await?;
        devices
            .into_iter()
            .find(|device| device.id == identity.account_id)
            .map(|device| device.active)
            .ok_or(ApiError::DeviceMissing { device_token })
    }
}
