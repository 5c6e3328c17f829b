// Tablet HTTP client
//
// Wraps `reqwest::Client` with tablet URL construction, status mapping,
// and JSON decoding. Holds no state beyond the HTTP client itself.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::models::{
    DeviceList, DiscoveryInfo, ErrorBody, RawDevice, RelayAck, SetStateBody, TabletStatus,
};
use crate::transport::TransportConfig;

/// Raw HTTP client for a single tablet's local API.
///
/// Cheap to clone: `reqwest::Client` is reference-counted internally.
#[derive(Debug, Clone)]
pub struct TabletClient {
    http: reqwest::Client,
    base_url: Url,
}

impl TabletClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the tablet root, e.g. `http://192.168.1.50:8123`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Build the tablet root URL from host and port.
    pub fn base_url_for(host: &str, port: u16) -> Result<Url, Error> {
        Ok(Url::parse(&format!("http://{host}:{port}"))?)
    }

    /// The tablet base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /api/status`: liveness probe.
    pub async fn status(&self) -> Result<TabletStatus, Error> {
        self.get(self.api_url("status")?).await
    }

    /// `GET /api/discover`: the tablet's self-description, including
    /// whether it requires an access key.
    pub async fn discover(&self) -> Result<DiscoveryInfo, Error> {
        self.get(self.api_url("discover")?).await
    }

    /// `GET /api/devices`: every relay with its current state, in the
    /// order the tablet lists them. Records that cannot be read are
    /// skipped with a warning; the rest of the list still comes back.
    pub async fn list_devices(&self) -> Result<Vec<RawDevice>, Error> {
        let list: DeviceList = self.get(self.api_url("devices")?).await?;
        let devices = list
            .devices
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<RawDevice>(record) {
                Ok(device) => Some(device),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable device record");
                    None
                }
            })
            .collect();
        Ok(devices)
    }

    /// `GET /api/device/{id}`: a single relay.
    pub async fn get_device(&self, id: &str) -> Result<RawDevice, Error> {
        self.get(self.api_url(&format!("device/{id}"))?).await
    }

    /// `POST /api/relay/{id}/state`: drive a relay on or off.
    pub async fn set_relay_state(&self, id: &str, on: bool) -> Result<RelayAck, Error> {
        let url = self.api_url(&format!("relay/{id}/state"))?;
        self.post(url, &SetStateBody { state: on }).await
    }

    /// `POST /api/relay/{id}/toggle`: flip a relay.
    pub async fn toggle_relay(&self, id: &str) -> Result<RelayAck, Error> {
        let url = self.api_url(&format!("relay/{id}/toggle"))?;
        self.post(url, &serde_json::json!({})).await
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/api/{path}`.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/api/{path}"))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;

        Self::parse_response(resp).await
    }

    async fn post<T: DeserializeOwned>(&self, url: Url, body: &impl Serialize) -> Result<T, Error> {
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;

        Self::parse_response(resp).await
    }

    /// Map the status code, then decode the body.
    ///
    /// 401/403 become [`Error::Unauthorized`]; any other non-2xx becomes
    /// [`Error::Http`] carrying the tablet's `message` when it sent one.
    async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Unauthorized {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("Unknown error")
                        .to_owned()
                });
            return Err(Error::Http {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}
