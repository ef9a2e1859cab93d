//! HTTP/JSON implementation of [`DaqBackend`].

use super::types::{error_detail, RelayStatesRequest, RelaysListResponse};
use super::{AdcCapture, AdcStatus, DaqBackend, DevicesResponse, DischargeRequest, StartAdcRequest};
use crate::config::BackendConfig;
use crate::error::{AppResult, DaqError};
use crate::relay_map::RelayId;
use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::client::HttpConnector;
use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::{Body, Client, Method, Request, Uri};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Client for the control service over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client<HttpConnector>,
    base: Url,
    timeout: Duration,
}

impl HttpBackend {
    /// Create a client for `base_url` (e.g. `http://localhost:8000`).
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base,
            timeout,
        })
    }

    /// Create a client from the `[backend]` configuration section.
    pub fn from_config(config: &BackendConfig) -> AppResult<Self> {
        Self::new(&config.base_url, config.request_timeout())
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint_url(&self, path: &str, query: &[(&str, String)]) -> AppResult<Url> {
        let mut url = self.base.join(path.trim_start_matches('/'))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Vec<u8>>,
    ) -> AppResult<Bytes> {
        let url = self.endpoint_url(path, query)?;
        let uri: Uri = url.as_str().parse()?;

        let builder = Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(ACCEPT, "application/json");
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body))?,
            None => builder.body(Body::empty())?,
        };

        debug!(%method, %url, "backend request");
        let exchange = async {
            let response = self.client.request(request).await?;
            let status = response.status();
            let bytes = hyper::body::to_bytes(response.into_body()).await?;
            Ok::<_, DaqError>((status, bytes))
        };
        let (status, bytes) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| DaqError::Timeout(path.to_string()))??;
        debug!(%method, path, status = status.as_u16(), "backend response");

        if !status.is_success() {
            return Err(DaqError::RemoteStatus {
                endpoint: path.to_string(),
                status: status.as_u16(),
                detail: error_detail(&bytes),
            });
        }
        Ok(bytes)
    }

    async fn post(&self, path: &str) -> AppResult<Bytes> {
        self.send(Method::POST, path, &[], None).await
    }

    async fn post_json<T: Serialize + Sync>(&self, path: &str, body: &T) -> AppResult<Bytes> {
        let body = serde_json::to_vec(body)?;
        self.send(Method::POST, path, &[], Some(body)).await
    }

    async fn get(&self, path: &str) -> AppResult<Bytes> {
        self.send(Method::GET, path, &[], None).await
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> AppResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

#[async_trait]
impl DaqBackend for HttpBackend {
    async fn disable_enabled_relays(&self) -> AppResult<()> {
        self.post("/api/relays/disable-enabled").await.map(|_| ())
    }

    async fn discharge_capacitor(&self, request: &DischargeRequest) -> AppResult<()> {
        self.post_json("/api/discharge-capacitor", request)
            .await
            .map(|_| ())
    }

    async fn set_relays(&self, states: &BTreeMap<RelayId, bool>) -> AppResult<()> {
        let body = RelayStatesRequest {
            relay_states: states.clone(),
        };
        self.post_json("/api/relays/multiple", &body).await.map(|_| ())
    }

    async fn set_relay(&self, relay: &RelayId, state: bool) -> AppResult<()> {
        let path = format!("/api/relay/{}/{}", relay, state);
        self.post(&path).await.map(|_| ())
    }

    async fn start_adc(&self, request: &StartAdcRequest) -> AppResult<()> {
        self.send(Method::POST, "/api/start-read-adc", &request.query(), None)
            .await
            .map(|_| ())
    }

    async fn stop_adc(&self) -> AppResult<AdcCapture> {
        decode(&self.post("/api/stop-read-adc").await?)
    }

    async fn adc_status(&self) -> AppResult<AdcStatus> {
        decode(&self.get("/api/adc-status").await?)
    }

    async fn disable_all_relays(&self) -> AppResult<()> {
        self.post("/api/relays/disable-all").await.map(|_| ())
    }

    async fn devices(&self) -> AppResult<DevicesResponse> {
        decode(&self.get("/api/devices").await?)
    }

    async fn relays(&self) -> AppResult<Vec<RelayId>> {
        let list: RelaysListResponse = decode(&self.get("/api/relays").await?)?;
        Ok(list.relays)
    }

    async fn charge_capacitor(&self) -> AppResult<()> {
        self.post("/api/charge-capacitor").await.map(|_| ())
    }

    async fn read_daq(&self, samples: u32, sample_rate: u32) -> AppResult<AdcCapture> {
        let query = [
            ("samples", samples.to_string()),
            ("sample_rate", sample_rate.to_string()),
        ];
        decode(&self.send(Method::POST, "/api/read-daq", &query, None).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_resolve_under_base_path() {
        let backend = HttpBackend::new("http://daq.local:8000/lab", Duration::from_secs(1)).unwrap();
        let url = backend.endpoint_url("/api/adc-status", &[]).unwrap();
        assert_eq!(url.as_str(), "http://daq.local:8000/lab/api/adc-status");
    }

    #[test]
    fn start_query_is_encoded() {
        let backend = HttpBackend::new("http://localhost:8000", Duration::from_secs(1)).unwrap();
        let request = StartAdcRequest {
            samples: 1000,
            sample_rate: 200,
            measurement_time: 5.0,
        };
        let url = backend
            .endpoint_url("/api/start-read-adc", &request.query())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/start-read-adc?samples=1000&sample_rate=200&measurement_time=5"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            HttpBackend::new("not a url", Duration::from_secs(1)),
            Err(DaqError::UrlParse(_))
        ));
    }
}
