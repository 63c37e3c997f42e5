use std::{sync::Arc, time::Duration};

use log::*;
use rand::{distributions::Alphanumeric, Rng};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::GatewayConfig,
    data_objects::{GatewayIntent, GatewayPayout, NewIntentRequest, NewPayoutRequest},
    GatewayApiError,
};

/// Generates a fresh idempotency key for a gateway call. Every retry of a user-level operation
/// gets a new key; keys are only reused when replaying the exact same gateway request.
pub fn new_idempotency_key() -> String {
    let suffix: String = rand::thread_rng().sample_iter(&Alphanumeric).take(24).map(char::from).collect();
    format!("idk-{suffix}")
}

#[derive(Clone)]
pub struct GatewayApi {
    config: GatewayConfig,
    client: Arc<Client>,
}

impl GatewayApi {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(config.api_key.reveal().as_str())
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        headers.insert("X-Api-Key", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    /// One round trip to the gateway. No retries here; transient failures surface to the caller,
    /// and the reconciliation sweeps pick up anything that fell through.
    async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        idempotency_key: Option<&str>,
        body: Option<B>,
    ) -> Result<T, GatewayApiError> {
        let url = self.url(path);
        trace!("🌐️ Sending gateway request: {url}");
        let mut req = self.client.request(method, url);
        if let Some(key) = idempotency_key {
            req = req.header("Idempotency-Key", key);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| GatewayApiError::RequestError(e.to_string()))?;
        if response.status().is_success() {
            trace!("🌐️ Gateway request successful. {}", response.status());
            response.json::<T>().await.map_err(|e| GatewayApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| GatewayApiError::RequestError(e.to_string()))?;
            Err(GatewayApiError::QueryError { status, message })
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Creates a collection (pay-in) intent. The returned reference is the join key for webhooks
    /// and status polls.
    pub async fn create_intent(
        &self,
        request: &NewIntentRequest,
        idempotency_key: &str,
    ) -> Result<GatewayIntent, GatewayApiError> {
        if !self.config.is_configured() {
            return Err(GatewayApiError::NotConfigured);
        }
        debug!("🌐️ Creating payment intent for {}", request.amount);
        let intent =
            self.rest_query::<GatewayIntent, _>(Method::POST, "/intents", Some(idempotency_key), Some(request)).await?;
        info!("🌐️ Created payment intent {} ({})", intent.reference, intent.status);
        Ok(intent)
    }

    /// Creates a disbursement (payout) to a mobile-money account.
    pub async fn create_payout(
        &self,
        request: &NewPayoutRequest,
        idempotency_key: &str,
    ) -> Result<GatewayPayout, GatewayApiError> {
        if !self.config.is_configured() {
            return Err(GatewayApiError::NotConfigured);
        }
        debug!("🌐️ Creating payout of {} to {}", request.amount, request.msisdn);
        let payout =
            self.rest_query::<GatewayPayout, _>(Method::POST, "/payouts", Some(idempotency_key), Some(request)).await?;
        info!("🌐️ Created payout {} ({})", payout.reference, payout.status);
        Ok(payout)
    }

    pub async fn poll_intent(&self, reference: &str) -> Result<GatewayIntent, GatewayApiError> {
        let path = format!("/intents/{reference}");
        trace!("🌐️ Polling intent {reference}");
        self.rest_query::<GatewayIntent, ()>(Method::GET, &path, None, None).await.map_err(|e| match e {
            GatewayApiError::QueryError { status: 404, .. } => GatewayApiError::ReferenceNotFound(reference.into()),
            e => e,
        })
    }

    pub async fn poll_payout(&self, reference: &str) -> Result<GatewayPayout, GatewayApiError> {
        let path = format!("/payouts/{reference}");
        trace!("🌐️ Polling payout {reference}");
        self.rest_query::<GatewayPayout, ()>(Method::GET, &path, None, None).await.map_err(|e| match e {
            GatewayApiError::QueryError { status: 404, .. } => GatewayApiError::ReferenceNotFound(reference.into()),
            e => e,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn idempotency_keys_are_unique() {
        let a = new_idempotency_key();
        let b = new_idempotency_key();
        assert_ne!(a, b);
        assert!(a.starts_with("idk-"));
        assert_eq!(a.len(), 28);
    }

    #[test]
    fn url_building() {
        let config = GatewayConfig { base_url: "https://pay.example.com/".into(), ..Default::default() };
        let api = GatewayApi::new(config).unwrap();
        assert_eq!(api.url("/intents/PAY-1"), "https://pay.example.com/v1/intents/PAY-1");
    }
}
