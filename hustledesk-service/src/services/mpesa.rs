//! Safaricom Daraja client.
//!
//! Covers OAuth token caching, Lipa na M-Pesa Online (STK push) and the STK
//! status query. Callback payloads are parsed in `dtos::mpesa`.

use crate::config::MpesaConfig;
use crate::services::metrics::record_upstream;
use crate::utils::{mpesa_timestamp, normalize_msisdn};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const TOKEN_TTL: Duration = Duration::from_secs(55 * 60);
const PROVIDER: &str = "mpesa";

#[derive(Debug, thiserror::Error)]
pub enum MpesaError {
    #[error("M-Pesa is not configured")]
    NotConfigured,
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),
    #[error("M-Pesa request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("M-Pesa rejected the request: {0}")]
    Rejected(String),
}

impl From<MpesaError> for AppError {
    fn from(err: MpesaError) -> Self {
        match err {
            MpesaError::NotConfigured => AppError::ServiceUnavailable(err.to_string()),
            MpesaError::InvalidPhone(_) => AppError::BadRequest(anyhow::anyhow!(err.to_string())),
            MpesaError::Transport(_) | MpesaError::Rejected(_) => {
                AppError::BadGateway(err.to_string())
            }
        }
    }
}

/// Parameters for a customer PayBill prompt.
#[derive(Debug, Clone)]
pub struct StkPush<'a> {
    pub phone: &'a str,
    /// Whole shillings.
    pub amount: i64,
    pub account_reference: &'a str,
    pub description: &'a str,
    pub callback_url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    transaction_type: &'static str,
    amount: i64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    account_reference: &'a str,
    transaction_desc: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkQueryBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkPushAccepted {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
    /// Full upstream body, stored with the pending transaction.
    #[serde(skip)]
    pub raw: serde_json::Value,
    /// Normalized number the prompt was sent to.
    #[serde(skip)]
    pub msisdn: String,
}

#[derive(Debug, Clone)]
pub struct StkQueryResult {
    pub result_code: Option<String>,
    pub result_desc: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

struct CachedToken {
    value: Secret<String>,
    expires_at: Instant,
}

/// Daraja API client. Cheap to clone; clones share the token cache.
#[derive(Clone)]
pub struct MpesaClient {
    client: Client,
    config: MpesaConfig,
    token: Arc<RwLock<Option<CachedToken>>>,
}

struct Credentials<'a> {
    key: &'a str,
    secret: &'a str,
    shortcode: &'a str,
    passkey: &'a str,
}

fn json_code(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl MpesaClient {
    pub fn new(config: MpesaConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            config,
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// Key, secret, shortcode and passkey are all required.
    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }

    fn credentials(&self) -> Option<Credentials<'_>> {
        Some(Credentials {
            key: self.config.consumer_key.as_ref()?.expose_secret(),
            secret: self.config.consumer_secret.as_ref()?.expose_secret(),
            shortcode: self.config.shortcode.as_deref()?,
            passkey: self.config.passkey.as_ref()?.expose_secret(),
        })
    }

    /// Shared token appended to callback URLs, if configured.
    pub fn callback_token(&self) -> Option<&str> {
        self.config.callback_token.as_ref().map(|t| t.expose_secret().as_str())
    }

    /// base64(shortcode + passkey + timestamp)
    pub fn password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
        STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
    }

    async fn access_token(&self, creds: &Credentials<'_>) -> Result<String, MpesaError> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
                return Ok(token.value.expose_secret().clone());
            }
        }

        let mut cached = self.token.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.value.expose_secret().clone());
        }

        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url
        );
        let response = self
            .client
            .get(&url)
            .basic_auth(creds.key, Some(creds.secret))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            record_upstream(PROVIDER, "oauth", false);
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "M-Pesa token request failed");
            return Err(MpesaError::Rejected(format!("token request returned {}", status)));
        }

        let token: TokenResponse = response.json().await?;
        record_upstream(PROVIDER, "oauth", true);
        tracing::debug!("M-Pesa access token refreshed");

        *cached = Some(CachedToken {
            value: Secret::new(token.access_token.clone()),
            expires_at: Instant::now() + TOKEN_TTL,
        });

        Ok(token.access_token)
    }

    /// Send a payment prompt to the customer's phone.
    pub async fn stk_push(&self, push: StkPush<'_>) -> Result<StkPushAccepted, MpesaError> {
        let creds = self.credentials().ok_or(MpesaError::NotConfigured)?;
        let msisdn = normalize_msisdn(push.phone)
            .ok_or_else(|| MpesaError::InvalidPhone(push.phone.to_string()))?;

        let token = self.access_token(&creds).await?;
        let timestamp = mpesa_timestamp(Utc::now());

        let body = StkPushBody {
            business_short_code: creds.shortcode,
            password: Self::password(creds.shortcode, creds.passkey, &timestamp),
            timestamp,
            transaction_type: "CustomerPayBillOnline",
            amount: push.amount,
            party_a: &msisdn,
            party_b: creds.shortcode,
            phone_number: &msisdn,
            callback_url: push.callback_url,
            account_reference: push.account_reference,
            transaction_desc: push.description,
        };

        let url = format!("{}/mpesa/stkpush/v1/processrequest", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw: serde_json::Value = response.json().await.unwrap_or_default();

        if !status.is_success() {
            record_upstream(PROVIDER, "stk_push", false);
            let message = raw
                .get("errorMessage")
                .and_then(|m| m.as_str())
                .unwrap_or("STK push failed")
                .to_string();
            tracing::error!(status = %status, error = %message, "M-Pesa STK push rejected");
            return Err(MpesaError::Rejected(message));
        }

        let mut accepted: StkPushAccepted = serde_json::from_value(raw.clone())
            .map_err(|e| MpesaError::Rejected(format!("unexpected STK response: {}", e)))?;

        if accepted.response_code != "0" {
            record_upstream(PROVIDER, "stk_push", false);
            tracing::warn!(
                response_code = %accepted.response_code,
                description = %accepted.response_description,
                "M-Pesa STK push not accepted"
            );
            return Err(MpesaError::Rejected(accepted.response_description));
        }

        record_upstream(PROVIDER, "stk_push", true);
        tracing::info!(
            checkout_request_id = %accepted.checkout_request_id,
            amount = push.amount,
            account_reference = %push.account_reference,
            "M-Pesa STK push sent"
        );

        accepted.raw = raw;
        accepted.msisdn = msisdn;
        Ok(accepted)
    }

    /// Ask Daraja for the result of an earlier STK push.
    pub async fn stk_query(&self, checkout_request_id: &str) -> Result<StkQueryResult, MpesaError> {
        let creds = self.credentials().ok_or(MpesaError::NotConfigured)?;
        let token = self.access_token(&creds).await?;
        let timestamp = mpesa_timestamp(Utc::now());

        let body = StkQueryBody {
            business_short_code: creds.shortcode,
            password: Self::password(creds.shortcode, creds.passkey, &timestamp),
            timestamp,
            checkout_request_id,
        };

        let url = format!("{}/mpesa/stkpushquery/v1/query", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw: serde_json::Value = response.json().await.unwrap_or_default();

        // Daraja answers 500 while a push is still being processed.
        if !status.is_success() && raw.get("errorCode").is_none() {
            record_upstream(PROVIDER, "stk_query", false);
            return Err(MpesaError::Rejected(format!("STK query returned {}", status)));
        }

        record_upstream(PROVIDER, "stk_query", true);

        Ok(StkQueryResult {
            result_code: json_code(raw.get("ResultCode")),
            result_desc: raw
                .get("ResultDesc")
                .or_else(|| raw.get("errorMessage"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MpesaEnvironment;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> MpesaConfig {
        MpesaConfig {
            consumer_key: Some(Secret::new("key".to_string())),
            consumer_secret: Some(Secret::new("secret".to_string())),
            shortcode: Some("174379".to_string()),
            passkey: Some(Secret::new("passkey".to_string())),
            environment: MpesaEnvironment::Sandbox,
            base_url: base_url.to_string(),
            callback_token: None,
        }
    }

    async fn mock_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/oauth/v1/generate"))
            .and(query_param("grant_type", "client_credentials"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "tok_123", "expires_in": "3599"})),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn push<'a>(phone: &'a str) -> StkPush<'a> {
        StkPush {
            phone,
            amount: 150,
            account_reference: "INV-0001",
            description: "Invoice INV-0001",
            callback_url: "https://app.example.com/api/mpesa/stk/webhook",
        }
    }

    #[test]
    fn password_is_base64_of_parts() {
        let password = MpesaClient::password("174379", "pk", "20240101120000");
        let decoded = STANDARD.decode(password).unwrap();
        assert_eq!(decoded, b"174379pk20240101120000");
    }

    #[test]
    fn configuration_requires_all_credentials() {
        let mut cfg = config("http://localhost");
        assert!(MpesaClient::new(cfg.clone()).is_configured());
        cfg.passkey = None;
        assert!(!MpesaClient::new(cfg).is_configured());
    }

    #[tokio::test]
    async fn stk_push_normalizes_phone_and_reuses_token() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/mpesa/stkpush/v1/processrequest"))
            .and(header("authorization", "Bearer tok_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResponseCode": "0",
                "ResponseDescription": "Success. Request accepted for processing",
                "CustomerMessage": "Success. Request accepted for processing"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = MpesaClient::new(config(&server.uri()));
        let accepted = client.stk_push(push("0712345678")).await.unwrap();
        assert_eq!(accepted.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(accepted.msisdn, "254712345678");
        assert_eq!(accepted.raw["ResponseCode"], "0");

        client.stk_push(push("+254712345678")).await.unwrap();
    }

    #[tokio::test]
    async fn non_zero_response_code_is_rejected() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/mpesa/stkpush/v1/processrequest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MerchantRequestID": "1",
                "CheckoutRequestID": "ws_CO_1",
                "ResponseCode": "1",
                "ResponseDescription": "Unable to lock subscriber"
            })))
            .mount(&server)
            .await;

        let client = MpesaClient::new(config(&server.uri()));
        let err = client.stk_push(push("254712345678")).await.unwrap_err();
        assert!(matches!(err, MpesaError::Rejected(ref m) if m == "Unable to lock subscriber"));
        assert!(matches!(AppError::from(err), AppError::BadGateway(_)));
    }

    #[tokio::test]
    async fn invalid_phone_fails_before_any_request() {
        let server = MockServer::start().await;
        mock_token(&server, 0).await;

        let client = MpesaClient::new(config(&server.uri()));
        let err = client.stk_push(push("12345")).await.unwrap_err();
        assert!(matches!(err, MpesaError::InvalidPhone(_)));
    }

    #[tokio::test]
    async fn unconfigured_client_maps_to_service_unavailable() {
        let mut cfg = config("http://localhost");
        cfg.consumer_key = None;
        let err = MpesaClient::new(cfg).stk_query("ws_CO_1").await.unwrap_err();
        assert!(matches!(AppError::from(err), AppError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn stk_query_reads_numeric_result_code() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/mpesa/stkpushquery/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ResponseCode": "0",
                "CheckoutRequestID": "ws_CO_1",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            })))
            .mount(&server)
            .await;

        let client = MpesaClient::new(config(&server.uri()));
        let result = client.stk_query("ws_CO_1").await.unwrap();
        assert_eq!(result.result_code.as_deref(), Some("1032"));
        assert_eq!(result.result_desc.as_deref(), Some("Request cancelled by user"));
    }
}
