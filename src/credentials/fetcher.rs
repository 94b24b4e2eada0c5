//! Credential Fetcher
//!
//! Zwei aufeinanderfolgende Requests gegen die Telnyx API. Der zweite
//! braucht die ID aus dem ersten, es gibt keinen Retry.

use super::messages::*;
use crate::config::Config;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request rejected by provider ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

// ============================================================================
// CREDENTIALS
// ============================================================================

/// Zugangsdaten für genau eine Sitzung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub sip_username: String,
    pub login_token: String,
}

// ============================================================================
// FETCHER
// ============================================================================

/// HTTP Client für die Telnyx REST API
pub struct CredentialFetcher {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    connection_id: String,
}

impl CredentialFetcher {
    /// Erstellt einen Fetcher aus der Konfiguration
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            connection_id: config.sip_connection_id.clone(),
        }
    }

    /// Legt ein Credential an und holt den Login-Token dafür
    pub async fn get_credentials(&self) -> Result<Credentials, CredentialError> {
        tracing::info!("Requesting telephony credential...");

        let response: CreateCredentialResponse = self
            .post(
                "telephony_credentials",
                &CreateCredentialRequest::new(self.connection_id.clone()),
            )
            .await?
            .json()
            .await
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;

        let credential = response.data;
        tracing::debug!(
            "Created credential {} for {}",
            credential.id,
            credential.sip_username
        );

        let login_token = self
            .post(
                &format!("telephony_credentials/{}/token", credential.id),
                &EmptyRequest::default(),
            )
            .await?
            .text()
            .await?
            .trim()
            .to_string();

        if login_token.is_empty() {
            return Err(CredentialError::InvalidResponse(
                "empty login token".to_string(),
            ));
        }

        tracing::info!("Received login token for {}", credential.sip_username);

        Ok(Credentials {
            sip_username: credential.sip_username,
            login_token,
        })
    }

    /// POST an `/v2/<path>` mit Bearer-Auth, Status != 2xx ist ein Fehler
    async fn post<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, CredentialError> {
        let url = format!("{}/v2/{}", self.api_url, path);
        tracing::debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Telnyx API rejected {} ({}): {}", path, status, body);
            return Err(CredentialError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

impl std::fmt::Debug for CredentialFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialFetcher")
            .field("api_url", &self.api_url)
            .field("connection_id", &self.connection_id)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> Config {
        let uri = server.uri();
        Config::from_lookup(move |name| match name {
            "TELNYX_API_KEY" => Some("KEY123".to_string()),
            "TELNYX_SIP_CONNECTION_ID" => Some("conn-1".to_string()),
            "TELNYX_API_URL" => Some(uri.clone()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_credentials_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/telephony_credentials"))
            .and(header("authorization", "Bearer KEY123"))
            .and(body_json(serde_json::json!({ "connection_id": "conn-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "id": "c1", "sip_username": "u1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v2/telephony_credentials/c1/token"))
            .and(header("authorization", "Bearer KEY123"))
            .respond_with(ResponseTemplate::new(201).set_body_string("tok123"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = CredentialFetcher::new(&config_for(&server));
        let credentials = fetcher.get_credentials().await.unwrap();

        assert_eq!(
            credentials,
            Credentials {
                sip_username: "u1".to_string(),
                login_token: "tok123".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_token_request_follows_provisioning() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/telephony_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "id": "c1", "sip_username": "u1" }
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v2/telephony_credentials/c1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("tok123"))
            .mount(&server)
            .await;

        CredentialFetcher::new(&config_for(&server))
            .get_credentials()
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let paths: Vec<_> = requests.iter().map(|r| r.url.path().to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "/v2/telephony_credentials".to_string(),
                "/v2/telephony_credentials/c1/token".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_provisioning_skips_token_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/telephony_credentials"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let result = CredentialFetcher::new(&config_for(&server))
            .get_credentials()
            .await;

        assert!(matches!(
            result,
            Err(CredentialError::Rejected { status: 401, .. })
        ));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_provisioning_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/telephony_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = CredentialFetcher::new(&config_for(&server))
            .get_credentials()
            .await;

        assert!(matches!(result, Err(CredentialError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_empty_token_is_invalid() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/telephony_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "id": "c1", "sip_username": "u1" }
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v2/telephony_credentials/c1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  \n"))
            .mount(&server)
            .await;

        let result = CredentialFetcher::new(&config_for(&server))
            .get_credentials()
            .await;

        assert!(matches!(result, Err(CredentialError::InvalidResponse(_))));
    }
}
