use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

use super::{AccessToken, AuthSettings, TokenFetcher};
use crate::error::{ClearanceError, Result};

const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches tokens with a client-credentials form POST
#[derive(Debug, Clone)]
pub struct ClientCredentialsFetcher {
    client: Client,
}

impl ClientCredentialsFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClearanceError::AuthenticationError(format!("Failed to build token client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TokenFetcher for ClientCredentialsFetcher {
    async fn fetch(&self, settings: &AuthSettings) -> Result<AccessToken> {
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", settings.client_id.as_str()),
            ("client_secret", settings.client_secret.as_str()),
        ];
        if let Some(scope) = settings.scope.as_deref().filter(|s| !s.is_empty()) {
            form.push(("scope", scope));
        }

        debug!(token_url = %settings.token_url, "Requesting access token");
        let response = self
            .client
            .post(&settings.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ClearanceError::AuthenticationError(format!("Token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClearanceError::AuthenticationError(format!("Token response unreadable: {e}")))?;

        if !status.is_success() {
            error!(status_code = status.as_u16(), token_url = %settings.token_url, "Token endpoint rejected request");
            return Err(ClearanceError::AuthenticationError(format!(
                "Token endpoint returned {}: {body}",
                status.as_u16()
            )));
        }

        let token: AccessToken = serde_json::from_str(&body)
            .map_err(|e| ClearanceError::AuthenticationError(format!("Invalid token response: {e}")))?;
        if token.access_token.trim().is_empty() {
            return Err(ClearanceError::AuthenticationError(
                "Token endpoint returned an empty access token".to_string(),
            ));
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(token_url: String) -> AuthSettings {
        AuthSettings {
            requires_authentication: true,
            token_url,
            client_id: "uvp".into(),
            client_secret: "s3cret".into(),
            scope: Some("clearance.write".into()),
            expiration_buffer_seconds: 60,
        }
    }

    #[tokio::test]
    async fn test_fetches_token_with_form_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("scope=clearance.write"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"access_token": "tok-1", "expires_in": 1200, "token_type": "Bearer"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = ClientCredentialsFetcher::new().unwrap();
        let token = fetcher
            .fetch(&settings(format!("{}/oauth/token", server.uri())))
            .await
            .unwrap();
        assert_eq!(token.access_token, "tok-1");
        assert_eq!(token.expires_in, 1200);
    }

    #[tokio::test]
    async fn test_rejected_request_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let fetcher = ClientCredentialsFetcher::new().unwrap();
        let err = fetcher.fetch(&settings(server.uri())).await.unwrap_err();
        assert!(matches!(err, ClearanceError::AuthenticationError(_)));
    }
}
