//! reqwest-backed [`AuthorizationServer`] implementation.
//!
//! Available behind the `http-client` feature. Speaks the standard OAuth2
//! token endpoint protocol: form-encoded POSTs for the authorization-code
//! and refresh grants, JSON responses.

use async_trait::async_trait;
use url::Url;

use crate::error::AuthError;
use crate::smart::flow::{AuthorizationServer, CodeExchange, TokenResponse};

pub struct HttpAuthorizationServer {
    token_endpoint: Url,
    client: reqwest::Client,
}

impl HttpAuthorizationServer {
    pub fn new(token_endpoint: Url) -> Self {
        Self {
            token_endpoint,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(token_endpoint: Url, client: reqwest::Client) -> Self {
        Self {
            token_endpoint,
            client,
        }
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let response = self
            .client
            .post(self.token_endpoint.clone())
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::Http {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchange {
                status: status.as_u16(),
                detail,
            });
        }

        response.json().await.map_err(|e| AuthError::Http {
            message: format!("malformed token response: {e}"),
        })
    }
}

#[async_trait]
impl AuthorizationServer for HttpAuthorizationServer {
    async fn exchange_code(&self, request: CodeExchange<'_>) -> Result<TokenResponse, AuthError> {
        let redirect_uri = request.redirect_uri.to_string();
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", request.code),
            ("code_verifier", request.code_verifier),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", request.client_id),
        ];
        if let Some(secret) = request.client_secret {
            form.push(("client_secret", secret));
        }
        self.post_form(&form).await
    }

    async fn refresh_token(
        &self,
        refresh_token: &str,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<TokenResponse, AuthError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
        ];
        if let Some(secret) = client_secret {
            form.push(("client_secret", secret));
        }
        self.post_form(&form).await
    }
}
