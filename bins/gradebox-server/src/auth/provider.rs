//! OpenID Connect identity provider (authorization code flow).

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::AuthError;

/// Outbound calls to the provider share this deadline.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

const SCOPES: &str = "openid profile email";

/// Fields of the userinfo response we rely on.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser to start a login carrying `state`.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange an authorization code and fetch the user's profile.
    async fn fetch_profile(&self, code: &str) -> Result<UserProfile, AuthError>;
}

#[derive(Debug, Clone, Deserialize)]
struct Discovery {
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Clone)]
pub struct OidcClient {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

pub struct OidcProvider {
    http: reqwest::Client,
    client: OidcClient,
    authorization_endpoint: Url,
    token_endpoint: String,
    userinfo_endpoint: String,
}

impl OidcProvider {
    /// Resolve endpoints from `{issuer}/.well-known/openid-configuration`.
    pub async fn discover(issuer: &str, client: OidcClient) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let well_known = format!("{}/.well-known/openid-configuration", issuer.trim_end_matches('/'));
        let discovery: Discovery = http
            .get(&well_known)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::Provider(format!("GET {}: {}", well_known, e)))?
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("parsing {}: {}", well_known, e)))?;

        info!(
            authorization_endpoint = %discovery.authorization_endpoint,
            userinfo_endpoint = %discovery.userinfo_endpoint,
            "Discovered OpenID endpoints"
        );
        Self::with_endpoints(http, client, discovery)
    }

    fn with_endpoints(http: reqwest::Client, client: OidcClient, discovery: Discovery) -> Result<Self, AuthError> {
        let authorization_endpoint = Url::parse(&discovery.authorization_endpoint)
            .map_err(|e| AuthError::Provider(format!("authorization_endpoint: {}", e)))?;
        Ok(Self {
            http,
            client,
            authorization_endpoint,
            token_endpoint: discovery.token_endpoint,
            userinfo_endpoint: discovery.userinfo_endpoint,
        })
    }
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    fn authorize_url(&self, state: &str) -> String {
        let mut url = self.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client.client_id)
            .append_pair("redirect_uri", &self.client.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", SCOPES)
            .append_pair("state", state);
        url.into()
    }

    async fn fetch_profile(&self, code: &str) -> Result<UserProfile, AuthError> {
        let token: TokenResponse = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.client.redirect_url.as_str()),
                ("client_id", self.client.client_id.as_str()),
                ("client_secret", self.client.client_secret.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::Provider(format!("code exchange failed: {}", e)))?
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("code exchange response: {}", e)))?;

        let profile: UserProfile = self
            .http
            .get(&self.userinfo_endpoint)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::Provider(format!("error getting user info: {}", e)))?
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("error reading user info: {}", e)))?;

        debug!(has_name = profile.name.is_some(), "Fetched user profile");
        Ok(profile)
    }
}
