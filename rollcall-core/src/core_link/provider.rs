//! Identity provider client
//!
//! Speaks the provider's OAuth authorization-code grant (with PKCE) and
//! its profile endpoint. Access credentials are wrapped in [`SecretString`]
//! so they cannot leak through logs or debug output.

use super::error::LinkError;
use crate::core_membership::record::{ExternalIdentity, OrgAffiliation};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::error;

/// Settings for the identity provider endpoints
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub authorize_url: String,
    pub token_url: String,
    pub profile_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    /// Callback URL registered with the provider
    pub redirect_url: String,
    pub scope: String,
}

/// Outcome of a profile fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileResult {
    /// The identity has a linked game account
    Linked(ExternalIdentity),
    /// The provider reports no linked game account; a legitimate terminal
    /// outcome, not a failure
    NotLinked,
}

/// Client for the external identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Build the authorization URL carrying the anti-CSRF state and the
    /// PKCE challenge
    fn authorize_url(&self, state: &str, code_challenge: &str) -> String;

    /// Exchange an authorization code for an access credential.
    ///
    /// `verifier` is included when the issuing process still holds the
    /// PKCE material; the exchange must also work without it for
    /// providers that do not require PKCE.
    async fn exchange_code(
        &self,
        code: &str,
        verifier: Option<&str>,
    ) -> Result<SecretString, LinkError>;

    /// Fetch the profile behind an access credential
    async fn fetch_profile(&self, access_token: &SecretString)
        -> Result<ProfileResult, LinkError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrgResponse {
    name: String,
    tag: String,
    rank: String,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    /// Explicit not-linked signal from the provider
    #[serde(default)]
    linked: Option<bool>,
    handle: Option<String>,
    #[serde(alias = "citizen_record")]
    record_id: Option<String>,
    #[serde(default)]
    orgs: Vec<OrgResponse>,
    account_created: Option<String>,
}

/// HTTP implementation of [`IdentityProvider`]
pub struct HttpIdentityProvider {
    settings: ProviderSettings,
    http: reqwest::Client,
}

impl HttpIdentityProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self, LinkError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| LinkError::Provider(e.to_string()))?;

        Ok(Self { settings, http })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    fn authorize_url(&self, state: &str, code_challenge: &str) -> String {
        let url = reqwest::Url::parse_with_params(
            &self.settings.authorize_url,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", self.settings.scope.as_str()),
                ("state", state),
                ("code_challenge", code_challenge),
                ("code_challenge_method", "S256"),
            ],
        )
        .expect("authorize_url validated at config load");

        url.into()
    }

    async fn exchange_code(
        &self,
        code: &str,
        verifier: Option<&str>,
    ) -> Result<SecretString, LinkError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.expose_secret()),
            ("redirect_uri", self.settings.redirect_url.as_str()),
            ("code", code),
        ];
        if let Some(verifier) = verifier {
            form.push(("code_verifier", verifier));
        }

        let response = self
            .http
            .post(&self.settings.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| LinkError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Status only; the body may echo credentials
            error!(status = status.as_u16(), "Token exchange failed");
            return Err(LinkError::Upstream {
                status: status.as_u16(),
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| LinkError::Provider(e.to_string()))?;

        Ok(SecretString::new(body.access_token))
    }

    async fn fetch_profile(
        &self,
        access_token: &SecretString,
    ) -> Result<ProfileResult, LinkError> {
        let response = self
            .http
            .get(&self.settings.profile_url)
            .bearer_auth(access_token.expose_secret())
            .send()
            .await
            .map_err(|e| LinkError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "Profile fetch failed");
            return Err(LinkError::Upstream {
                status: status.as_u16(),
            });
        }

        let body: ProfileResponse = response
            .json()
            .await
            .map_err(|e| LinkError::Provider(e.to_string()))?;

        if body.linked == Some(false) {
            return Ok(ProfileResult::NotLinked);
        }

        match (body.handle, body.record_id) {
            (Some(handle), Some(record_id)) => Ok(ProfileResult::Linked(ExternalIdentity {
                handle,
                record_id,
                orgs: body
                    .orgs
                    .into_iter()
                    .map(|o| OrgAffiliation {
                        name: o.name,
                        tag: o.tag,
                        rank: o.rank,
                    })
                    .collect(),
                account_created: body.account_created.unwrap_or_default(),
            })),
            // A profile without a handle is the provider's other way of
            // saying no game account is linked
            _ => Ok(ProfileResult::NotLinked),
        }
    }
}
