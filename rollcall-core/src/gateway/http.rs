//! REST adapter for the community platform API

use super::{Gateway, GatewayError, MemberPresence};
use crate::core_membership::types::{ChannelId, CommunityId, MemberId, RoleId};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Settings for the platform REST adapter
#[derive(Debug, Clone)]
pub struct HttpGatewaySettings {
    /// Base URL of the platform API, without a trailing slash
    pub base_url: String,
    /// Bot token presented as a bearer credential
    pub token: SecretString,
}

/// Gateway implementation over the platform's REST API
pub struct HttpGateway {
    settings: HttpGatewaySettings,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CommunityResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PresenceResponse {
    member_id: String,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    voice_channel_id: Option<String>,
}

impl HttpGateway {
    pub fn new(settings: HttpGatewaySettings) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(Self { settings, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url, path)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.settings.token.expose_secret())
    }

    /// Map a platform response to the gateway error taxonomy.
    ///
    /// The response body is dropped, not logged; it can echo the request
    /// and the request carries the bearer credential.
    async fn check(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, GatewayError> {
        match response.status() {
            s if s.is_success() => Ok(response),
            reqwest::StatusCode::NOT_FOUND => Err(GatewayError::MemberNotFound),
            reqwest::StatusCode::FORBIDDEN => Err(GatewayError::PermissionDenied),
            s => Err(GatewayError::Unavailable(format!("HTTP {}", s.as_u16()))),
        }
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<(), GatewayError> {
        let response = self
            .http
            .post(self.url(path))
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn community_name(&self, community: &CommunityId) -> Result<String, GatewayError> {
        let response = self
            .http
            .get(self.url(&format!("/communities/{}", community)))
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let body: CommunityResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(body.name)
    }

    async fn remove_member(
        &self,
        community: &CommunityId,
        member: &MemberId,
        reason: &str,
    ) -> Result<(), GatewayError> {
        debug!(%community, %member, reason, "Removing member");

        let response = self
            .http
            .delete(self.url(&format!("/communities/{}/members/{}", community, member)))
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .json(&serde_json::json!({ "reason": reason }))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }

    async fn grant_role(
        &self,
        community: &CommunityId,
        member: &MemberId,
        role: &RoleId,
    ) -> Result<(), GatewayError> {
        let response = self
            .http
            .put(self.url(&format!(
                "/communities/{}/members/{}/roles/{}",
                community, member, role
            )))
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }

    async fn revoke_role(
        &self,
        community: &CommunityId,
        member: &MemberId,
        role: &RoleId,
    ) -> Result<(), GatewayError> {
        let response = self
            .http
            .delete(self.url(&format!(
                "/communities/{}/members/{}/roles/{}",
                community, member, role
            )))
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }

    async fn send_direct(&self, member: &MemberId, text: &str) -> Result<(), GatewayError> {
        self.post_json(
            &format!("/members/{}/messages", member),
            serde_json::json!({ "content": text }),
        )
        .await
    }

    async fn send_channel(
        &self,
        community: &CommunityId,
        channel: &ChannelId,
        text: &str,
    ) -> Result<(), GatewayError> {
        self.post_json(
            &format!("/communities/{}/channels/{}/messages", community, channel),
            serde_json::json!({ "content": text }),
        )
        .await
    }

    async fn presences(
        &self,
        community: &CommunityId,
    ) -> Result<Vec<MemberPresence>, GatewayError> {
        let response = self
            .http
            .get(self.url(&format!("/communities/{}/presences", community)))
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let body: Vec<PresenceResponse> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(body
            .into_iter()
            .map(|p| MemberPresence {
                member: MemberId::new(p.member_id),
                roles: p.roles.into_iter().map(RoleId::new).collect(),
                voice_channel: p.voice_channel_id.map(ChannelId::new),
            })
            .collect())
    }

    async fn move_to_channel(
        &self,
        community: &CommunityId,
        member: &MemberId,
        channel: &ChannelId,
    ) -> Result<(), GatewayError> {
        let response = self
            .http
            .patch(self.url(&format!(
                "/communities/{}/members/{}/voice",
                community, member
            )))
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .json(&serde_json::json!({ "channel_id": channel.as_str() }))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let gateway = HttpGateway::new(HttpGatewaySettings {
            base_url: "https://platform.example".to_string(),
            token: SecretString::new("secret-token".to_string()),
        })
        .unwrap();

        assert_eq!(
            gateway.url("/communities/c1"),
            "https://platform.example/communities/c1"
        );
    }

    #[test]
    fn test_token_not_in_debug_output() {
        let settings = HttpGatewaySettings {
            base_url: "https://platform.example".to_string(),
            token: SecretString::new("super-secret".to_string()),
        };

        let debug = format!("{:?}", settings);
        assert!(!debug.contains("super-secret"));
    }
}
