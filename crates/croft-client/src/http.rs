use reqwest::{Client, StatusCode, Url};
use uuid::Uuid;

use croft_types::api::{
    EditMessageRequest, EnsureProfileRequest, PresenceRequest, SendMessageRequest, TypingRequest,
    VoiceUploadResponse, FARMER_ID_HEADER,
};
use croft_types::models::{ChatMessage, FarmerProfile};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Thin REST client for the hub. Every call runs under the configured
/// request timeout.
pub struct ApiClient {
    http: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("croft-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
        })
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url
    }

    pub async fn ensure_profile(&self, farmer_id: &str) -> Result<FarmerProfile, ClientError> {
        let resp = self
            .http
            .post(self.url("/profiles"))
            .json(&EnsureProfileRequest {
                farmer_id: farmer_id.to_string(),
            })
            .send()
            .await?;
        Ok(ok(resp).await?.json().await?)
    }

    pub async fn set_presence(
        &self,
        farmer_id: &str,
        profile_id: Uuid,
        online: bool,
    ) -> Result<FarmerProfile, ClientError> {
        let resp = self
            .http
            .put(self.url(&format!("/profiles/{profile_id}/presence")))
            .header(FARMER_ID_HEADER, farmer_id)
            .json(&PresenceRequest { online })
            .send()
            .await?;
        Ok(ok(resp).await?.json().await?)
    }

    pub async fn online_profiles(&self, farmer_id: &str) -> Result<Vec<FarmerProfile>, ClientError> {
        let resp = self
            .http
            .get(self.url("/profiles/online"))
            .header(FARMER_ID_HEADER, farmer_id)
            .send()
            .await?;
        Ok(ok(resp).await?.json().await?)
    }

    /// One page, newest first, exactly as the hub returns it.
    pub async fn get_messages(
        &self,
        farmer_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>, ClientError> {
        let resp = self
            .http
            .get(self.url("/messages"))
            .query(&[("limit", limit), ("offset", offset)])
            .header(FARMER_ID_HEADER, farmer_id)
            .send()
            .await?;
        Ok(ok(resp).await?.json().await?)
    }

    pub async fn send_message(
        &self,
        farmer_id: &str,
        req: &SendMessageRequest,
    ) -> Result<ChatMessage, ClientError> {
        let resp = self
            .http
            .post(self.url("/messages"))
            .header(FARMER_ID_HEADER, farmer_id)
            .json(req)
            .send()
            .await?;
        Ok(ok(resp).await?.json().await?)
    }

    /// `Ok(None)` means the hub affected no rows: missing or not ours,
    /// indistinguishable by design.
    pub async fn edit_message(
        &self,
        farmer_id: &str,
        message_id: Uuid,
        content: &str,
    ) -> Result<Option<ChatMessage>, ClientError> {
        let resp = self
            .http
            .patch(self.url(&format!("/messages/{message_id}")))
            .header(FARMER_ID_HEADER, farmer_id)
            .json(&EditMessageRequest {
                content: content.to_string(),
            })
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(ok(resp).await?.json().await?))
    }

    /// `Ok(false)` mirrors [`Self::edit_message`]'s `Ok(None)`.
    pub async fn delete_message(
        &self,
        farmer_id: &str,
        message_id: Uuid,
    ) -> Result<bool, ClientError> {
        let resp = self
            .http
            .delete(self.url(&format!("/messages/{message_id}")))
            .header(FARMER_ID_HEADER, farmer_id)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ok(resp).await?;
        Ok(true)
    }

    pub async fn set_typing(&self, farmer_id: &str, typing: bool) -> Result<(), ClientError> {
        let resp = self
            .http
            .put(self.url("/typing"))
            .header(FARMER_ID_HEADER, farmer_id)
            .json(&TypingRequest { typing })
            .send()
            .await?;
        ok(resp).await?;
        Ok(())
    }

    pub async fn upload_voice(
        &self,
        farmer_id: &str,
        name: &str,
        audio: Vec<u8>,
    ) -> Result<VoiceUploadResponse, ClientError> {
        let resp = self
            .http
            .post(self.url(&format!("/voice/{name}")))
            .header(FARMER_ID_HEADER, farmer_id)
            .header("content-type", "application/octet-stream")
            .body(audio)
            .send()
            .await?;
        Ok(ok(resp).await?.json().await?)
    }
}

async fn ok(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(ClientError::Api { status, body })
    }
}
