use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::{Deserialize, Serialize};
use voiceroom_core::{
    MediaUploader, PushDispatcher, PushError, PushNotification, PushOutcome, Upload, UploadError,
    UserId,
};

/// Sends push notifications to a push gateway over HTTP.
///
/// Only users with a registered delivery token receive anything.
pub struct HttpPushDispatcher {
    client: Client,
    endpoint: String,
    tokens: DashMap<UserId, String>,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    token: &'a str,
    title: &'a str,
    body: &'a str,
    icon: Option<&'a str>,
    link: Option<&'a str>,
}

impl HttpPushDispatcher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            tokens: Default::default(),
        }
    }

    pub fn register_token(&self, user_id: impl Into<UserId>, token: impl Into<String>) {
        self.tokens.insert(user_id.into(), token.into());
    }

    pub fn unregister_token(&self, user_id: &str) {
        self.tokens.remove(user_id);
    }
}

#[async_trait]
impl PushDispatcher for HttpPushDispatcher {
    async fn dispatch(&self, notification: PushNotification) -> Result<PushOutcome, PushError> {
        let Some(token) = self.tokens.get(&notification.recipient).map(|t| t.clone()) else {
            debug!(
                "No push token for {}, skipping notification",
                notification.recipient
            );
            return Ok(PushOutcome::Skipped);
        };

        let request = PushRequest {
            token: &token,
            title: &notification.title,
            body: &notification.body,
            icon: notification.icon.as_deref(),
            link: notification.link.as_deref(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| PushError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PushError::Rejected {
                status: response.status().as_u16(),
            });
        }

        Ok(PushOutcome::Delivered)
    }
}

/// Uploads media assets to an HTTP endpoint that answers with `{"url": "..."}`.
pub struct HttpUploader {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl MediaUploader for HttpUploader {
    async fn upload(&self, upload: Upload) -> Result<String, UploadError> {
        if upload.bytes.is_empty() {
            return Err(UploadError::Empty);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("name", upload.file_name.as_str())])
            .header(CONTENT_TYPE, upload.content_type)
            .body(upload.bytes)
            .send()
            .await
            .map_err(|e| UploadError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::Rejected {
                status: response.status().as_u16(),
            });
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;

        Ok(body.url)
    }
}
