use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::UserId;

/// A notification for a single user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushNotification {
    pub recipient: UserId,
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    /// Where a click on the notification should lead inside the app
    pub link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    /// The recipient has no registered delivery token
    Skipped,
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Push request failed: {0}")]
    Request(String),
    #[error("Push service responded with status {status}")]
    Rejected { status: u16 },
}

/// Fire-and-forget delivery of push notifications
#[async_trait]
pub trait PushDispatcher: Send + Sync {
    async fn dispatch(&self, notification: PushNotification) -> Result<PushOutcome, PushError>;
}

/// A binary asset to upload
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload is empty")]
    Empty,
    #[error("Upload request failed: {0}")]
    Request(String),
    #[error("Upload endpoint responded with status {status}")]
    Rejected { status: u16 },
    #[error("Upload endpoint returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Stores media assets and hands back a public URL
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, upload: Upload) -> Result<String, UploadError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingOutcome {
    Charged { balance: u64 },
    InsufficientFunds,
}

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Billing is unavailable: {0}")]
    Unavailable(String),
}

/// Charges listeners of paid rooms
#[async_trait]
pub trait Billing: Send + Sync {
    async fn charge(
        &self,
        room_id: &str,
        payer: &str,
        amount: u32,
    ) -> Result<BillingOutcome, BillingError>;
}
