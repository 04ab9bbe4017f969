use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use voiceroom_core::{
    document_id, Billing, BillingError, BillingOutcome, MediaUploader, PushDispatcher, PushError,
    PushNotification, PushOutcome, Upload, UploadError, UserId,
};

/// Keeps every delivered notification in memory.
#[derive(Default)]
pub struct MemoryPushDispatcher {
    tokens: Mutex<HashSet<UserId>>,
    delivered: Mutex<Vec<PushNotification>>,
}

impl MemoryPushDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: impl Into<UserId>) {
        self.tokens.lock().insert(user_id.into());
    }

    pub fn delivered(&self) -> Vec<PushNotification> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl PushDispatcher for MemoryPushDispatcher {
    async fn dispatch(&self, notification: PushNotification) -> Result<PushOutcome, PushError> {
        if !self.tokens.lock().contains(&notification.recipient) {
            return Ok(PushOutcome::Skipped);
        }

        self.delivered.lock().push(notification);
        Ok(PushOutcome::Delivered)
    }
}

/// Pretends to upload by handing out URLs under a fixed base.
pub struct MemoryUploader {
    base_url: String,
    uploads: DashMap<String, Vec<u8>>,
}

impl MemoryUploader {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            uploads: Default::default(),
        }
    }

    pub fn uploaded(&self, url: &str) -> Option<Vec<u8>> {
        self.uploads.get(url).map(|b| b.clone())
    }
}

#[async_trait]
impl MediaUploader for MemoryUploader {
    async fn upload(&self, upload: Upload) -> Result<String, UploadError> {
        if upload.bytes.is_empty() {
            return Err(UploadError::Empty);
        }

        let url = format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            document_id(),
            upload.file_name
        );

        self.uploads.insert(url.clone(), upload.bytes);
        Ok(url)
    }
}

/// Prepaid balances kept in memory. Unknown payers have no funds.
#[derive(Default)]
pub struct PrepaidBilling {
    balances: DashMap<UserId, u64>,
}

impl PrepaidBilling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top_up(&self, user_id: impl Into<UserId>, amount: u64) {
        *self.balances.entry(user_id.into()).or_default() += amount;
    }

    pub fn balance(&self, user_id: &str) -> u64 {
        self.balances.get(user_id).map(|b| *b).unwrap_or_default()
    }
}

#[async_trait]
impl Billing for PrepaidBilling {
    async fn charge(
        &self,
        _room_id: &str,
        payer: &str,
        amount: u32,
    ) -> Result<BillingOutcome, BillingError> {
        let mut balance = self.balances.entry(payer.to_string()).or_default();

        if *balance < amount as u64 {
            return Ok(BillingOutcome::InsufficientFunds);
        }

        *balance -= amount as u64;
        Ok(BillingOutcome::Charged { balance: *balance })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_prepaid_billing() {
        let billing = PrepaidBilling::new();
        billing.top_up("alice", 15);

        assert_eq!(
            billing.charge("room", "alice", 10).await.unwrap(),
            BillingOutcome::Charged { balance: 5 }
        );
        assert_eq!(
            billing.charge("room", "alice", 10).await.unwrap(),
            BillingOutcome::InsufficientFunds
        );
        assert_eq!(billing.balance("alice"), 5, "failed charges take nothing");
    }

    #[tokio::test]
    async fn test_push_is_skipped_without_registration() {
        let push = MemoryPushDispatcher::new();
        push.register("bob");

        for recipient in ["alice", "bob"] {
            push.dispatch(PushNotification {
                recipient: recipient.to_string(),
                title: "Invite".to_string(),
                body: "Come up".to_string(),
                icon: None,
                link: None,
            })
            .await
            .unwrap();
        }

        let delivered = push.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].recipient, "bob");
    }
}
