use log::{info, warn};
use voiceroom_core::{Billing, BillingOutcome, RoomDocument};

/// What a billing tick decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    Charged { balance: u64 },
    InsufficientFunds,
    /// Not billed this time, the session carries on
    Skipped,
}

/// Charges a participant of a paid room once per billing interval.
/// The host is never charged for their own room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingMeter {
    rate_per_minute: Option<u32>,
}

impl BillingMeter {
    pub fn for_participant(room: &RoomDocument, uid: &str) -> Self {
        let rate_per_minute = room
            .call_rate_per_minute
            .filter(|rate| room.is_paid_call && *rate > 0 && !room.is_host(uid));

        Self { rate_per_minute }
    }

    pub fn is_active(&self) -> bool {
        self.rate_per_minute.is_some()
    }

    pub async fn charge(&self, billing: &dyn Billing, room_id: &str, payer: &str) -> Charge {
        let Some(rate) = self.rate_per_minute else {
            return Charge::Skipped;
        };

        match billing.charge(room_id, payer, rate).await {
            Ok(BillingOutcome::Charged { balance }) => {
                info!("Charged {payer} {rate} for a minute in {room_id}, {balance} left");
                Charge::Charged { balance }
            }
            Ok(BillingOutcome::InsufficientFunds) => {
                info!("{payer} ran out of funds in {room_id}");
                Charge::InsufficientFunds
            }
            Err(error) => {
                warn!("Could not bill {payer} in {room_id}: {error}");
                Charge::Skipped
            }
        }
    }
}
