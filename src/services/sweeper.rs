//! Periodic expiry sweep for reservations

use std::time::Duration;
use tokio::task::JoinHandle;

use super::loans::LoansService;

/// Run `cancel_expired_reservations` every `every` until the runtime shuts down.
/// The first sweep happens immediately.
pub fn spawn(loans: LoansService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = loans.cancel_expired_reservations().await {
                tracing::error!("Expiry sweep failed: {}", e);
            }
        }
    })
}
