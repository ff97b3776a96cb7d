//! # Deadline Policy
//!
//! Pure functions computing the deposit and fiat deadlines and the
//! predicates that ask whether they have lapsed.
//!
//! The fiat deadline is computed twice: a placeholder at creation, then the
//! authoritative value anchored to the actual funding time. A lapsed
//! deadline never transitions a record by itself; it only enables a later
//! `cancel` or `auto_cancel` call.

use chrono::Duration;

use escrow_core::{EscrowConfig, Timestamp};

use crate::record::EscrowRecord;

/// Deadline windows applied to new and newly funded records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlinePolicy {
    deposit_window: Duration,
    fiat_window: Duration,
}

impl DeadlinePolicy {
    /// Policy with explicit windows.
    pub fn new(deposit_window: Duration, fiat_window: Duration) -> Self {
        Self {
            deposit_window,
            fiat_window,
        }
    }

    /// Policy taken from configuration.
    pub fn from_config(config: &EscrowConfig) -> Self {
        Self::new(config.deposit_window(), config.fiat_window())
    }

    /// `created_at + deposit window`.
    pub fn deposit_deadline(&self, created_at: Timestamp) -> Timestamp {
        created_at.saturating_add(self.deposit_window)
    }

    /// `reference + fiat window`. Called with the creation time for the
    /// placeholder and with the funding time for the authoritative value.
    pub fn fiat_deadline(&self, reference: Timestamp) -> Timestamp {
        reference.saturating_add(self.fiat_window)
    }

    /// The deposit window.
    pub fn deposit_window(&self) -> Duration {
        self.deposit_window
    }

    /// The fiat window.
    pub fn fiat_window(&self) -> Duration {
        self.fiat_window
    }
}

impl Default for DeadlinePolicy {
    fn default() -> Self {
        Self::new(Duration::minutes(15), Duration::minutes(30))
    }
}

/// Whether the deposit deadline has strictly passed at `now`.
pub fn deposit_expired(record: &EscrowRecord, now: Timestamp) -> bool {
    now > record.deposit_deadline()
}

/// Whether the fiat deadline has strictly passed at `now`.
pub fn fiat_expired(record: &EscrowRecord, now: Timestamp) -> bool {
    now > record.fiat_deadline()
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_core::Address;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    #[test]
    fn default_windows() {
        let policy = DeadlinePolicy::default();
        assert_eq!(policy.deposit_deadline(ts(0)), ts(900));
        assert_eq!(policy.fiat_deadline(ts(100)), ts(1_900));
    }

    #[test]
    fn from_config_matches_default() {
        let config = EscrowConfig::new(Address::new("0xa4b1").unwrap());
        assert_eq!(DeadlinePolicy::from_config(&config), DeadlinePolicy::default());
    }

    #[test]
    fn custom_windows() {
        let policy = DeadlinePolicy::new(Duration::seconds(10), Duration::seconds(20));
        assert_eq!(policy.deposit_deadline(ts(5)), ts(15));
        assert_eq!(policy.fiat_deadline(ts(5)), ts(25));
        assert_eq!(policy.fiat_window(), Duration::seconds(20));
    }
}
