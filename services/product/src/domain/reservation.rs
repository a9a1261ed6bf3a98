use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::DomainError;

/// Reservation lifecycle. PENDING is the only non-terminal state:
///
/// ```text
/// PENDING --confirm--> CONFIRMED
/// PENDING --release--> RELEASED
/// PENDING --expire --> EXPIRED    (background reaper)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Released,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Released => "RELEASED",
            ReservationStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != ReservationStatus::Pending
    }

    /// Storage encoding (SMALLINT column).
    pub fn code(self) -> i16 {
        match self {
            ReservationStatus::Pending => 0,
            ReservationStatus::Confirmed => 1,
            ReservationStatus::Released => 2,
            ReservationStatus::Expired => 3,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(ReservationStatus::Pending),
            1 => Some(ReservationStatus::Confirmed),
            2 => Some(ReservationStatus::Released),
            3 => Some(ReservationStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationItem {
    pub sku_id: Uuid,
    pub quantity: i64,
}

/// Soft hold over one or more SKUs. Items are stored as structured JSON on
/// the reservation row; stock effects live on the inventory rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub status: ReservationStatus,
    pub items: Vec<ReservationItem>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Build a PENDING reservation with a time-ordered id. Rejects empty
    /// item lists and non-positive quantities.
    pub fn new(items: Vec<ReservationItem>, ttl: Duration) -> Result<Self, DomainError> {
        if items.is_empty() {
            return Err(DomainError::InvalidQuantity);
        }
        if items.iter().any(|item| item.quantity <= 0) {
            return Err(DomainError::InvalidQuantity);
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            status: ReservationStatus::Pending,
            items,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReservationStatus::Pending
    }

    pub fn can_confirm(&self) -> bool {
        self.is_pending() && !self.is_expired()
    }

    /// Expired PENDING reservations remain releasable: the background
    /// expirer may race a client release and either outcome is correct.
    pub fn can_release(&self) -> bool {
        self.is_pending()
    }

    pub fn confirm(&mut self) -> Result<(), DomainError> {
        if !self.can_confirm() {
            if self.is_pending() && self.is_expired() {
                return Err(DomainError::ReservationExpired);
            }
            return Err(DomainError::ReservationNotPending);
        }
        self.status = ReservationStatus::Confirmed;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn release(&mut self) -> Result<(), DomainError> {
        if !self.can_release() {
            return Err(DomainError::ReservationNotPending);
        }
        self.status = ReservationStatus::Released;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn expire(&mut self) -> Result<(), DomainError> {
        if !self.is_pending() {
            return Err(DomainError::ReservationNotPending);
        }
        self.status = ReservationStatus::Expired;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i64) -> ReservationItem {
        ReservationItem {
            sku_id: Uuid::new_v4(),
            quantity,
        }
    }

    #[test]
    fn new_reservation_is_pending_with_future_expiry() {
        let res = Reservation::new(vec![item(2), item(1)], Duration::from_secs(900)).unwrap();
        assert_eq!(res.status, ReservationStatus::Pending);
        assert!(!res.is_expired());
        assert_eq!(res.total_quantity(), 3);
    }

    #[test]
    fn new_rejects_empty_items() {
        let err = Reservation::new(Vec::new(), Duration::from_secs(900)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity));
    }

    #[test]
    fn new_rejects_non_positive_quantities() {
        let err = Reservation::new(vec![item(0)], Duration::from_secs(900)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity));
        let err = Reservation::new(vec![item(2), item(-1)], Duration::from_secs(900)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity));
    }

    #[test]
    fn ids_are_time_ordered() {
        let a = Reservation::new(vec![item(1)], Duration::from_secs(900)).unwrap();
        let b = Reservation::new(vec![item(1)], Duration::from_secs(900)).unwrap();
        assert!(a.id < b.id);
    }

    #[test]
    fn confirm_from_pending() {
        let mut res = Reservation::new(vec![item(1)], Duration::from_secs(900)).unwrap();
        res.confirm().unwrap();
        assert_eq!(res.status, ReservationStatus::Confirmed);
        assert!(res.status.is_terminal());
    }

    #[test]
    fn confirm_rejects_expired_pending() {
        let mut res = Reservation::new(vec![item(1)], Duration::ZERO).unwrap();
        assert!(res.is_expired());
        let err = res.confirm().unwrap_err();
        assert!(matches!(err, DomainError::ReservationExpired));
        // Still PENDING: only the expirer moves it to EXPIRED.
        assert!(res.is_pending());
    }

    #[test]
    fn release_allowed_even_when_expired() {
        let mut res = Reservation::new(vec![item(1)], Duration::ZERO).unwrap();
        assert!(res.is_expired());
        res.release().unwrap();
        assert_eq!(res.status, ReservationStatus::Released);
    }

    #[test]
    fn terminal_states_admit_no_transitions() {
        for terminal in [
            ReservationStatus::Confirmed,
            ReservationStatus::Released,
            ReservationStatus::Expired,
        ] {
            let mut res = Reservation::new(vec![item(1)], Duration::from_secs(900)).unwrap();
            res.status = terminal;
            assert!(matches!(
                res.confirm(),
                Err(DomainError::ReservationNotPending)
            ));
            assert!(matches!(
                res.release(),
                Err(DomainError::ReservationNotPending)
            ));
            assert!(matches!(
                res.expire(),
                Err(DomainError::ReservationNotPending)
            ));
        }
    }

    #[test]
    fn status_codes_round_trip() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Confirmed,
            ReservationStatus::Released,
            ReservationStatus::Expired,
        ] {
            assert_eq!(ReservationStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(ReservationStatus::from_code(9), None);
    }
}
