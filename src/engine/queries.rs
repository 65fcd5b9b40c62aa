use std::collections::{BTreeMap, BTreeSet};

use crate::limits::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::model::*;

use super::bookings::ensure_owner;
use super::overlap::find_conflict;
use super::{Engine, EngineError};

/// Zero-based page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl PageRequest {
    pub fn new(page: Option<usize>, size: Option<usize>) -> Self {
        Self {
            page: page.unwrap_or(0),
            size: size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    fn apply(&self, bookings: Vec<Booking>) -> Vec<Booking> {
        bookings
            .into_iter()
            .skip(self.page.saturating_mul(self.size))
            .take(self.size)
            .collect()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Start date descending, ties by id descending.
fn newest_first(bookings: &mut [Booking]) {
    bookings.sort_by(|a, b| b.stay.start.cmp(&a.stay.start).then(b.id.cmp(&a.id)));
}

impl Engine {
    async fn booking(&self, id: BookingId) -> Option<Booking> {
        let apartment_id = self.store.apartment_for(&id)?;
        let ledger = self.store.ledger(&apartment_id)?;
        let guard = ledger.read().await;
        guard.get(id).cloned()
    }

    /// Owner-only read of a single booking.
    pub async fn get_booking(&self, id: BookingId, caller_email: &str) -> Result<Booking, EngineError> {
        let booking = self
            .booking(id)
            .await
            .ok_or_else(|| EngineError::not_found("booking", id))?;
        let caller = self.resolve_caller(caller_email).await?;
        ensure_owner(&booking, caller)?;
        Ok(booking)
    }

    pub fn booking_exists(&self, id: BookingId) -> bool {
        self.store.apartment_for(&id).is_some()
    }

    pub async fn list_by_renter(
        &self,
        renter_id: RenterId,
        caller_email: &str,
        page: PageRequest,
    ) -> Result<Vec<Booking>, EngineError> {
        let caller = self.resolve_caller(caller_email).await?;
        if caller != renter_id {
            return Err(EngineError::Ownership(format!(
                "caller cannot list bookings of renter {renter_id}"
            )));
        }

        let mut by_apartment: BTreeMap<ApartmentId, Vec<BookingId>> = BTreeMap::new();
        for id in self.store.renter_bookings(&renter_id) {
            if let Some(apartment_id) = self.store.apartment_for(&id) {
                by_apartment.entry(apartment_id).or_default().push(id);
            }
        }

        let mut bookings = Vec::new();
        for (apartment_id, ids) in by_apartment {
            let Some(ledger) = self.store.ledger(&apartment_id) else {
                continue;
            };
            let guard = ledger.read().await;
            bookings.extend(ids.into_iter().filter_map(|id| guard.get(id).cloned()));
        }
        newest_first(&mut bookings);
        Ok(page.apply(bookings))
    }

    pub async fn list_by_apartment(&self, apartment_id: ApartmentId, page: PageRequest) -> Vec<Booking> {
        let Some(ledger) = self.store.ledger(&apartment_id) else {
            return Vec::new();
        };
        let mut bookings = ledger.read().await.bookings.clone();
        newest_first(&mut bookings);
        page.apply(bookings)
    }

    /// True when no non-cancelled booking other than `exclude` overlaps `stay`.
    pub async fn is_available(&self, apartment_id: ApartmentId, stay: &Stay, exclude: Option<BookingId>) -> bool {
        let Some(ledger) = self.store.ledger(&apartment_id) else {
            return true;
        };
        let guard = ledger.read().await;
        find_conflict(&guard, stay, exclude).is_none()
    }

    /// Every apartment with at least one non-cancelled booking overlapping `stay`.
    pub async fn unavailable_apartments(&self, stay: &Stay) -> BTreeSet<ApartmentId> {
        let mut taken = BTreeSet::new();
        for (apartment_id, ledger) in self.store.ledgers() {
            let guard = ledger.read().await;
            if find_conflict(&guard, stay, None).is_some() {
                taken.insert(apartment_id);
            }
        }
        taken
    }
}
