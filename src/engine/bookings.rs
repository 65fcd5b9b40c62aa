use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::limits::*;
use crate::model::*;

use super::overlap::{check_no_conflict, validate_stay};
use super::{Engine, EngineError};

/// Booking request after field validation, before any lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewBooking {
    pub renter_id: RenterId,
    pub apartment_id: ApartmentId,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub guests: u8,
}

fn checked_stay(start: NaiveDate, end: NaiveDate) -> Result<Stay, EngineError> {
    let stay = Stay::checked(start, end)
        .ok_or_else(|| EngineError::business("end date must be after start date"))?;
    validate_stay(&stay)?;
    Ok(stay)
}

pub(super) fn ensure_owner(booking: &Booking, caller: RenterId) -> Result<(), EngineError> {
    if booking.renter_id != caller {
        return Err(EngineError::Ownership(format!(
            "booking {} does not belong to the caller",
            booking.id
        )));
    }
    Ok(())
}

fn ensure_confirmed(booking: &Booking, msg: &str) -> Result<(), EngineError> {
    if !booking.is_active() {
        return Err(EngineError::business(msg));
    }
    Ok(())
}

impl Engine {
    /// Renter id behind `email`. An unknown email is `NotFound`.
    pub(super) async fn resolve_caller(&self, email: &str) -> Result<RenterId, EngineError> {
        self.directories
            .renters
            .id_for_email(email)
            .await?
            .ok_or_else(|| EngineError::not_found("renter", email))
    }

    async fn current_rate(&self, apartment_id: ApartmentId) -> Result<Decimal, EngineError> {
        let rate = self
            .directories
            .apartments
            .nightly_rate(apartment_id)
            .await?
            .ok_or_else(|| EngineError::not_found("apartment", apartment_id))?;
        checked_rate(apartment_id, rate)
    }

    pub async fn create_booking(&self, req: NewBooking, caller_email: &str) -> Result<Booking, EngineError> {
        let stay = checked_stay(req.start, req.end)?;
        if !(MIN_GUESTS..=MAX_GUESTS).contains(&req.guests) {
            return Err(EngineError::business(format!(
                "guests must be between {MIN_GUESTS} and {MAX_GUESTS}"
            )));
        }

        // Both lookups finish before any lock is taken.
        let (rate, caller) = futures::try_join!(
            self.directories.apartments.nightly_rate(req.apartment_id),
            self.directories.renters.id_for_email(caller_email),
        )?;
        let rate = rate.ok_or_else(|| EngineError::not_found("apartment", req.apartment_id))?;
        let rate = checked_rate(req.apartment_id, rate)?;
        let caller = caller.ok_or_else(|| EngineError::not_found("renter", caller_email))?;
        if caller != req.renter_id {
            return Err(EngineError::Ownership(format!(
                "caller cannot book on behalf of renter {}",
                req.renter_id
            )));
        }

        let _permit = self.write_permit().await;
        let ledger = self.store.ledger_or_create(req.apartment_id);
        let mut guard = ledger.write().await;

        if guard.bookings.len() >= MAX_BOOKINGS_PER_APARTMENT {
            return Err(EngineError::LimitExceeded("too many bookings for apartment"));
        }
        check_no_conflict(&guard, &stay, None)?;

        let booking = Booking {
            id: self.store.allocate_id(),
            renter_id: req.renter_id,
            apartment_id: req.apartment_id,
            stay,
            cost: stay_cost(&stay, rate),
            state: BookingState::Confirmed,
            guests: req.guests,
            created_at: Utc::now(),
        };
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_booking_event(&mut guard, &event).await?;

        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        tracing::info!(
            booking_id = booking.id,
            apartment_id = booking.apartment_id,
            renter_id = booking.renter_id,
            nights = stay.nights(),
            "booking created"
        );
        Ok(booking)
    }

    pub async fn cancel_booking(&self, id: BookingId, caller_email: &str) -> Result<Booking, EngineError> {
        let apartment_id = self
            .store
            .apartment_for(&id)
            .ok_or_else(|| EngineError::not_found("booking", id))?;
        let caller = self.resolve_caller(caller_email).await?;

        let _permit = self.write_permit().await;
        let ledger = self
            .store
            .ledger(&apartment_id)
            .ok_or_else(|| EngineError::not_found("booking", id))?;
        let mut guard = ledger.write().await;
        let booking = guard.get(id).ok_or_else(|| EngineError::not_found("booking", id))?;
        ensure_owner(booking, caller)?;
        ensure_confirmed(booking, "booking is already cancelled")?;

        let event = Event::BookingCancelled { id, apartment_id };
        self.persist_booking_event(&mut guard, &event).await?;

        metrics::counter!(crate::observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        tracing::info!(booking_id = id, apartment_id, "booking cancelled");
        guard.get(id).cloned().ok_or_else(|| EngineError::not_found("booking", id))
    }

    pub async fn change_booking_dates(
        &self,
        id: BookingId,
        start: NaiveDate,
        end: NaiveDate,
        caller_email: &str,
    ) -> Result<Booking, EngineError> {
        let apartment_id = self
            .store
            .apartment_for(&id)
            .ok_or_else(|| EngineError::not_found("booking", id))?;
        let caller = self.resolve_caller(caller_email).await?;
        let ledger = self
            .store
            .ledger(&apartment_id)
            .ok_or_else(|| EngineError::not_found("booking", id))?;

        {
            let guard = ledger.read().await;
            let booking = guard.get(id).ok_or_else(|| EngineError::not_found("booking", id))?;
            ensure_owner(booking, caller)?;
            ensure_confirmed(booking, "only confirmed bookings can change dates")?;
        }
        let stay = checked_stay(start, end)?;

        // The rate may have changed since the booking was made.
        let rate = self.current_rate(apartment_id).await?;

        let _permit = self.write_permit().await;
        let mut guard = ledger.write().await;
        let booking = guard.get(id).ok_or_else(|| EngineError::not_found("booking", id))?;
        // Re-check: a cancel may have landed while the rate was fetched.
        ensure_confirmed(booking, "only confirmed bookings can change dates")?;
        check_no_conflict(&guard, &stay, Some(id))?;

        let event = Event::BookingRescheduled {
            id,
            apartment_id,
            stay,
            cost: stay_cost(&stay, rate),
        };
        self.persist_booking_event(&mut guard, &event).await?;

        metrics::counter!(crate::observability::BOOKINGS_RESCHEDULED_TOTAL).increment(1);
        tracing::info!(booking_id = id, apartment_id, nights = stay.nights(), "booking dates changed");
        guard.get(id).cloned().ok_or_else(|| EngineError::not_found("booking", id))
    }
}

fn checked_rate(apartment_id: ApartmentId, rate: Decimal) -> Result<Decimal, EngineError> {
    if rate.is_sign_negative() {
        return Err(EngineError::business(format!(
            "apartment {apartment_id} has a negative nightly rate"
        )));
    }
    Ok(rate)
}
