use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_stay(stay: &Stay) -> Result<(), EngineError> {
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

/// First non-cancelled booking overlapping `stay`, skipping `exclude`.
pub(crate) fn find_conflict<'a>(
    ledger: &'a ApartmentLedger,
    stay: &Stay,
    exclude: Option<BookingId>,
) -> Option<&'a Booking> {
    ledger
        .overlapping(stay)
        .find(|b| b.is_active() && Some(b.id) != exclude)
}

pub(crate) fn check_no_conflict(
    ledger: &ApartmentLedger,
    stay: &Stay,
    exclude: Option<BookingId>,
) -> Result<(), EngineError> {
    match find_conflict(ledger, stay, exclude) {
        None => Ok(()),
        Some(existing) => {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            tracing::debug!(
                apartment_id = ledger.apartment_id,
                conflicting_booking = existing.id,
                "overlap rejected"
            );
            Err(EngineError::BusinessRule(format!(
                "apartment {} is not available from {} to {}",
                ledger.apartment_id, stay.start, stay.end
            )))
        }
    }
}
