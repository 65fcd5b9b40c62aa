use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::rules::{Rule, RuleId};

pub type BookingId = u64;
pub type ApartmentId = u64;
pub type RenterId = u64;

/// Half-open night range `[start, end)`. `end` is the checkout date and is not occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stay {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Stay {
    #[cfg(test)]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "Stay start must be before end");
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn checked(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn nights(&self) -> u32 {
        (self.end - self.start).num_days() as u32
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Every occupied night, check-in inclusive, checkout exclusive.
    pub fn night_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d < self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingState {
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub renter_id: RenterId,
    pub apartment_id: ApartmentId,
    pub stay: Stay,
    pub cost: Decimal,
    pub state: BookingState,
    pub guests: u8,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.state == BookingState::Confirmed
    }
}

/// `nights × rate`, the only cost formula bookings use.
pub fn stay_cost(stay: &Stay, nightly_rate: Decimal) -> Decimal {
    Decimal::from(stay.nights()) * nightly_rate
}

/// All bookings of one apartment, cancelled ones included, sorted by `stay.start`.
#[derive(Debug, Clone)]
pub struct ApartmentLedger {
    pub apartment_id: ApartmentId,
    pub bookings: Vec<Booking>,
}

impl ApartmentLedger {
    pub fn new(apartment_id: ApartmentId) -> Self {
        Self {
            apartment_id,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by stay.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.stay.start <= booking.stay.start);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: BookingId) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn get(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: BookingId) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings (any state) whose stay overlaps `query`.
    /// Everything from `right_bound` on starts at or after `query.end`.
    pub fn overlapping(&self, query: &Stay) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.stay.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.stay.end > query.start)
    }
}

/// WAL record format. Each variant is self-contained so replay needs no lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated {
        booking: Booking,
    },
    BookingRescheduled {
        id: BookingId,
        apartment_id: ApartmentId,
        stay: Stay,
        cost: Decimal,
    },
    BookingCancelled {
        id: BookingId,
        apartment_id: ApartmentId,
    },
    FilterSaved {
        rule: Rule,
    },
    FilterDeleted {
        id: RuleId,
    },
    /// Written first by compaction so sequences survive dropped records.
    SequencesReserved {
        next_booking_id: BookingId,
        next_rule_id: RuleId,
    },
}

impl Event {
    pub fn apartment_id(&self) -> Option<ApartmentId> {
        match self {
            Event::BookingCreated { booking } => Some(booking.apartment_id),
            Event::BookingRescheduled { apartment_id, .. }
            | Event::BookingCancelled { apartment_id, .. } => Some(*apartment_id),
            Event::FilterSaved { .. }
            | Event::FilterDeleted { .. }
            | Event::SequencesReserved { .. } => None,
        }
    }
}

#[cfg(test)]
pub(crate) fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stay(a: &str, b: &str) -> Stay {
        Stay::new(date(a), date(b))
    }

    fn booking(id: BookingId, a: &str, b: &str) -> Booking {
        Booking {
            id,
            renter_id: 7,
            apartment_id: 1,
            stay: stay(a, b),
            cost: Decimal::ZERO,
            state: BookingState::Confirmed,
            guests: 2,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn stay_nights() {
        assert_eq!(stay("2025-01-10", "2025-01-15").nights(), 5);
        assert_eq!(stay("2025-02-28", "2025-03-01").nights(), 1);
        assert_eq!(stay("2024-02-28", "2024-03-01").nights(), 2); // leap year
    }

    #[test]
    fn stay_checked_rejects_empty_and_inverted() {
        assert!(Stay::checked(date("2025-01-10"), date("2025-01-10")).is_none());
        assert!(Stay::checked(date("2025-01-11"), date("2025-01-10")).is_none());
        assert!(Stay::checked(date("2025-01-10"), date("2025-01-11")).is_some());
    }

    #[test]
    fn stay_overlap_is_half_open() {
        let a = stay("2025-01-10", "2025-01-15");
        assert!(a.overlaps(&stay("2025-01-14", "2025-01-20")));
        assert!(a.overlaps(&stay("2025-01-01", "2025-01-11")));
        assert!(a.overlaps(&stay("2025-01-11", "2025-01-12")));
        assert!(!a.overlaps(&stay("2025-01-15", "2025-01-20"))); // checkout day = next check-in
        assert!(!a.overlaps(&stay("2025-01-05", "2025-01-10")));
    }

    #[test]
    fn night_dates_excludes_checkout() {
        let nights: Vec<_> = stay("2025-01-10", "2025-01-13").night_dates().collect();
        assert_eq!(nights, vec![date("2025-01-10"), date("2025-01-11"), date("2025-01-12")]);
    }

    #[test]
    fn cost_is_nights_times_rate() {
        let s = stay("2025-01-10", "2025-01-15");
        assert_eq!(stay_cost(&s, Decimal::from(100)), Decimal::from(500));
        assert_eq!(stay_cost(&s, Decimal::new(8050, 2)), Decimal::new(40250, 2));
    }

    #[test]
    fn ledger_keeps_start_order() {
        let mut ledger = ApartmentLedger::new(1);
        ledger.insert_booking(booking(1, "2025-03-01", "2025-03-05"));
        ledger.insert_booking(booking(2, "2025-01-01", "2025-01-05"));
        ledger.insert_booking(booking(3, "2025-02-01", "2025-02-05"));
        let ids: Vec<_> = ledger.bookings.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn ledger_remove_and_get() {
        let mut ledger = ApartmentLedger::new(1);
        ledger.insert_booking(booking(1, "2025-01-01", "2025-01-05"));
        ledger.insert_booking(booking(2, "2025-02-01", "2025-02-05"));
        assert!(ledger.remove_booking(99).is_none());
        assert_eq!(ledger.remove_booking(1).map(|b| b.id), Some(1));
        assert!(ledger.get(1).is_none());
        assert_eq!(ledger.get(2).map(|b| b.id), Some(2));
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut ledger = ApartmentLedger::new(1);
        ledger.insert_booking(booking(1, "2025-01-01", "2025-01-05"));
        ledger.insert_booking(booking(2, "2025-01-08", "2025-01-12"));
        ledger.insert_booking(booking(3, "2025-02-01", "2025-02-05"));

        let hits: Vec<_> = ledger
            .overlapping(&stay("2025-01-10", "2025-01-20"))
            .map(|b| b.id)
            .collect();
        assert_eq!(hits, vec![2]);
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut ledger = ApartmentLedger::new(1);
        ledger.insert_booking(booking(1, "2025-01-01", "2025-01-05"));
        assert_eq!(ledger.overlapping(&stay("2025-01-05", "2025-01-07")).count(), 0);
        assert_eq!(ledger.overlapping(&stay("2024-12-28", "2025-01-01")).count(), 0);
    }

    #[test]
    fn overlapping_long_booking_spanning_query() {
        let mut ledger = ApartmentLedger::new(1);
        ledger.insert_booking(booking(1, "2025-01-01", "2025-03-01"));
        assert_eq!(ledger.overlapping(&stay("2025-02-01", "2025-02-02")).count(), 1);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            booking: booking(4, "2025-01-01", "2025-01-05"),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
