use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::model::*;
use crate::rules::{Rule, RuleId};

pub type SharedLedger = Arc<RwLock<ApartmentLedger>>;

/// Booking storage: one lock-protected ledger per apartment plus the indexes
/// needed to find a booking or a renter's bookings without scanning ledgers.
pub struct BookingStore {
    ledgers: DashMap<ApartmentId, SharedLedger>,
    booking_to_apartment: DashMap<BookingId, ApartmentId>,
    by_renter: DashMap<RenterId, Vec<BookingId>>,
    next_id: AtomicU64,
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingStore {
    pub fn new() -> Self {
        Self {
            ledgers: DashMap::new(),
            booking_to_apartment: DashMap::new(),
            by_renter: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    // ── Ledgers ──────────────────────────────────────────────

    pub fn ledger(&self, apartment_id: &ApartmentId) -> Option<SharedLedger> {
        self.ledgers.get(apartment_id).map(|e| e.value().clone())
    }

    pub fn ledger_or_create(&self, apartment_id: ApartmentId) -> SharedLedger {
        self.ledgers
            .entry(apartment_id)
            .or_insert_with(|| Arc::new(RwLock::new(ApartmentLedger::new(apartment_id))))
            .value()
            .clone()
    }

    /// Snapshot of `(apartment_id, ledger)` pairs sorted by apartment id.
    pub fn ledgers(&self) -> Vec<(ApartmentId, SharedLedger)> {
        let mut all: Vec<_> = self
            .ledgers
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    // ── Indexes ──────────────────────────────────────────────

    pub fn apartment_for(&self, booking_id: &BookingId) -> Option<ApartmentId> {
        self.booking_to_apartment.get(booking_id).map(|e| *e.value())
    }

    pub fn renter_bookings(&self, renter_id: &RenterId) -> Vec<BookingId> {
        self.by_renter
            .get(renter_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    // ── Ids ──────────────────────────────────────────────────

    pub fn allocate_id(&self) -> BookingId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn peek_id(&self) -> BookingId {
        self.next_id.load(Ordering::Relaxed)
    }

    /// Keep the sequence ahead of ids seen during replay.
    pub fn reserve_ids_below(&self, next: BookingId) {
        self.next_id.fetch_max(next, Ordering::Relaxed);
    }

    fn observe_id(&self, id: BookingId) {
        self.reserve_ids_below(id + 1);
    }

    // ── Event application ────────────────────────────────────

    /// Apply a booking event to its apartment's ledger. The caller holds the
    /// ledger's write lock; filter events are ignored here.
    pub fn apply_event(&self, ledger: &mut ApartmentLedger, event: &Event) {
        match event {
            Event::BookingCreated { booking } => {
                self.observe_id(booking.id);
                self.booking_to_apartment.insert(booking.id, booking.apartment_id);
                self.by_renter
                    .entry(booking.renter_id)
                    .or_default()
                    .push(booking.id);
                ledger.insert_booking(booking.clone());
            }
            Event::BookingRescheduled { id, stay, cost, .. } => {
                // Re-insert so the ledger stays sorted by start date.
                if let Some(mut booking) = ledger.remove_booking(*id) {
                    booking.stay = *stay;
                    booking.cost = *cost;
                    ledger.insert_booking(booking);
                }
            }
            Event::BookingCancelled { id, .. } => {
                if let Some(booking) = ledger.get_mut(*id) {
                    booking.state = BookingState::Cancelled;
                }
            }
            Event::FilterSaved { .. }
            | Event::FilterDeleted { .. }
            | Event::SequencesReserved { .. } => {}
        }
    }
}

/// All pricing rules of a tenant, keyed (and therefore ordered) by id.
#[derive(Debug)]
pub struct RuleBook {
    pub rules: BTreeMap<RuleId, Rule>,
    next_id: RuleId,
}

impl Default for RuleBook {
    fn default() -> Self {
        Self {
            rules: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl RuleBook {
    /// Id the next created rule will get. Only consumed once its event is applied.
    pub fn peek_id(&self) -> RuleId {
        self.next_id
    }

    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::FilterSaved { rule } => {
                self.next_id = self.next_id.max(rule.id + 1);
                self.rules.insert(rule.id, rule.clone());
            }
            Event::FilterDeleted { id } => {
                self.rules.remove(id);
            }
            Event::SequencesReserved { next_rule_id, .. } => {
                self.next_id = self.next_id.max(*next_rule_id);
            }
            Event::BookingCreated { .. }
            | Event::BookingRescheduled { .. }
            | Event::BookingCancelled { .. } => {}
        }
    }
}
