mod bookings;
mod error;
mod filters;
mod overlap;
mod queries;
mod store;
#[cfg(test)]
mod tests;

pub use bookings::NewBooking;
pub use error::EngineError;
pub use queries::PageRequest;
pub use store::{BookingStore, RuleBook, SharedLedger};

use std::io;
use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::directory::Directories;
use crate::model::*;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(crate) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the batch result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut pending = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            pending = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = pending {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!(error = %e, batch = batch.len(), "WAL flush failed");
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partial bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

// ── Engine ───────────────────────────────────────────────

/// Bookings and pricing rules of one tenant.
pub struct Engine {
    pub(crate) store: BookingStore,
    pub(crate) rules: RwLock<RuleBook>,
    pub(crate) directories: Directories,
    wal_tx: Option<mpsc::Sender<WalCommand>>,
    /// Mutations hold this shared for their whole critical section; compaction
    /// holds it exclusively so its snapshot and the file swap see no appends.
    write_gate: RwLock<()>,
}

impl Engine {
    /// Replay `wal_path` (if present) and start its group-commit writer.
    pub fn new(wal_path: PathBuf, directories: Directories) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self::build(directories, Some(wal_tx));
        engine.replay(&events)?;
        tracing::debug!(path = %wal_path.display(), events = events.len(), "engine replayed WAL");
        Ok(engine)
    }

    /// Engine without durability. Nothing is logged; state dies with the value.
    pub fn in_memory(directories: Directories) -> Self {
        Self::build(directories, None)
    }

    fn build(directories: Directories, wal_tx: Option<mpsc::Sender<WalCommand>>) -> Self {
        Self {
            store: BookingStore::new(),
            rules: RwLock::new(RuleBook::default()),
            directories,
            wal_tx,
            write_gate: RwLock::new(()),
        }
    }

    /// Nothing else holds these locks yet, so `try_write` cannot contend. Never
    /// block here: replay may run inside the runtime during lazy tenant creation.
    fn replay(&self, events: &[Event]) -> io::Result<()> {
        let contended = || io::Error::other("lock contended during replay");
        for event in events {
            match event.apartment_id() {
                Some(apartment_id) => {
                    let ledger = self.store.ledger_or_create(apartment_id);
                    let mut guard = ledger.try_write().map_err(|_| contended())?;
                    self.store.apply_event(&mut guard, event);
                }
                None => {
                    if let Event::SequencesReserved { next_booking_id, .. } = event {
                        self.store.reserve_ids_below(*next_booking_id);
                    }
                    let mut book = self.rules.try_write().map_err(|_| contended())?;
                    book.apply_event(event);
                }
            }
        }
        Ok(())
    }

    pub(crate) async fn write_permit(&self) -> tokio::sync::RwLockReadGuard<'_, ()> {
        self.write_gate.read().await
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply to the ledger whose write lock the caller holds.
    pub(crate) async fn persist_booking_event(
        &self,
        ledger: &mut ApartmentLedger,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(ledger, event);
        Ok(())
    }

    pub(crate) async fn persist_rule_event(&self, book: &mut RuleBook, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        book.apply_event(event);
        Ok(())
    }

    /// Rewrite the WAL with one event per live booking and rule.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let _gate = self.write_gate.write().await;

        let book = self.rules.read().await;
        let mut events = vec![Event::SequencesReserved {
            next_booking_id: self.store.peek_id(),
            next_rule_id: book.peek_id(),
        }];
        for (_, ledger) in self.store.ledgers() {
            let guard = ledger.read().await;
            events.extend(
                guard
                    .bookings
                    .iter()
                    .cloned()
                    .map(|booking| Event::BookingCreated { booking }),
            );
        }
        events.extend(book.rules.values().cloned().map(|rule| Event::FilterSaved { rule }));
        drop(book);

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let Some(wal_tx) = &self.wal_tx else {
            return 0;
        };
        let (tx, rx) = oneshot::channel();
        if wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
