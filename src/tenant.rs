use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::compactor;
use crate::directory::Directories;
use crate::engine::Engine;
use crate::limits::*;

pub const DEFAULT_TENANT: &str = "default";

#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    #[error("tenant name too long")]
    NameTooLong,
    #[error("empty tenant name")]
    EmptyName,
    #[error("too many tenants")]
    TooMany,
    #[error("cannot open tenant: {0}")]
    Io(#[from] io::Error),
}

/// Keep `[A-Za-z0-9_-]`; the result doubles as the WAL file stem.
pub fn sanitize_tenant(raw: &str) -> Result<String, TenantError> {
    if raw.len() > MAX_TENANT_NAME_LEN {
        return Err(TenantError::NameTooLong);
    }
    let safe: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if safe.is_empty() {
        return Err(TenantError::EmptyName);
    }
    Ok(safe)
}

/// Per-tenant engines. Each tenant gets its own Engine, WAL file and compactor.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    /// Tenant slots taken inside an entry guard, never above `MAX_TENANTS`.
    claimed: AtomicUsize,
    data_dir: PathBuf,
    compact_threshold: u64,
    directories: Directories,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, directories: Directories) -> Self {
        Self {
            engines: DashMap::new(),
            claimed: AtomicUsize::new(0),
            data_dir,
            compact_threshold,
            directories,
        }
    }

    /// Get or lazily create the engine for `tenant`. Names that sanitize to the
    /// same string share one engine.
    pub fn get_or_create(&self, tenant: &str) -> Result<Arc<Engine>, TenantError> {
        let name = sanitize_tenant(tenant)?;
        if let Some(engine) = self.engines.get(&name) {
            return Ok(engine.value().clone());
        }
        if self.claimed.load(Ordering::Acquire) >= MAX_TENANTS {
            return Err(TenantError::TooMany);
        }

        // The entry guard makes a concurrent first request for the same tenant
        // wait instead of opening the WAL twice.
        let engine = match self.engines.entry(name.clone()) {
            Entry::Occupied(e) => return Ok(e.get().clone()),
            Entry::Vacant(slot) => {
                self.claim_slot()?;
                let wal_path = self.data_dir.join(format!("{name}.wal"));
                let engine = match Engine::new(wal_path, self.directories.clone()) {
                    Ok(engine) => Arc::new(engine),
                    Err(e) => {
                        self.claimed.fetch_sub(1, Ordering::AcqRel);
                        return Err(e.into());
                    }
                };
                slot.insert(engine.clone());
                engine
            }
        };

        tokio::spawn(compactor::run_compactor(
            engine.clone(),
            name.clone(),
            self.compact_threshold,
        ));
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        tracing::info!(tenant = %name, "tenant loaded");
        Ok(engine)
    }

    fn claim_slot(&self) -> Result<(), TenantError> {
        self.claimed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < MAX_TENANTS).then_some(n + 1))
            .map(|_| ())
            .map_err(|_| TenantError::TooMany)
    }

    pub fn tenant_count(&self) -> usize {
        self.engines.len()
    }
}
