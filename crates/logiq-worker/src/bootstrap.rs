//! One-time storage bootstrap

use std::sync::atomic::{AtomicBool, Ordering};

use logiq_rag::{LogStore, StoreError};
use tokio::sync::Mutex;
use tracing::info;

/// Makes sure the store's schema exists before the first write of the process.
///
/// Double-checked: a lock-free read on the hot path, then the lock and a
/// re-check before doing the setup. A failed setup leaves the guard unset so
/// the next caller tries again.
#[derive(Debug, Default)]
pub struct SchemaGuard {
    ready: AtomicBool,
    lock: Mutex<()>,
}

impl SchemaGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub async fn ensure_ready(&self, store: &dyn LogStore) -> Result<(), StoreError> {
        if self.is_ready() {
            return Ok(());
        }

        let _guard = self.lock.lock().await;
        if self.is_ready() {
            return Ok(());
        }

        store.ensure_schema().await?;
        self.ready.store(true, Ordering::Release);
        info!("Storage schema ready");
        Ok(())
    }
}
