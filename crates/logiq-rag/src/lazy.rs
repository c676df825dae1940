// Load-once resource shared by every caller in the process
//
// The first caller runs the loader; concurrent callers wait for it and then
// share the outcome. A failed load is kept as-is and never retried.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    Ready,
    Failed(String),
}

pub struct LazyResource<T: ?Sized> {
    cell: OnceCell<Result<Arc<T>, String>>,
}

impl<T: ?Sized> LazyResource<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Returns the loaded resource, running `load` only if nobody has yet.
    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<Arc<T>, String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>, String>>,
    {
        self.cell.get_or_init(load).await.clone()
    }

    /// Current state, without triggering a load.
    pub fn state(&self) -> LoadState {
        match self.cell.get() {
            None => LoadState::NotLoaded,
            Some(Ok(_)) => LoadState::Ready,
            Some(Err(reason)) => LoadState::Failed(reason.clone()),
        }
    }
}

impl<T: ?Sized> Default for LazyResource<T> {
    fn default() -> Self {
        Self::new()
    }
}
