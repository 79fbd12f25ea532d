/// In-flight request counter
///
/// Every request increments the gauge on entry and decrements it when the
/// response is produced or the request future is dropped, whichever comes
/// first. `/health` reports the current value.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared gauge of requests currently being handled
#[derive(Debug, Clone, Default)]
pub struct ActiveRequests(Arc<AtomicUsize>);

impl ActiveRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Counts one request until the returned guard drops
    pub fn enter(&self) -> ActiveRequestGuard {
        self.increment();
        ActiveRequestGuard(self.clone())
    }
}

/// Decrements the gauge on drop
#[derive(Debug)]
pub struct ActiveRequestGuard(ActiveRequests);

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Middleware for `axum::middleware::from_fn_with_state`
pub async fn track_active_requests(
    State(active): State<ActiveRequests>,
    req: Request,
    next: Next,
) -> Response {
    let _guard = active.enter();
    next.run(req).await
}
