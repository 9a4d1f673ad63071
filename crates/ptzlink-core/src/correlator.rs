// ── Status correlation ──
//
// One pending `get_status` slot per session plus a "latest known status"
// cell. Any inbound status report updates the cell and resolves the slot;
// the slot also resolves (as a timeout) when its deadline passes.

use std::sync::Arc;
use std::time::Duration;

use ptzlink_api::StatusReport;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::CoreError;

pub(crate) type StatusResult = Result<Arc<StatusReport>, CoreError>;
pub(crate) type StatusWaiter = oneshot::Sender<StatusResult>;

#[derive(Debug)]
struct Pending {
    request_id: Uuid,
    /// Each caller keeps the deadline it joined with; a later request
    /// replaces the marker but never extends an earlier caller's wait.
    waiters: Vec<(StatusWaiter, Instant)>,
}

#[derive(Debug)]
pub(crate) struct StatusCorrelator {
    timeout: Duration,
    pending: Option<Pending>,
    latest: watch::Sender<Option<Arc<StatusReport>>>,
}

impl StatusCorrelator {
    pub(crate) fn new(timeout: Duration) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            timeout,
            pending: None,
            latest,
        }
    }

    /// Register a caller waiting on the next status report.
    ///
    /// Issues a fresh request id. Callers already waiting stay attached to
    /// the slot with their own deadlines: there is never more than one
    /// outstanding request.
    pub(crate) fn begin(&mut self, waiter: StatusWaiter, now: Instant) -> Uuid {
        let request_id = Uuid::new_v4();
        let mut waiters = self.pending.take().map(|p| p.waiters).unwrap_or_default();
        waiters.push((waiter, now + self.timeout));

        self.pending = Some(Pending { request_id, waiters });
        request_id
    }

    /// Publish a report and resolve the pending request, if any.
    pub(crate) fn resolve(&mut self, report: StatusReport) -> Arc<StatusReport> {
        let report = Arc::new(report);
        self.latest.send_replace(Some(Arc::clone(&report)));

        if let Some(pending) = self.pending.take() {
            match report.request_id {
                Some(id) if id != pending.request_id => {
                    tracing::debug!(
                        expected = %pending.request_id,
                        received = %id,
                        "status report answers a superseded request"
                    );
                }
                _ => {}
            }
            for (waiter, _) in pending.waiters {
                let _ = waiter.send(Ok(Arc::clone(&report)));
            }
        }

        report
    }

    /// Fail every waiter whose deadline has passed. Returns `true` if any
    /// waiter timed out.
    pub(crate) fn poll_timeout(&mut self, now: Instant) -> bool {
        let Some(pending) = self.pending.as_mut() else {
            return false;
        };
        let (expired, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut pending.waiters)
            .into_iter()
            .partition(|(_, deadline)| *deadline <= now);
        pending.waiters = waiting;
        if expired.is_empty() {
            return false;
        }

        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        tracing::warn!(
            request_id = %pending.request_id,
            timeout_ms,
            expired = expired.len(),
            "status request timed out"
        );
        for (waiter, _) in expired {
            let _ = waiter.send(Err(CoreError::StatusTimeout { timeout_ms }));
        }
        if pending.waiters.is_empty() {
            self.pending = None;
        }
        true
    }

    /// Resolve every waiter with `error`.
    pub(crate) fn cancel_all(&mut self, error: &CoreError) {
        if let Some(pending) = self.pending.take() {
            for (waiter, _) in pending.waiters {
                let _ = waiter.send(Err(error.clone()));
            }
        }
    }

    /// Earliest deadline among the waiting callers.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.pending
            .as_ref()
            .and_then(|p| p.waiters.iter().map(|(_, deadline)| *deadline).min())
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn latest(&self) -> Option<Arc<StatusReport>> {
        self.latest.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<Arc<StatusReport>>> {
        self.latest.subscribe()
    }
}
