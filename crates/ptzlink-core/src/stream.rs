// ── Reactive status stream ──
//
// Subscription to a session's "latest known status" cell.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use ptzlink_api::StatusReport;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

type Cell = Option<Arc<StatusReport>>;

/// Point-in-time access to the latest status report plus change
/// notification.
pub struct StatusWatch {
    receiver: watch::Receiver<Cell>,
}

impl StatusWatch {
    pub(crate) fn new(receiver: watch::Receiver<Cell>) -> Self {
        Self { receiver }
    }

    /// The most recent report, if any has arrived.
    pub fn latest(&self) -> Option<Arc<StatusReport>> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next report.
    /// Returns `None` once the session has shut down.
    pub async fn changed(&mut self) -> Option<Arc<StatusReport>> {
        loop {
            self.receiver.changed().await.ok()?;
            if let Some(report) = self.receiver.borrow_and_update().clone() {
                return Some(report);
            }
        }
    }

    /// Convert into a `Stream` of future reports.
    pub fn into_stream(self) -> StatusStream {
        StatusStream {
            inner: WatchStream::from_changes(self.receiver),
        }
    }
}

/// `Stream` adapter yielding each new status report.
pub struct StatusStream {
    inner: WatchStream<Cell>,
}

impl Stream for StatusStream {
    type Item = Arc<StatusReport>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Some(report))) => return Poll::Ready(Some(report)),
                Poll::Ready(Some(None)) => {}
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
