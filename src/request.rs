use std::sync::Arc;

use crate::collective::ErrorCell;
use crate::device::{DeviceEvent, DeviceStream, EventPool};
use crate::error::Result;

/// Completion handle for a non-blocking operation.
///
/// Wraps the device event recorded after the operation on its issuing
/// stream, plus the user's original stream. `test` is a host-side
/// non-blocking query; `wait` is a *stream-ordering* operation — it makes
/// subsequent work the user submits to the original stream depend on the
/// operation, and never blocks the host.
///
/// Requests are reference-counted; when the last clone is dropped the
/// completion event returns to its pool. A null request is a no-op for both
/// `test` and `wait`.
#[derive(Clone, Default)]
pub struct Request {
    inner: Option<Arc<RequestInner>>,
}

struct RequestInner {
    op_event: DeviceEvent,
    orig_stream: DeviceStream,
    error: ErrorCell,
    events: Arc<EventPool>,
}

impl Drop for RequestInner {
    fn drop(&mut self) {
        self.events.release(self.op_event.clone());
    }
}

impl Request {
    /// The null request: already complete, no-op to wait on.
    pub fn null() -> Self {
        Self { inner: None }
    }

    pub(crate) fn new(
        op_event: DeviceEvent,
        orig_stream: DeviceStream,
        error: ErrorCell,
        events: Arc<EventPool>,
    ) -> Self {
        Self {
            inner: Some(Arc::new(RequestInner {
                op_event,
                orig_stream,
                error,
                events,
            })),
        }
    }

    pub fn is_null(&self) -> bool {
        self.inner.is_none()
    }

    /// Non-blocking completion query.
    ///
    /// Returns `Ok(true)` once the operation's end event has completed; the
    /// request then resets to null so later calls short-circuit. A transport
    /// failure recorded for this operation surfaces here as `Err`.
    pub fn test(&mut self) -> Result<bool> {
        let Some(inner) = self.inner.clone() else {
            return Ok(true);
        };
        if let Some(err) = inner.error.take() {
            self.inner = None;
            return Err(err);
        }
        if inner.op_event.query() {
            self.inner = None;
            return Ok(true);
        }
        Ok(false)
    }

    /// Make the original stream wait for the operation.
    ///
    /// This enqueues a stream-side wait on the end event; the host returns
    /// immediately regardless of the operation's progress. Subsequent device
    /// work the user submits to that stream is correctly ordered after the
    /// operation.
    pub fn wait(&mut self) -> Result<()> {
        let Some(inner) = self.inner.clone() else {
            return Ok(());
        };
        if let Some(err) = inner.error.take() {
            self.inner = None;
            return Err(err);
        }
        inner.orig_stream.wait_event(&inner.op_event);
        Ok(())
    }
}
