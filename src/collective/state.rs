use std::sync::{Arc, Mutex};

use crate::device::{DeviceEvent, DeviceStream, EventPool, SyncFlag, SyncFlagPool};
use crate::error::{GantryError, Result};
use crate::transport::BoxedTransportRequest;

/// Where an operation's user-visible device event is recorded, which also
/// fixes its staging shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignalVariant {
    /// Every rank has device-visible output: stage in, copy back, record an
    /// end event after the copy-back.
    SignalAtEnd,
    /// Only ranks with device-visible output copy back and record an end
    /// event; the rest release the stream as soon as the transport finishes.
    SignalNonRootEarly { has_output: bool },
    /// Nothing to stage; the start event is recorded at the very beginning.
    SignalAtStart,
    /// Pure host-memory operation with no device involvement.
    HostOnly,
}

impl SignalVariant {
    fn uses_device(self) -> bool {
        !matches!(self, SignalVariant::HostOnly)
    }

    fn stages_input(self) -> bool {
        matches!(
            self,
            SignalVariant::SignalAtEnd | SignalVariant::SignalNonRootEarly { .. }
        )
    }

    fn signals_at_end(self) -> bool {
        match self {
            SignalVariant::SignalAtEnd => true,
            SignalVariant::SignalNonRootEarly { has_output } => has_output,
            SignalVariant::SignalAtStart | SignalVariant::HostOnly => false,
        }
    }
}

/// Per-operation content of a collective: the staging copies and the
/// transport call. The base machine drives these at the right phase.
pub(crate) trait CollectiveOp: Send {
    fn name(&self) -> &'static str;

    /// Signaling behavior of this operation on this rank.
    fn variant(&self) -> SignalVariant;

    /// Enqueue device→host staging copies on the issuing stream.
    ///
    /// # Safety
    /// The user buffers captured at construction must be valid device
    /// addresses for the operation's extent.
    unsafe fn prepare_device(&mut self, _stream: &DeviceStream) {}

    /// Issue the transport's non-blocking call(s) on the staging buffer.
    fn start_transport(&mut self) -> Result<Vec<BoxedTransportRequest>>;

    /// Enqueue host→device copy-back on the issuing stream.
    ///
    /// # Safety
    /// Same contract as [`CollectiveOp::prepare_device`].
    unsafe fn finish_device(&mut self, _stream: &DeviceStream) {}
}

/// Progress phase of one in-flight collective. Phases advance in order and
/// never regress; transitions are driven entirely by non-blocking polls on
/// the progress thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the start event: staging copies still in flight.
    WaitingForDeviceCopy,
    /// Transport issued; polling its request(s).
    TransportStarted,
    /// Sync flag set; waiting for the end event where one exists.
    Signaled,
    /// Terminal; the state is destroyed.
    Complete,
}

/// Error slot shared between a collective state and its request. The
/// progress thread stores a transport failure here; the earliest
/// host-visible completion query surfaces it.
#[derive(Clone, Default)]
pub(crate) struct ErrorCell {
    inner: Arc<Mutex<Option<GantryError>>>,
}

impl ErrorCell {
    pub(crate) fn set(&self, err: GantryError) {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub(crate) fn take(&self) -> Option<GantryError> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// One in-flight collective: the per-operation content plus the machinery
/// bridging device copy → transport → device copy.
///
/// Construction enqueues, on the issuing stream and in this order: the
/// staging copies, the start event, the sync-flag wait, and (for variants
/// that signal at the end) the copy-back and the end event. The state is
/// then handed to the progress engine, which owns it until destruction.
pub(crate) struct CollectiveState {
    op: Box<dyn CollectiveOp>,
    variant: SignalVariant,
    phase: Phase,
    start_event: Option<DeviceEvent>,
    end_event: Option<DeviceEvent>,
    gpu_wait: Option<SyncFlag>,
    requests: Vec<BoxedTransportRequest>,
    error: ErrorCell,
    events: Arc<EventPool>,
}

impl CollectiveState {
    pub(crate) fn new(
        mut op: Box<dyn CollectiveOp>,
        stream: &DeviceStream,
        events: &Arc<EventPool>,
        sync_flags: &Arc<SyncFlagPool>,
        error: ErrorCell,
    ) -> Self {
        let variant = op.variant();
        let mut start_event = None;
        let mut end_event = None;
        let mut gpu_wait = None;

        if variant.uses_device() {
            if variant.stages_input() {
                unsafe { op.prepare_device(stream) };
            }
            let start = events.get();
            start.record(stream);
            let wait = sync_flags.get();
            wait.wait(stream);
            if variant.signals_at_end() {
                unsafe { op.finish_device(stream) };
                let end = events.get();
                end.record(stream);
                end_event = Some(end);
            }
            start_event = Some(start);
            gpu_wait = Some(wait);
        }

        Self {
            op,
            variant,
            phase: Phase::WaitingForDeviceCopy,
            start_event,
            end_event,
            gpu_wait,
            requests: Vec::new(),
            error,
            events: Arc::clone(events),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.op.name()
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// Advance by at most one phase via non-blocking polls. Returns whether
    /// any progress was made.
    pub(crate) fn step(&mut self) -> bool {
        match self.phase {
            Phase::WaitingForDeviceCopy => {
                if !self.start_event.as_ref().is_none_or(DeviceEvent::query) {
                    return false;
                }
                match self.op.start_transport() {
                    Ok(requests) => {
                        tracing::trace!(op = self.op.name(), "transport started");
                        self.requests = requests;
                        self.phase = Phase::TransportStarted;
                    }
                    Err(err) => self.fail(err),
                }
                true
            }
            Phase::TransportStarted => {
                let mut all_done = true;
                for req in &mut self.requests {
                    match req.test() {
                        Ok(done) => all_done &= done,
                        Err(err) => {
                            self.fail(err);
                            return true;
                        }
                    }
                }
                if !all_done {
                    return false;
                }
                if let Some(wait) = &self.gpu_wait {
                    wait.signal();
                }
                self.phase = Phase::Signaled;
                true
            }
            Phase::Signaled => {
                if self.variant.signals_at_end()
                    && !self.end_event.as_ref().is_none_or(DeviceEvent::query)
                {
                    return false;
                }
                tracing::trace!(op = self.op.name(), "collective complete");
                self.phase = Phase::Complete;
                true
            }
            Phase::Complete => false,
        }
    }

    /// Record a transport failure and release the device stream. The state
    /// still runs through its terminal phase so the staging buffer outlives
    /// any copy-back already enqueued on the stream; buffer contents are
    /// unspecified after a failure.
    fn fail(&mut self, err: GantryError) {
        tracing::warn!(op = self.op.name(), "transport failure: {err}");
        self.error.set(err);
        if let Some(wait) = &self.gpu_wait {
            wait.signal();
        }
        self.phase = Phase::Signaled;
    }

    #[cfg(test)]
    pub(crate) fn signals_at_end(&self) -> bool {
        self.variant.signals_at_end()
    }
}

impl Drop for CollectiveState {
    fn drop(&mut self) {
        if let Some(event) = self.start_event.take() {
            self.events.release(event);
        }
        if let Some(event) = self.end_event.take() {
            self.events.release(event);
        }
    }
}
