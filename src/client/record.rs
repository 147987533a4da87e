use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::transport::PeerAddress;
use crate::wire::ReadoutError;
use crate::Field;

/// Lifecycle of an outstanding readout, as seen by the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadoutState {
    /// Sent, no acknowledgement yet
    WaitingForResponse,
    /// The responder accepted and will read out
    Accepted,
    /// The responder refused the request
    Rejected,
    /// The readout has begun on the remote device
    Started,
    /// Field data is arriving
    Receiving,
    /// All data received
    Received,
    /// The readout ended with errors
    Failure,
    /// Cancelled locally
    Cancelled,
    /// No traffic arrived within the timeout
    TimedOut,
}

impl ReadoutState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReadoutState::Rejected
                | ReadoutState::Received
                | ReadoutState::Failure
                | ReadoutState::Cancelled
                | ReadoutState::TimedOut
        )
    }
}

/// Progress snapshot delivered on the update channel of a readout or
/// subscription. `recent_fields` and `recent_errors` carry only what the
/// latest push brought in; the `total_*` counters cover the whole readout
/// so far.
#[derive(Debug, Clone)]
pub struct ReadoutUpdate {
    pub seqnr: u32,
    pub state: ReadoutState,
    pub done: bool,
    pub recent_fields: Vec<Field>,
    pub recent_errors: Vec<ReadoutError>,
    pub total_fields: usize,
    pub total_errors: usize,
    pub error_message: Option<String>,
}

pub(crate) struct ReadoutRecord {
    pub(crate) peer: PeerAddress,
    pub(crate) state: ReadoutState,
    pub(crate) is_subscription: bool,
    /// Absent for subscriptions, which never time out.
    pub(crate) deadline: Option<Instant>,
    pub(crate) timeout: Duration,
    pub(crate) total_fields: usize,
    pub(crate) total_errors: usize,
    pub(crate) updates: mpsc::UnboundedSender<ReadoutUpdate>,
}

impl ReadoutRecord {
    /// Any traffic on a plain readout pushes its deadline forward.
    pub(crate) fn touch(&mut self) {
        if !self.is_subscription {
            self.deadline = Some(Instant::now() + self.timeout);
        }
    }

    pub(crate) fn emit(
        &self,
        seqnr: u32,
        done: bool,
        recent_fields: Vec<Field>,
        recent_errors: Vec<ReadoutError>,
        error_message: Option<String>,
    ) {
        let _ = self.updates.send(ReadoutUpdate {
            seqnr,
            state: self.state,
            done,
            recent_fields,
            recent_errors,
            total_fields: self.total_fields,
            total_errors: self.total_errors,
            error_message,
        });
    }
}
