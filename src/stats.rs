//! Per-device operational statistics.
//!
//! Counters are updated as each attempt happens, not when the logical
//! operation finishes, so a snapshot taken between attempts shows real
//! progress. They only ever grow until [`Stats::clear`] is called.

/// Something the reliability layer observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatEvent {
    /// A logical operation started.
    Operation,
    /// A datagram was sent.
    Sent,
    /// A datagram was received.
    Received,
    /// An attempt beyond the first was started.
    Retry,
    /// A write read back a different value.
    VerifyFailure,
    /// No reply arrived within the timeout.
    Timeout,
    /// A reply was malformed or answered another command.
    ProtocolError,
    /// The socket reported an error.
    TransportError,
    /// A logical operation exhausted its retry budget.
    Failure,
}

/// Copy of the counters at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatsRecord {
    /// Logical operations started.
    pub operations: u64,
    /// Datagrams sent, including retries and verify reads.
    pub commands_sent: u64,
    /// Datagrams received.
    pub replies_received: u64,
    /// Attempts beyond the first of each operation.
    pub retries: u64,
    /// Verify read-backs that did not match the written value.
    pub verify_failures: u64,
    /// Receives that hit the timeout.
    pub timeouts: u64,
    /// Replies rejected as malformed or mismatched.
    pub protocol_errors: u64,
    /// Socket errors surfaced to the caller.
    pub transport_errors: u64,
    /// Operations that exhausted their retry budget.
    pub total_failures: u64,
    /// Largest number of retries needed by a single operation.
    pub max_retries: u64,
}

impl StatsRecord {
    /// Fraction of sent datagrams that got a reply, or `None` before any send.
    pub fn reply_ratio(&self) -> Option<f64> {
        if self.commands_sent == 0 {
            None
        } else {
            Some(self.replies_received as f64 / self.commands_sent as f64)
        }
    }
}

impl std::fmt::Display for StatsRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ops={} sent={} recv={} retries={} verify_failures={} timeouts={} \
             protocol_errors={} transport_errors={} failures={} max_retries={}",
            self.operations,
            self.commands_sent,
            self.replies_received,
            self.retries,
            self.verify_failures,
            self.timeouts,
            self.protocol_errors,
            self.transport_errors,
            self.total_failures,
            self.max_retries
        )
    }
}

/// Counter set owned by one device.
#[derive(Debug, Default)]
pub struct Stats {
    record: StatsRecord,
}

impl Stats {
    /// Creates a collector with every counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one event.
    pub fn record(&mut self, event: StatEvent) {
        let r = &mut self.record;
        let counter = match event {
            StatEvent::Operation => &mut r.operations,
            StatEvent::Sent => &mut r.commands_sent,
            StatEvent::Received => &mut r.replies_received,
            StatEvent::Retry => &mut r.retries,
            StatEvent::VerifyFailure => &mut r.verify_failures,
            StatEvent::Timeout => &mut r.timeouts,
            StatEvent::ProtocolError => &mut r.protocol_errors,
            StatEvent::TransportError => &mut r.transport_errors,
            StatEvent::Failure => &mut r.total_failures,
        };
        *counter = counter.saturating_add(1);
    }

    /// Notes how many retries one operation needed.
    pub fn observe_retries(&mut self, retries: u32) {
        self.record.max_retries = self.record.max_retries.max(u64::from(retries));
    }

    /// Returns a copy of the current counters.
    pub fn snapshot(&self) -> StatsRecord {
        self.record
    }

    /// Resets every counter to zero.
    pub fn clear(&mut self) {
        self.record = StatsRecord::default();
    }
}
