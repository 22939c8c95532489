use crate::errors::Error;
use derive_more::Display;

/// Connection lifecycle phase of one device binding.
///
/// Owned exclusively by the client's internal state machine; mutated only by
/// `connect`/`disconnect` and by reads of the `connecting` completion
/// property.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected. Initial and terminal state.
    #[display("Disconnected")]
    Disconnected,
    /// A connect operation is in flight.
    #[display("Connecting")]
    Connecting,
    /// Connected.
    #[display("Connected")]
    Connected,
    /// A disconnect operation is in flight.
    #[display("Disconnecting")]
    Disconnecting,
}

/// Which way an in-flight operation is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Connect,
    Disconnect,
}

impl Direction {
    /// Member invoked to start the operation on a Platform 7 device.
    pub(crate) const fn start_action(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
        }
    }

    /// Value written to the legacy `Connected` property in emulation mode.
    pub(crate) const fn target(self) -> bool {
        matches!(self, Self::Connect)
    }

    const fn in_flight_state(self) -> ConnectionState {
        match self {
            Self::Connect => ConnectionState::Connecting,
            Self::Disconnect => ConnectionState::Disconnecting,
        }
    }

    const fn settled_state(self) -> ConnectionState {
        match self {
            Self::Connect => ConnectionState::Connected,
            Self::Disconnect => ConnectionState::Disconnected,
        }
    }
}

/// How completion of the in-flight operation is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompletionMode {
    /// The device supports `connect`/`disconnect`/`connecting` natively; the
    /// server is polled for completion.
    Native,
    /// The device predates async connect. The blocking `Connected` write has
    /// already finished by the time the operation is "in flight"; the first
    /// completion-property read reports the stored outcome.
    Emulated,
}

/// Per-device connect/disconnect state machine.
///
/// Pure state transitions only; all I/O lives in the device client. The
/// deferred failure slot holds the outcome of an emulated operation until
/// the completion property is read, and is cleared by that read.
#[derive(Debug)]
pub(crate) struct ConnectionStateMachine {
    state: ConnectionState,
    in_flight: Option<(CompletionMode, Direction)>,
    deferred: Option<Error>,
}

impl ConnectionStateMachine {
    pub(crate) const fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            in_flight: None,
            deferred: None,
        }
    }

    pub(crate) const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Record a started operation. Any deferred failure from a previous
    /// operation is dropped: the caller has started over.
    pub(crate) fn begin(&mut self, mode: CompletionMode, direction: Direction) {
        self.state = direction.in_flight_state();
        self.in_flight = Some((mode, direction));
        self.deferred = None;
    }

    /// Park a failure until the next completion-property read.
    pub(crate) fn defer(&mut self, err: Error) {
        self.deferred = Some(err);
    }

    /// Remove and return the parked failure, if any.
    pub(crate) fn take_deferred(&mut self) -> Option<Error> {
        self.deferred.take()
    }

    pub(crate) const fn in_flight(&self) -> Option<(CompletionMode, Direction)> {
        self.in_flight
    }

    /// The in-flight operation finished successfully.
    pub(crate) fn complete(&mut self, direction: Direction) {
        self.state = direction.settled_state();
        self.in_flight = None;
    }

    /// The in-flight operation failed; failure is terminal.
    pub(crate) fn fail(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.in_flight = None;
    }
}
