use core::net::Ipv4Addr;

/// A result type defaulting to the crate [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `snowgrid` can emit.
///
/// Nothing here is downgraded to a default value: every failure surfaces to
/// the caller of `next()` or of registration, since silently continuing could
/// hand out duplicate IDs.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The worker bit width is outside `[1, 9]`.
    #[error("worker bits must be within [1, {max}], got {got}")]
    InvalidWorkerBits { got: u8, max: u8 },

    /// The configured start time lies in the future of the clock.
    #[error("start time {start_time} is ahead of the clock ({now})")]
    StartTimeInFuture { start_time: u64, now: u64 },

    /// The worker ID does not fit the configured worker bits.
    #[error("worker id {got} exceeds the maximum of {max}")]
    WorkerIdOutOfRange { got: u32, max: u32 },

    /// The data center ID does not fit the bits left over by the worker ID.
    #[error("data center id {got} exceeds the maximum of {max}")]
    DataCenterIdOutOfRange { got: u32, max: u32 },

    /// The clock moved backwards beyond the tolerated drift, or did not
    /// recover within the drift wait.
    #[error("clock moved backwards by {offset}ms, refusing to generate ids")]
    ClockMovedBackwards { offset: u64 },

    /// The clock reads earlier than the encoder's start time.
    #[error("clock ({now}) is behind the start time ({start_time})")]
    ClockBeforeStartTime { now: u64, start_time: u64 },

    /// The elapsed time since the start time no longer fits the timestamp
    /// field.
    #[error("timestamp delta {delta} exceeds the {bits}-bit timestamp field")]
    TimestampOverflow { delta: u64, bits: u8 },

    /// A suffix number must be non-negative.
    #[error("suffix number must be >= 0, got {0}")]
    NegativeSuffix(i64),

    /// A correlated value cannot be turned into a suffix number.
    #[error("correlated value {0:?} is not numeric")]
    InvalidCorrelatedValue(String),

    /// The generator derives its suffix from a sibling value, but none was
    /// supplied.
    #[error("generator requires a correlated value from `{0}`")]
    MissingCorrelatedValue(String),

    /// Registration could not converge on the client's worker.
    #[error("generator failed to match the coordinated worker after {attempts} attempts")]
    CoordinationExhausted { attempts: usize },

    /// The coordination authority revoked this process. Terminal for the
    /// client instance.
    #[error("worker assignment was revoked by the coordination authority")]
    Revoked,

    /// The registry or client was shut down, or the generator was retired
    /// with it. Terminal.
    #[error("id generation has been shut down")]
    ShutDown,

    /// The client hands out workers for a different layout than the
    /// registry's settings.
    #[error("client uses {client} worker bits, settings use {settings}")]
    LayoutMismatch { client: u8, settings: u8 },

    /// The client has never received a worker assignment.
    #[error("no worker has been assigned yet")]
    WorkerUnassigned,

    /// The static assignment table has no entry for this host.
    #[error("no static worker assignment for {ip}")]
    NoStaticAssignment { ip: Ipv4Addr },

    /// A network client was requested without a coordination authority.
    #[error("network coordination requires an authority")]
    MissingAuthority,

    /// No private IPv4 address could be found for this host.
    #[error("unable to resolve a private IPv4 address for this host")]
    NoPrivateAddress,

    /// The coordination authority could not be reached or answered with an
    /// error.
    #[error("coordination authority error: {0}")]
    Authority(String),

    /// A static assignment table could not be parsed.
    #[error("invalid static assignments: {0}")]
    InvalidAssignments(String),
}

impl Error {
    /// Returns `true` for errors raised while validating configuration.
    ///
    /// These are fatal: retrying with the same arguments fails the same way.
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidWorkerBits { .. }
                | Self::StartTimeInFuture { .. }
                | Self::WorkerIdOutOfRange { .. }
                | Self::DataCenterIdOutOfRange { .. }
                | Self::NoStaticAssignment { .. }
                | Self::InvalidAssignments(_)
                | Self::MissingAuthority
                | Self::LayoutMismatch { .. }
        )
    }
}
