use crate::{CUSTOM_EPOCH, Error, IdLayout, Result, TimeSource};

/// Default worker bit width: 5 bits of worker ID, 5 bits of data center ID.
pub const DEFAULT_WORKER_BITS: u8 = 5;

/// Maximum number of register/rebuild rounds a generator performs before
/// giving up on matching its coordination client.
pub const MAX_REGISTRATION_ATTEMPTS: usize = 10;

/// Process-wide ID settings.
///
/// `start_time` is the epoch (milliseconds since 1970-01-01 UTC) subtracted
/// from every timestamp; it must not lie in the future. `worker_bits` splits
/// the ten ID bits between worker and data center.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct Settings {
    pub start_time: u64,
    pub worker_bits: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            start_time: CUSTOM_EPOCH,
            worker_bits: DEFAULT_WORKER_BITS,
        }
    }
}

impl Settings {
    pub const fn new(start_time: u64, worker_bits: u8) -> Self {
        Self {
            start_time,
            worker_bits,
        }
    }

    /// Returns the validated ID layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWorkerBits`] for a width outside `[1, 9]`.
    pub const fn layout(&self) -> Result<IdLayout> {
        IdLayout::new(self.worker_bits)
    }

    /// Validates both fields, reading `clock` once to reject a start time in
    /// the future.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidWorkerBits`]
    /// - [`Error::StartTimeInFuture`]
    pub fn validate(&self, clock: &impl TimeSource) -> Result<IdLayout> {
        let layout = self.layout()?;
        validate_start_time(self.start_time, clock)?;
        Ok(layout)
    }
}

pub(crate) fn validate_start_time(start_time: u64, clock: &impl TimeSource) -> Result<()> {
    let now = clock.current_millis();
    if start_time > now {
        return Err(Error::StartTimeInFuture { start_time, now });
    }
    Ok(())
}

/// Per-field overrides applied when a registry hands out a field generator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct FieldOptions {
    /// Overrides [`Settings::start_time`] for this field only.
    pub start_time: Option<u64>,
    /// Name of the sibling field whose value supplies the suffix number of
    /// string and big integer IDs.
    pub suffix_from: Option<String>,
}

impl FieldOptions {
    pub fn with_start_time(mut self, start_time: u64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_suffix_from(mut self, field: impl Into<String>) -> Self {
        self.suffix_from = Some(field.into());
        self
    }
}

/// Which coordination client a registry builds, resolved once at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ClientKind {
    /// Single-process deployment; every ID uses [`Worker::ZERO`].
    ///
    /// [`Worker::ZERO`]: crate::Worker::ZERO
    #[default]
    Fixed,
    /// Worker looked up once from a table keyed by the host's private IPv4.
    Static,
    /// Worker leased from an external authority and renewed by heartbeat.
    Network,
}

impl core::str::FromStr for ClientKind {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" | "none" => Ok(Self::Fixed),
            "static" => Ok(Self::Static),
            "network" => Ok(Self::Network),
            other => Err(format!(
                "unknown client kind `{other}` (expected fixed, static or network)"
            )),
        }
    }
}
