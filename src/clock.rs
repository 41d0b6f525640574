//! # Clock
//! Wall clock time as the bell sees it.
//!
//! The time itself comes from an external time service. [`SyncedClock`] remembers the last synchronization and
//! extrapolates from a monotonic uptime in between, so the bell keeps ringing on time while the network is away.
use crate::config::EARLIEST_PLAUSIBLE_EPOCH;

/// Seconds in a day
pub const SECONDS_PER_DAY: u32 = 86_400;

/// Hour, minute and second of the day
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimeOfDay {
    /// Hour of the day (0-23)
    pub hour: u8,
    /// Minute of the hour (0-59)
    pub minute: u8,
    /// Second of the minute (0-59)
    pub second: u8,
}

impl TimeOfDay {
    /// Split epoch seconds into hour, minute and second of the day.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_epoch(epoch_secs: u64) -> Self {
        Self {
            hour: ((epoch_secs % 86_400) / 3600) as u8,
            minute: ((epoch_secs % 3600) / 60) as u8,
            second: (epoch_secs % 60) as u8,
        }
    }

    /// Seconds elapsed since midnight
    pub const fn seconds_of_day(self) -> u32 {
        self.hour as u32 * 3600 + self.minute as u32 * 60 + self.second as u32
    }
}

/// A point in local wall clock time, in seconds since the epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WallTime(u64);

impl WallTime {
    /// Wrap local epoch seconds
    pub const fn from_epoch(epoch_secs: u64) -> Self {
        Self(epoch_secs)
    }

    /// Local epoch seconds
    pub const fn epoch_secs(self) -> u64 {
        self.0
    }

    /// The time of day this point falls on
    pub const fn time_of_day(self) -> TimeOfDay {
        TimeOfDay::from_epoch(self.0)
    }

    /// Minutes since the epoch. Two points share a value exactly when they fall into the same minute.
    pub const fn epoch_minute(self) -> u64 {
        self.0 / 60
    }
}

/// Anything that can tell the current wall clock time.
pub trait ClockSource {
    /// The current local time, or `None` while the time is unknown.
    fn now(&self) -> Option<WallTime>;
}

/// Reasons a time sample is refused
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockError {
    /// The time service reported a time before [`EARLIEST_PLAUSIBLE_EPOCH`]
    Implausible(u64),
}

/// The reference point of the last successful synchronization
#[derive(Clone, Copy, Debug)]
struct SyncAnchor {
    /// UTC epoch seconds reported by the time service
    utc_epoch_secs: u64,
    /// Offset of local time to UTC in seconds, including daylight saving
    utc_offset_secs: i32,
    /// Monotonic uptime in seconds when the sample was taken
    uptime_secs: u64,
}

/// Wall clock extrapolated from the last synchronization with a time service.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncedClock {
    /// `None` until the first successful synchronization
    anchor: Option<SyncAnchor>,
}

impl SyncedClock {
    /// An unsynchronized clock
    pub const fn new() -> Self {
        Self { anchor: None }
    }

    /// Take a new sample from the time service, taken at the given monotonic uptime.
    ///
    /// Samples before [`EARLIEST_PLAUSIBLE_EPOCH`] are refused and leave the clock as it was.
    pub fn sync(&mut self, utc_epoch_secs: u64, utc_offset_secs: i32, uptime_secs: u64) -> Result<(), ClockError> {
        if utc_epoch_secs < EARLIEST_PLAUSIBLE_EPOCH {
            warn!("Refusing implausible time sample {}", utc_epoch_secs);
            return Err(ClockError::Implausible(utc_epoch_secs));
        }
        if let Some(previous) = self.now_at(uptime_secs) {
            debug!("Clock drift corrected from {}", previous.epoch_secs());
        }
        self.anchor = Some(SyncAnchor {
            utc_epoch_secs,
            utc_offset_secs,
            uptime_secs,
        });
        info!("Clock synced to {} (offset {}s)", utc_epoch_secs, utc_offset_secs);
        Ok(())
    }

    /// Whether the clock has been synchronized at least once
    pub const fn is_synced(&self) -> bool {
        self.anchor.is_some()
    }

    /// Local wall time at the given monotonic uptime, `None` before the first synchronization.
    pub fn now_at(&self, uptime_secs: u64) -> Option<WallTime> {
        let anchor = self.anchor?;
        let elapsed = uptime_secs.saturating_sub(anchor.uptime_secs);
        let utc = anchor.utc_epoch_secs.saturating_add(elapsed);
        let local = utc.saturating_add_signed(i64::from(anchor.utc_offset_secs));
        Some(WallTime::from_epoch(local))
    }
}
