//! # Device constants
//! Capacities, the persisted image layout and the timings of the bell.
//!
//! The layout constants are a durability contract with devices already in the field. Changing them without a
//! migration corrupts existing schedules.

/// Maximum number of bell events in the schedule.
pub const MAX_EVENTS: usize = 20;

/// Maximum length of the admin password in bytes, excluding the terminating NUL.
pub const PASSWORD_MAX_LEN: usize = 16;

/// The password in effect until someone changes it.
pub const FACTORY_PASSWORD: &str = "admin123";

/// Width of the event count field at the start of the image (u32, little endian).
pub const COUNT_WIDTH: usize = 4;

/// Width of one persisted bell event: hour, minute, rings.
pub const EVENT_RECORD_WIDTH: usize = 3;

/// Offset of the first event record.
pub const EVENTS_ADDR: usize = COUNT_WIDTH;

/// First byte past the event table at full capacity.
pub const EVENTS_END: usize = EVENTS_ADDR + MAX_EVENTS * EVENT_RECORD_WIDTH;

/// Offset of the NUL-terminated password.
pub const PASSWORD_ADDR: usize = 500;

/// Capacity of the password region, including the terminating NUL.
pub const PASSWORD_REGION_LEN: usize = PASSWORD_MAX_LEN + 1;

/// Total size of the persisted image.
pub const IMAGE_SIZE: usize = PASSWORD_ADDR + PASSWORD_REGION_LEN;

// The event table at full capacity must end before the password region starts.
const _: () = assert!(EVENTS_END <= PASSWORD_ADDR, "event table overlaps the password region");

/// How long the relay stays energized per ring, in milliseconds.
pub const RING_ON_MS: u32 = 1000;

/// Pause after each ring, in milliseconds.
pub const RING_OFF_MS: u32 = 1000;

/// Largest forward gap between two ticks, in seconds, across which missed bell times are still rung.
pub const CATCH_UP_WINDOW_SECS: u32 = 120;

/// Epoch seconds of 2024-01-01T00:00:00Z. A synced clock reporting anything earlier is broken.
pub const EARLIEST_PLAUSIBLE_EPOCH: u64 = 1_704_067_200;

/// Depth of the queue in front of the relay.
pub const RING_QUEUE_DEPTH: usize = MAX_EVENTS;

/// Longest text field accepted from a request, in bytes after decoding.
pub const FIELD_MAX_LEN: usize = 64;
