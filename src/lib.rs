//! # School bell
//! The core of a network connected school bell: a relay rings a bell a configured number of times at configured
//! times of day. The schedule and the admin password survive power loss, and both can be changed over a small
//! web interface guarded by the password.
//!
//! This library holds everything that does not touch hardware. The Pico W firmware in `main.rs` wires it to the
//! flash, the relay pin, the network and the clock. The library also builds on the host, where the tests run.
#![cfg_attr(not(test), no_std)]

// must come first, the log macros are used by every module below
mod fmt;

pub mod actuator;
pub mod clock;
pub mod config;
pub mod credential;
pub mod device;
pub mod error;
pub mod gateway;
pub mod health;
pub mod request;
pub mod schedule;
pub mod status;
pub mod store;

pub use actuator::{Relay, RingOutcome, RingRequest};
pub use clock::{ClockSource, SyncedClock, TimeOfDay, WallTime};
pub use credential::Credential;
pub use device::{DeviceState, Snapshot};
pub use error::{MutationError, ValidationError};
pub use gateway::Mutation;
pub use request::Request;
pub use schedule::{BellEvent, RingBatch, ScheduleEngine, ScheduleTable};
pub use status::Outcome;
pub use store::{LoadIssue, PersistentStore, RamStore, ScheduleStore};
