//! Tasks that make up the firmware as well as the resources they use.
pub mod bell_scheduler;
pub mod network;
pub mod persistence;
pub mod relay;
#[macro_use]
pub mod resources;
pub mod state;
pub mod time_updater;
pub mod watchdog;
pub mod web_server;
