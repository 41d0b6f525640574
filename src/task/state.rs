//! # State of the system
//! The device state and the wall clock, shared between the tasks.
use crate::task::persistence::FlashEeprom;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Instant;
use school_bell::{ClockSource, DeviceState, SyncedClock, WallTime};

/// The device state as the firmware holds it
pub type BellState = DeviceState<FlashEeprom<'static>>;

/// Type alias for the device state protected by a mutex.
///
/// The state is wrapped in an `Option` because it can only be loaded once the flash is up. Tasks running before
/// that see `None`.
type DeviceStateType = Mutex<CriticalSectionRawMutex, Option<BellState>>;

/// Global instance of the device state. Rendering, evaluating and changing the schedule all happen under this lock.
pub static DEVICE_STATE: DeviceStateType = Mutex::new(None);

/// The wall clock, fed by the time updater
pub static CLOCK: Mutex<CriticalSectionRawMutex, SyncedClock> = Mutex::new(SyncedClock::new());

/// Put the loaded device state in place
pub async fn init_device_state(state: BellState) {
    *DEVICE_STATE.lock().await = Some(state);
}

/// A snapshot of the wall clock read against the uptime of the board
#[derive(Clone, Copy)]
pub struct UptimeClock(pub SyncedClock);

impl UptimeClock {
    /// Take a snapshot of the shared clock
    pub async fn current() -> Self {
        Self(*CLOCK.lock().await)
    }
}

impl ClockSource for UptimeClock {
    fn now(&self) -> Option<WallTime> {
        self.0.now_at(Instant::now().as_secs())
    }
}
