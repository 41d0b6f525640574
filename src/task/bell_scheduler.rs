//! # Bell scheduler task
//! Checks the schedule once a second and hands due bells to the relay task.
use crate::task::relay::queue_rings;
use crate::task::state::{DEVICE_STATE, UptimeClock};
use crate::task::watchdog::{TaskId, report_task_success};
use defmt::{info, warn};
use embassy_time::{Duration, Ticker};

/// How often the schedule is evaluated
const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[embassy_executor::task]
pub async fn bell_scheduler() {
    info!("Bell scheduler task started");
    let mut ticker = Ticker::every(TICK_INTERVAL);

    loop {
        ticker.next().await;
        let clock = UptimeClock::current().await;

        // the lock is released before anything is queued, ringing never waits on it
        let batch = {
            let mut guard = DEVICE_STATE.lock().await;
            let Some(state) = guard.as_mut() else {
                warn!("Device state not loaded yet");
                continue;
            };
            state.tick_with(&clock)
        };

        if !batch.is_empty() {
            info!("{} bell(s) due", batch.len());
            queue_rings(&batch);
        }
        report_task_success(TaskId::Scheduler).await;
    }
}
