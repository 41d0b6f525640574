//! Watchdog task to reset the system if it stops being fed
//!
//! The long running tasks report their health here. A countdown rather than a constantly fed hardware watchdog
//! decides when to reset, the hardware watchdog is only started to carry the reset out.
use defmt::{info, warn};
use embassy_rp::{Peri, peripherals::WATCHDOG, watchdog::Watchdog};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};
use embassy_time::{Duration, Instant, Timer};
pub use school_bell::health::TaskId;
use school_bell::health::{COUNTDOWN_SECS, HealthMonitor, STARTUP_GRACE_SECS, Verdict};

/// How often we check task health and update our countdown
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);
/// Hardware watchdog timeout (short, used only for actual reset)
const HARDWARE_WATCHDOG_TIMEOUT: Duration = Duration::from_millis(8000);

/// Global system health tracker
static SYSTEM_HEALTH: Mutex<CriticalSectionRawMutex, HealthMonitor> = Mutex::new(HealthMonitor::new());

/// Report a finished task iteration
pub async fn report_task_success(task_id: TaskId) {
    SYSTEM_HEALTH
        .lock()
        .await
        .report_success(task_id, Instant::now().as_secs());
}

/// Watchdog task that monitors system health and triggers resets when needed
#[embassy_executor::task]
pub async fn watchdog_task(watchdog: Peri<'static, WATCHDOG>) {
    info!("Watchdog started - monitoring Scheduler, WebServer, TimeUpdater");
    info!(
        "Countdown: {}s, health checks every {}s, startup grace: {}s",
        COUNTDOWN_SECS,
        HEALTH_CHECK_INTERVAL.as_secs(),
        STARTUP_GRACE_SECS
    );

    loop {
        let verdict = SYSTEM_HEALTH.lock().await.check(Instant::now().as_secs());

        match verdict {
            Verdict::Healthy => {}
            Verdict::Degraded {
                unhealthy,
                secs_until_reset,
            } => warn!(
                "{} task(s) still unhealthy, {} seconds until reset",
                unhealthy, secs_until_reset
            ),
            Verdict::Reset => {
                warn!("Countdown expired - system will reset due to unhealthy tasks");

                // Initialize hardware watchdog and don't feed it - this will cause reset
                let mut wd = Watchdog::new(watchdog);
                wd.pause_on_debug(false); // Don't pause during debug - we want the reset
                wd.start(HARDWARE_WATCHDOG_TIMEOUT);

                // Wait for hardware watchdog to reset the system
                loop {
                    Timer::after_secs(1).await;
                }
            }
        }

        Timer::after(HEALTH_CHECK_INTERVAL).await;
    }
}
