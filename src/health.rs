//! # Task health
//! Bookkeeping for the watchdog. The long running tasks report in, the watchdog asks for a verdict once in a
//! while. A countdown starts running at every healthy verdict; once it runs out the board is reset.
//!
//! Tasks that never reported are still starting up and are not held against the system. After boot there is a
//! grace period in which no verdict leads to a reset.
//!
//! Only silence counts. A task that keeps coming back to report is alive, whatever its last iteration achieved,
//! so an unreachable upstream service never resets the board.
//!
//! Times are monotonic seconds since boot.

/// Grace period after the first check, in seconds
pub const STARTUP_GRACE_SECS: u64 = 120;

/// Time without a healthy verdict before a reset, in seconds
pub const COUNTDOWN_SECS: u64 = 900;

/// The monitored tasks
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskId {
    /// Bell scheduler, reports every tick
    Scheduler,
    /// Web server, reports after every connection and while idle
    WebServer,
    /// Time updater, reports after every sync attempt
    TimeUpdater,
}

impl TaskId {
    /// Every monitored task, in index order
    pub const ALL: [Self; 3] = [Self::Scheduler, Self::WebServer, Self::TimeUpdater];

    /// Longest time between two reports of a healthy task, in seconds
    pub const fn max_report_interval_secs(self) -> u64 {
        match self {
            Self::Scheduler => 60,
            Self::WebServer => 300,
            // retries every 30 s, refreshes hourly
            Self::TimeUpdater => 3 * 3600,
        }
    }

    /// Position in the health table
    const fn index(self) -> usize {
        self as usize
    }
}

/// What the monitor makes of the system
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    /// Nothing to worry about
    Healthy,
    /// Some tasks are overdue, the countdown runs
    Degraded {
        /// Number of overdue tasks
        unhealthy: usize,
        /// Seconds left before the reset
        secs_until_reset: u64,
    },
    /// The countdown ran out
    Reset,
}

/// Last report of one task
#[derive(Clone, Copy, Debug, Default)]
struct TaskHealth {
    /// When the task last reported
    last_report: Option<u64>,
    /// Whether the task ever reported
    has_reported: bool,
}

/// Health of all monitored tasks
#[derive(Clone, Debug)]
pub struct HealthMonitor {
    /// One entry per [`TaskId`]
    tasks: [TaskHealth; TaskId::ALL.len()],
    /// Time of the first check
    started_at: Option<u64>,
    /// When the board gets reset unless a healthy verdict comes first
    reset_deadline: Option<u64>,
}

impl HealthMonitor {
    /// A monitor that has seen nothing yet
    pub const fn new() -> Self {
        Self {
            tasks: [TaskHealth {
                last_report: None,
                has_reported: false,
            }; TaskId::ALL.len()],
            started_at: None,
            reset_deadline: None,
        }
    }

    /// A task finished an iteration
    pub const fn report_success(&mut self, task: TaskId, now_secs: u64) {
        let health = &mut self.tasks[task.index()];
        health.last_report = Some(now_secs);
        health.has_reported = true;
    }

    /// Whether a task that reported is overdue
    fn is_unhealthy(&self, task: TaskId, now_secs: u64) -> bool {
        let health = &self.tasks[task.index()];
        health.has_reported
            && !health
                .last_report
                .is_some_and(|last| now_secs.saturating_sub(last) < task.max_report_interval_secs())
    }

    /// Judge the system at `now_secs`
    pub fn check(&mut self, now_secs: u64) -> Verdict {
        let started_at = *self.started_at.get_or_insert(now_secs);
        if now_secs.saturating_sub(started_at) < STARTUP_GRACE_SECS {
            return Verdict::Healthy;
        }

        let mut unhealthy = 0;
        for task in TaskId::ALL {
            if self.is_unhealthy(task, now_secs) {
                warn!("Task {} is unhealthy", task);
                unhealthy += 1;
            }
        }

        if unhealthy == 0 {
            self.reset_deadline = Some(now_secs + COUNTDOWN_SECS);
            return Verdict::Healthy;
        }

        let deadline = *self.reset_deadline.get_or_insert_with(|| {
            warn!("{} task(s) unhealthy, starting countdown", unhealthy);
            now_secs + COUNTDOWN_SECS
        });
        if now_secs >= deadline {
            return Verdict::Reset;
        }
        Verdict::Degraded {
            unhealthy,
            secs_until_reset: deadline - now_secs,
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}
