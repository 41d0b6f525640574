//! # Status page
//! The plain text page the web interface answers every request with.
use crate::clock::TimeOfDay;
use crate::config::MAX_EVENTS;
use crate::device::Snapshot;
use crate::error::MutationError;
use core::fmt::{self, Write};

/// What became of the request the page answers
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// Nothing was asked for
    Viewed,
    /// A bell event was added
    Added,
    /// The admin password was changed
    PasswordChanged,
    /// The bell was silenced
    Silenced,
    /// The change was turned down
    Refused(MutationError),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Viewed => f.write_str("ok"),
            Self::Added => f.write_str("bell added"),
            Self::PasswordChanged => f.write_str("password changed"),
            Self::Silenced => f.write_str("bell silenced"),
            Self::Refused(e) => write!(f, "{e}"),
        }
    }
}

/// Write the status page for `snapshot` at time of day `now` (`None` while the clock is not synced).
pub fn render(out: &mut impl Write, snapshot: &Snapshot, now: Option<TimeOfDay>, outcome: Outcome) -> fmt::Result {
    writeln!(out, "School bell")?;
    writeln!(out, "Status: {outcome}")?;
    match now {
        Some(now) => {
            writeln!(out, "Time: {:02}:{:02}:{:02}", now.hour, now.minute, now.second)?;
            match snapshot.table.next_after(now) {
                Some(next) => writeln!(out, "Next bell: {:02}:{:02}, {} rings", next.hour, next.minute, next.rings)?,
                None => writeln!(out, "Next bell: none")?,
            }
        }
        None => writeln!(out, "Time: not synced")?,
    }
    if snapshot.factory_password {
        writeln!(out, "Warning: factory password in use")?;
    }
    writeln!(out, "Schedule ({} of {}):", snapshot.table.len(), MAX_EVENTS)?;
    for (i, event) in snapshot.table.iter().enumerate() {
        writeln!(out, "{:2}. {:02}:{:02} {} rings", i + 1, event.hour, event.minute, event.rings)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{BellEvent, ScheduleTable};

    fn snapshot(events: &[BellEvent], factory_password: bool) -> Snapshot {
        let mut table = ScheduleTable::new();
        for event in events {
            table.push(*event).unwrap();
        }
        Snapshot {
            table,
            factory_password,
        }
    }

    fn page(snapshot: &Snapshot, now: Option<TimeOfDay>, outcome: Outcome) -> heapless::String<1024> {
        let mut out = heapless::String::new();
        render(&mut out, snapshot, now, outcome).unwrap();
        out
    }

    #[test]
    fn shows_time_next_bell_and_listing() {
        let snapshot = snapshot(&[BellEvent::new(8, 0, 3), BellEvent::new(12, 30, 1)], false);
        let now = TimeOfDay {
            hour: 9,
            minute: 5,
            second: 7,
        };
        let page = page(&snapshot, Some(now), Outcome::Added);
        assert_eq!(
            page.as_str(),
            "School bell\n\
             Status: bell added\n\
             Time: 09:05:07\n\
             Next bell: 12:30, 1 rings\n\
             Schedule (2 of 20):\n \
             1. 08:00 3 rings\n \
             2. 12:30 1 rings\n"
        );
    }

    #[test]
    fn unsynced_clock_and_factory_password() {
        let snapshot = snapshot(&[], true);
        let page = page(&snapshot, None, Outcome::Refused(MutationError::Auth));
        assert_eq!(
            page.as_str(),
            "School bell\n\
             Status: rejected: wrong password\n\
             Time: not synced\n\
             Warning: factory password in use\n\
             Schedule (0 of 20):\n"
        );
    }

    #[test]
    fn empty_schedule_has_no_next_bell() {
        let snapshot = snapshot(&[], false);
        let now = TimeOfDay {
            hour: 0,
            minute: 0,
            second: 0,
        };
        let page = page(&snapshot, Some(now), Outcome::Viewed);
        assert!(page.contains("Next bell: none\n"));
    }
}
