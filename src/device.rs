//! # Device state
//! Everything the bell knows, in one place: the schedule engine, the admin password and the store both are
//! persisted in. The firmware keeps exactly one of these behind one mutex, so rendering, ringing and changing the
//! schedule never see each other half done.
use crate::clock::{ClockSource, WallTime};
use crate::config::EARLIEST_PLAUSIBLE_EPOCH;
use crate::credential::Credential;
use crate::schedule::{RingBatch, ScheduleEngine, ScheduleTable};
use crate::store::{PersistentStore, ScheduleStore};

/// The complete state of the bell
#[derive(Debug)]
pub struct DeviceState<S> {
    /// Schedule and ring bookkeeping
    pub(crate) engine: ScheduleEngine,
    /// The admin password in effect
    pub(crate) credential: Credential,
    /// Where schedule and password are persisted
    pub(crate) store: ScheduleStore<S>,
}

/// A read-only copy of what the status page shows
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Snapshot {
    /// The schedule, in table order
    pub table: ScheduleTable,
    /// Whether the factory password is still in use
    pub factory_password: bool,
}

impl<S: PersistentStore> DeviceState<S> {
    /// Restore the state from the store. Damaged contents fall back to an empty schedule and the factory password.
    pub fn load(store: S) -> Self {
        let mut store = ScheduleStore::new(store);
        let (table, credential) = store.load();
        Self {
            engine: ScheduleEngine::new(table),
            credential,
            store,
        }
    }

    /// Evaluate one tick of the scheduler.
    ///
    /// Without a time, or with a time that cannot be right, nothing rings.
    pub fn tick(&mut self, now: Option<WallTime>) -> RingBatch {
        let Some(now) = now else {
            debug!("Clock not synced, skipping schedule evaluation");
            return RingBatch::new();
        };
        if now.epoch_secs() < EARLIEST_PLAUSIBLE_EPOCH {
            warn!("Implausible clock reading {}, skipping schedule evaluation", now.epoch_secs());
            return RingBatch::new();
        }
        self.engine.evaluate(now)
    }

    /// Evaluate one tick with the time read from a clock
    pub fn tick_with(&mut self, clock: &impl ClockSource) -> RingBatch {
        self.tick(clock.now())
    }

    /// Copy out what the status page needs
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            table: self.engine.table().clone(),
            factory_password: self.credential.is_factory_default(),
        }
    }

    /// The current schedule
    pub const fn table(&self) -> &ScheduleTable {
        self.engine.table()
    }

    /// The underlying byte store
    pub const fn store(&self) -> &S {
        self.store.inner()
    }

    /// The underlying byte store, mutably
    pub const fn store_mut(&mut self) -> &mut S {
        self.store.inner_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IMAGE_SIZE;
    use crate::schedule::BellEvent;
    use crate::store::RamStore;
    use embassy_futures::block_on;

    /// 2024-09-02T08:00:00
    const EIGHT_AM: u64 = 1_725_264_000;

    struct FixedClock(Option<u64>);

    impl ClockSource for FixedClock {
        fn now(&self) -> Option<WallTime> {
            self.0.map(WallTime::from_epoch)
        }
    }

    fn state_with_bell_at_eight() -> DeviceState<RamStore> {
        let mut store = ScheduleStore::new(RamStore::<IMAGE_SIZE>::new());
        let mut table = ScheduleTable::new();
        table.push(BellEvent::new(8, 0, 3)).unwrap();
        block_on(store.save_schedule(&table)).unwrap();
        let raw = store.inner().clone();
        DeviceState::load(raw)
    }

    #[test]
    fn unsynced_clock_never_rings() {
        let mut state = state_with_bell_at_eight();
        assert!(state.tick_with(&FixedClock(None)).is_empty());
    }

    #[test]
    fn implausible_clock_never_rings() {
        let mut state = state_with_bell_at_eight();
        // 08:00:00 on 1970-01-02
        assert!(state.tick(Some(WallTime::from_epoch(86_400 + 8 * 3600))).is_empty());
    }

    #[test]
    fn synced_clock_rings_loaded_schedule() {
        let mut state = state_with_bell_at_eight();
        let batch = state.tick_with(&FixedClock(Some(EIGHT_AM)));
        assert_eq!(batch.as_slice(), &[BellEvent::new(8, 0, 3)]);
    }

    #[test]
    fn snapshot_reflects_state() {
        let state = state_with_bell_at_eight();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.table.as_slice(), &[BellEvent::new(8, 0, 3)]);
        assert!(snapshot.factory_password);
    }
}
