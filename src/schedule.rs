//! # Schedule
//! The bell events, the table holding them and the engine deciding when to ring.
//!
//! The engine is fed one tick at a time, normally once per second. It does not rely on seeing every second: each
//! tick covers the seconds since the previous one, so a tick that arrives late still rings the events it stepped
//! over, as long as the gap stays within the catch-up window. Every entry remembers the minute it last fired in,
//! which keeps a clock that is pulled backwards by a resync from ringing the same bell twice.
use crate::clock::{SECONDS_PER_DAY, TimeOfDay, WallTime};
use crate::config::{CATCH_UP_WINDOW_SECS, MAX_EVENTS};
use heapless::Vec;

/// A time of day at which the bell rings a number of times
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BellEvent {
    /// Hour of the day (0-23)
    pub hour: u8,
    /// Minute of the hour (0-59)
    pub minute: u8,
    /// How often the bell rings, at least once
    pub rings: u8,
}

impl BellEvent {
    /// Create a new bell event. Nothing is checked here, see [`Self::is_valid`].
    pub const fn new(hour: u8, minute: u8, rings: u8) -> Self {
        Self { hour, minute, rings }
    }

    /// Whether all fields are within their ranges
    pub const fn is_valid(&self) -> bool {
        self.hour < 24 && self.minute < 60 && self.rings > 0
    }

    /// Second of the day at which the bell starts ringing
    pub const fn start_second(&self) -> u32 {
        self.hour as u32 * 3600 + self.minute as u32 * 60
    }
}

/// Bell events due in one tick, in table order
pub type RingBatch = Vec<BellEvent, MAX_EVENTS>;

/// The ordered, capacity bounded list of bell events. Entries are only ever appended.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ScheduleTable {
    /// The valid entries, in insertion order
    events: Vec<BellEvent, MAX_EVENTS>,
}

impl ScheduleTable {
    /// An empty table
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether another entry would exceed [`MAX_EVENTS`]
    pub fn is_full(&self) -> bool {
        self.events.is_full()
    }

    /// The entries in table order
    pub fn as_slice(&self) -> &[BellEvent] {
        &self.events
    }

    /// Iterate over the entries in table order
    pub fn iter(&self) -> impl Iterator<Item = &BellEvent> {
        self.events.iter()
    }

    /// Append an entry, handing it back if the table is full
    pub fn push(&mut self, event: BellEvent) -> Result<(), BellEvent> {
        self.events.push(event)
    }

    /// The entry that rings next at or after the given time of day, wrapping past midnight.
    /// Among entries sharing a time, the first in table order wins.
    pub fn next_after(&self, now: TimeOfDay) -> Option<BellEvent> {
        let now = now.seconds_of_day();
        self.events
            .iter()
            .min_by_key(|event| (event.start_second() + SECONDS_PER_DAY - now) % SECONDS_PER_DAY)
            .copied()
    }
}

/// Decides which bell events are due, tick by tick.
#[derive(Clone, Debug)]
pub struct ScheduleEngine {
    /// The schedule
    table: ScheduleTable,
    /// Per entry, the epoch minute it last fired in
    fired: [Option<u64>; MAX_EVENTS],
    /// The time seen by the previous tick
    last_tick: Option<WallTime>,
    /// Largest gap between ticks that still rings stepped-over entries
    catch_up_window: u32,
}

impl ScheduleEngine {
    /// Create an engine around a loaded table
    pub const fn new(table: ScheduleTable) -> Self {
        Self {
            table,
            fired: [None; MAX_EVENTS],
            last_tick: None,
            catch_up_window: CATCH_UP_WINDOW_SECS,
        }
    }

    /// Use a different catch-up window
    #[must_use]
    pub const fn with_catch_up_window(mut self, secs: u32) -> Self {
        self.catch_up_window = secs;
        self
    }

    /// The current schedule
    pub const fn table(&self) -> &ScheduleTable {
        &self.table
    }

    /// Append an entry, handing it back if the table is full.
    /// The new entry starts unfired.
    pub fn append(&mut self, event: BellEvent) -> Result<(), BellEvent> {
        let index = self.table.len();
        self.table.push(event)?;
        self.fired[index] = None;
        Ok(())
    }

    /// Evaluate one tick and return the entries due now, in table order.
    ///
    /// The tick covers the seconds after the previous tick up to and including `now`. On the very first tick, and
    /// after a gap larger than the catch-up window, only entries starting exactly at `now` are due. A tick that
    /// does not move time forward rings nothing.
    pub fn evaluate(&mut self, now: WallTime) -> RingBatch {
        let span = match self.last_tick {
            None => 1,
            Some(previous) if now <= previous => 0,
            Some(previous) => {
                let gap = now.epoch_secs() - previous.epoch_secs();
                match u32::try_from(gap) {
                    Ok(gap) if gap <= self.catch_up_window => gap,
                    _ => {
                        warn!("Tick gap of {}s exceeds the catch-up window", gap);
                        1
                    }
                }
            }
        };
        self.last_tick = Some(now);

        let mut due = RingBatch::new();
        if span == 0 {
            return due;
        }

        let now_second = now.time_of_day().seconds_of_day();
        for (index, event) in self.table.events.iter().enumerate() {
            // how long ago this entry started, walking backwards through the day
            let since_start = (now_second + SECONDS_PER_DAY - event.start_second()) % SECONDS_PER_DAY;
            if since_start >= span {
                continue;
            }
            let minute = WallTime::from_epoch(now.epoch_secs() - u64::from(since_start)).epoch_minute();
            if self.fired[index] == Some(minute) {
                debug!("Entry {} already fired this minute", index);
                continue;
            }
            self.fired[index] = Some(minute);
            info!(
                "Bell due: {:02}:{:02}, {} rings",
                event.hour, event.minute, event.rings
            );
            // the batch has room for every table entry
            let _ = due.push(*event);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2024-09-02T00:00:00 local
    const MIDNIGHT: u64 = 1_725_235_200;

    fn at(hour: u64, minute: u64, second: u64) -> WallTime {
        WallTime::from_epoch(MIDNIGHT + hour * 3600 + minute * 60 + second)
    }

    fn engine_with(events: &[BellEvent]) -> ScheduleEngine {
        let mut table = ScheduleTable::new();
        for event in events {
            table.push(*event).unwrap();
        }
        ScheduleEngine::new(table)
    }

    #[test]
    fn rings_once_when_passing_through_the_minute() {
        let mut engine = engine_with(&[BellEvent::new(8, 0, 3)]);
        let mut rung = 0;
        for second in 0..180 {
            rung += engine.evaluate(at(7, 59, 0).plus(second)).len();
        }
        assert_eq!(rung, 1);
    }

    #[test]
    fn repeated_evaluation_in_the_same_second_rings_once() {
        let mut engine = engine_with(&[BellEvent::new(8, 0, 3)]);
        assert_eq!(engine.evaluate(at(8, 0, 0)).as_slice(), &[BellEvent::new(8, 0, 3)]);
        for _ in 0..10 {
            assert!(engine.evaluate(at(8, 0, 0)).is_empty());
        }
        for second in 1..60 {
            assert!(engine.evaluate(at(8, 0, second)).is_empty());
        }
    }

    #[test]
    fn first_tick_only_matches_second_zero() {
        let mut engine = engine_with(&[BellEvent::new(8, 0, 3)]);
        assert!(engine.evaluate(at(8, 0, 5)).is_empty());

        let mut engine = engine_with(&[BellEvent::new(8, 0, 3)]);
        assert_eq!(engine.evaluate(at(8, 0, 0)).len(), 1);
    }

    #[test]
    fn stalled_loop_still_rings_within_window() {
        let mut engine = engine_with(&[BellEvent::new(8, 0, 2)]);
        assert!(engine.evaluate(at(7, 59, 57)).is_empty());
        // the loop was blocked across second zero
        assert_eq!(engine.evaluate(at(8, 0, 4)).len(), 1);
        assert!(engine.evaluate(at(8, 0, 5)).is_empty());
    }

    #[test]
    fn gap_beyond_window_is_a_fresh_start() {
        let mut engine = engine_with(&[BellEvent::new(8, 0, 2)]);
        assert!(engine.evaluate(at(7, 50, 0)).is_empty());
        assert!(engine.evaluate(at(8, 0, 30)).is_empty());
    }

    #[test]
    fn identical_times_ring_in_table_order() {
        let first = BellEvent::new(12, 30, 1);
        let second = BellEvent::new(12, 30, 4);
        let mut engine = engine_with(&[first, BellEvent::new(9, 0, 1), second]);
        engine.evaluate(at(12, 29, 59));
        assert_eq!(engine.evaluate(at(12, 30, 0)).as_slice(), &[first, second]);
    }

    #[test]
    fn backward_resync_does_not_ring_twice() {
        let mut engine = engine_with(&[BellEvent::new(8, 0, 1)]);
        engine.evaluate(at(7, 59, 59));
        assert_eq!(engine.evaluate(at(8, 0, 0)).len(), 1);
        engine.evaluate(at(8, 0, 1));
        // resync pulls the clock back before the bell time
        assert!(engine.evaluate(at(7, 59, 58)).is_empty());
        assert!(engine.evaluate(at(7, 59, 59)).is_empty());
        assert!(engine.evaluate(at(8, 0, 0)).is_empty());
    }

    #[test]
    fn rings_again_the_next_day() {
        let mut engine = engine_with(&[BellEvent::new(8, 0, 1)]);
        engine.evaluate(at(7, 59, 59));
        assert_eq!(engine.evaluate(at(8, 0, 0)).len(), 1);
        let next_day = at(8, 0, 0).plus(86_400);
        engine.evaluate(next_day.minus(1));
        assert_eq!(engine.evaluate(next_day).len(), 1);
    }

    #[test]
    fn crossing_midnight_rings_the_midnight_bell() {
        let mut engine = engine_with(&[BellEvent::new(0, 0, 1)]);
        engine.evaluate(at(23, 59, 58));
        assert_eq!(engine.evaluate(at(0, 0, 1).plus(86_400)).len(), 1);
    }

    #[test]
    fn appended_entry_starts_unfired() {
        let mut engine = engine_with(&[]);
        engine.evaluate(at(9, 59, 59));
        engine.append(BellEvent::new(10, 0, 2)).unwrap();
        assert_eq!(engine.evaluate(at(10, 0, 0)).len(), 1);
    }

    #[test]
    fn append_refuses_beyond_capacity() {
        let mut engine = engine_with(&[]);
        for i in 0..MAX_EVENTS {
            engine.append(BellEvent::new(8, u8::try_from(i).unwrap(), 1)).unwrap();
        }
        let extra = BellEvent::new(9, 0, 1);
        assert_eq!(engine.append(extra), Err(extra));
        assert_eq!(engine.table().len(), MAX_EVENTS);
    }

    #[test]
    fn next_after_wraps_past_midnight() {
        let mut table = ScheduleTable::new();
        table.push(BellEvent::new(8, 0, 1)).unwrap();
        table.push(BellEvent::new(13, 15, 2)).unwrap();
        let noon = at(12, 0, 0).time_of_day();
        assert_eq!(table.next_after(noon), Some(BellEvent::new(13, 15, 2)));
        let evening = at(20, 0, 0).time_of_day();
        assert_eq!(table.next_after(evening), Some(BellEvent::new(8, 0, 1)));
        assert_eq!(ScheduleTable::new().next_after(noon), None);
    }

    trait Shift {
        fn plus(self, secs: u64) -> Self;
        fn minus(self, secs: u64) -> Self;
    }

    impl Shift for WallTime {
        fn plus(self, secs: u64) -> Self {
            Self::from_epoch(self.epoch_secs() + secs)
        }

        fn minus(self, secs: u64) -> Self {
            Self::from_epoch(self.epoch_secs() - secs)
        }
    }
}
