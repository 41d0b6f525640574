//! # Actuator
//! Drives the relay that powers the bell. A ring is one energized pulse followed by a pause, a request rings a
//! given number of times in a row.
//!
//! Requests wait in a bounded FIFO queue and are rung one sequence at a time. A full queue drops the request and
//! logs it. A cancel aborts the running sequence, drops everything queued and leaves the relay released.
//!
//! Whatever happens, the relay ends up LOW.
use crate::config::{RING_OFF_MS, RING_ON_MS};
use crate::schedule::{BellEvent, RingBatch};
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;

/// One ring sequence to perform
pub type RingRequest = BellEvent;

/// How a ring sequence ended
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RingOutcome {
    /// All rings done
    Completed,
    /// Aborted by a cancel
    Cancelled,
    /// The relay pin refused a level change
    PinFault,
}

/// Queue ring requests for the relay, dropping what does not fit. Returns how many were dropped.
pub fn enqueue<M: RawMutex, const N: usize>(queue: &Channel<M, RingRequest, N>, batch: &RingBatch) -> usize {
    let mut dropped = 0;
    for request in batch {
        if queue.try_send(*request).is_err() {
            warn!(
                "Ring queue full, dropping bell of {:02}:{:02}",
                request.hour, request.minute
            );
            dropped += 1;
        }
    }
    dropped
}

/// Throw away every queued request. Returns how many were dropped.
pub fn drain<M: RawMutex, const N: usize>(queue: &Channel<M, RingRequest, N>) -> usize {
    let mut dropped = 0;
    while queue.try_receive().is_ok() {
        dropped += 1;
    }
    dropped
}

/// The bell relay
#[derive(Debug)]
pub struct Relay<P> {
    /// Output driving the relay coil, HIGH rings
    pin: P,
}

impl<P: OutputPin> Relay<P> {
    /// Take the pin and release the relay
    pub fn new(pin: P) -> Self {
        let mut relay = Self { pin };
        relay.release();
        relay
    }

    /// Drive the relay LOW. Returns false if the pin refused.
    pub fn release(&mut self) -> bool {
        if self.pin.set_low().is_err() {
            error!("Relay pin refused to go low");
            return false;
        }
        true
    }

    /// Ring `times` times, pulse and pause each, unless cancelled.
    pub async fn ring<D: DelayNs, M: RawMutex>(
        &mut self,
        times: u8,
        delay: &mut D,
        cancel: &Signal<M, ()>,
    ) -> RingOutcome {
        for ring in 1..=times {
            trace!("Ring {} of {}", ring, times);
            if self.pin.set_high().is_err() {
                error!("Relay pin refused to go high");
                self.release();
                return RingOutcome::PinFault;
            }
            if let Either::Second(()) = select(delay.delay_ms(RING_ON_MS), cancel.wait()).await {
                self.release();
                return RingOutcome::Cancelled;
            }
            if !self.release() {
                return RingOutcome::PinFault;
            }
            if let Either::Second(()) = select(delay.delay_ms(RING_OFF_MS), cancel.wait()).await {
                return RingOutcome::Cancelled;
            }
        }
        RingOutcome::Completed
    }

    /// Wait for the next queued request and ring it. A cancel, while idle or ringing, also empties the queue.
    pub async fn serve_next<D: DelayNs, M: RawMutex, const N: usize>(
        &mut self,
        delay: &mut D,
        queue: &Channel<M, RingRequest, N>,
        cancel: &Signal<M, ()>,
    ) -> RingOutcome {
        // a pending stop wins over a queued request, the coil must not see a pulse
        let request = match select(cancel.wait(), queue.receive()).await {
            Either::First(()) => {
                let dropped = drain(queue);
                info!("Ringing cancelled while idle, dropped {} queued", dropped);
                self.release();
                return RingOutcome::Cancelled;
            }
            Either::Second(request) => request,
        };

        info!(
            "Ringing bell of {:02}:{:02}, {} rings",
            request.hour, request.minute, request.rings
        );
        let outcome = self.ring(request.rings, delay, cancel).await;
        if outcome == RingOutcome::Cancelled {
            let dropped = drain(queue);
            info!("Ringing cancelled, dropped {} queued", dropped);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RING_QUEUE_DEPTH;
    use core::convert::Infallible;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embedded_hal::digital::{Error, ErrorKind, ErrorType};
    use std::vec::Vec;

    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    enum Level {
        High,
        Low,
    }

    /// Records every level change
    #[derive(Default)]
    struct RecordingPin {
        levels: Vec<Level>,
    }

    impl ErrorType for RecordingPin {
        type Error = Infallible;
    }

    impl OutputPin for RecordingPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.levels.push(Level::Low);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.levels.push(Level::High);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Broken;

    impl Error for Broken {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// Goes low fine but refuses to go high
    #[derive(Default)]
    struct StuckLowPin {
        lows: usize,
    }

    impl ErrorType for StuckLowPin {
        type Error = Broken;
    }

    impl OutputPin for StuckLowPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.lows += 1;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            Err(Broken)
        }
    }

    /// Returns at once, remembers what was asked for
    #[derive(Default)]
    struct InstantDelay {
        waited_ms: Vec<u32>,
    }

    impl DelayNs for InstantDelay {
        async fn delay_ns(&mut self, _ns: u32) {}

        async fn delay_ms(&mut self, ms: u32) {
            self.waited_ms.push(ms);
        }
    }

    /// Never returns
    struct EndlessDelay;

    impl DelayNs for EndlessDelay {
        async fn delay_ns(&mut self, _ns: u32) {
            core::future::pending::<()>().await;
        }

        async fn delay_ms(&mut self, _ms: u32) {
            core::future::pending::<()>().await;
        }
    }

    /// Someone presses stop as soon as the first pulse starts
    struct StopPressedDelay<'a>(&'a Cancel);

    impl DelayNs for StopPressedDelay<'_> {
        async fn delay_ns(&mut self, _ns: u32) {
            self.0.signal(());
            core::future::pending::<()>().await;
        }

        async fn delay_ms(&mut self, _ms: u32) {
            self.0.signal(());
            core::future::pending::<()>().await;
        }
    }

    type Queue = Channel<CriticalSectionRawMutex, RingRequest, RING_QUEUE_DEPTH>;
    type Cancel = Signal<CriticalSectionRawMutex, ()>;

    #[test]
    fn new_relay_starts_released() {
        let relay = Relay::new(RecordingPin::default());
        assert_eq!(relay.pin.levels, [Level::Low]);
    }

    #[test]
    fn rings_pulse_and_pause_per_ring() {
        let mut relay = Relay::new(RecordingPin::default());
        let mut delay = InstantDelay::default();
        let cancel = Cancel::new();
        assert_eq!(block_on(relay.ring(3, &mut delay, &cancel)), RingOutcome::Completed);
        assert_eq!(
            relay.pin.levels,
            [Level::Low, Level::High, Level::Low, Level::High, Level::Low, Level::High, Level::Low]
        );
        assert_eq!(delay.waited_ms, [RING_ON_MS, RING_OFF_MS, RING_ON_MS, RING_OFF_MS, RING_ON_MS, RING_OFF_MS]);
    }

    #[test]
    fn cancel_releases_relay_mid_pulse() {
        let mut relay = Relay::new(RecordingPin::default());
        let cancel = Cancel::new();
        cancel.signal(());
        assert_eq!(block_on(relay.ring(5, &mut EndlessDelay, &cancel)), RingOutcome::Cancelled);
        assert_eq!(relay.pin.levels.last(), Some(&Level::Low));
        assert_eq!(relay.pin.levels.iter().filter(|l| **l == Level::High).count(), 1);
    }

    #[test]
    fn pin_fault_ends_released() {
        let mut relay = Relay::new(StuckLowPin::default());
        let cancel = Cancel::new();
        assert_eq!(
            block_on(relay.ring(2, &mut InstantDelay::default(), &cancel)),
            RingOutcome::PinFault
        );
        assert_eq!(relay.pin.lows, 2);
    }

    #[test]
    fn queue_is_served_in_order() {
        let mut relay = Relay::new(RecordingPin::default());
        let mut delay = InstantDelay::default();
        let queue = Queue::new();
        let cancel = Cancel::new();
        let mut batch = RingBatch::new();
        batch.push(BellEvent::new(8, 0, 1)).unwrap();
        batch.push(BellEvent::new(8, 0, 2)).unwrap();
        assert_eq!(enqueue(&queue, &batch), 0);

        assert_eq!(block_on(relay.serve_next(&mut delay, &queue, &cancel)), RingOutcome::Completed);
        assert_eq!(delay.waited_ms.len(), 2);
        assert_eq!(block_on(relay.serve_next(&mut delay, &queue, &cancel)), RingOutcome::Completed);
        assert_eq!(delay.waited_ms.len(), 6);
        assert!(queue.try_receive().is_err());
    }

    #[test]
    fn full_queue_drops_requests() {
        let queue: Channel<CriticalSectionRawMutex, RingRequest, 2> = Channel::new();
        let mut batch = RingBatch::new();
        for minute in 0..5 {
            batch.push(BellEvent::new(8, minute, 1)).unwrap();
        }
        assert_eq!(enqueue(&queue, &batch), 3);
        assert_eq!(queue.try_receive().ok(), Some(BellEvent::new(8, 0, 1)));
        assert_eq!(queue.try_receive().ok(), Some(BellEvent::new(8, 1, 1)));
    }

    #[test]
    fn cancel_while_ringing_drops_queue() {
        let mut relay = Relay::new(RecordingPin::default());
        let queue = Queue::new();
        let cancel = Cancel::new();
        let mut batch = RingBatch::new();
        batch.push(BellEvent::new(8, 0, 3)).unwrap();
        batch.push(BellEvent::new(8, 5, 3)).unwrap();
        enqueue(&queue, &batch);

        assert_eq!(
            block_on(relay.serve_next(&mut StopPressedDelay(&cancel), &queue, &cancel)),
            RingOutcome::Cancelled
        );
        assert_eq!(relay.pin.levels, [Level::Low, Level::High, Level::Low]);
        assert!(queue.try_receive().is_err());
    }

    #[test]
    fn pending_cancel_never_energizes_the_relay() {
        let mut relay = Relay::new(RecordingPin::default());
        let queue = Queue::new();
        let cancel = Cancel::new();
        let mut batch = RingBatch::new();
        batch.push(BellEvent::new(8, 0, 3)).unwrap();
        batch.push(BellEvent::new(8, 5, 3)).unwrap();
        enqueue(&queue, &batch);
        cancel.signal(());

        assert_eq!(
            block_on(relay.serve_next(&mut EndlessDelay, &queue, &cancel)),
            RingOutcome::Cancelled
        );
        assert!(relay.pin.levels.iter().all(|l| *l == Level::Low));
        assert!(queue.try_receive().is_err());
    }

    #[test]
    fn cancel_while_idle_keeps_relay_low() {
        let mut relay = Relay::new(RecordingPin::default());
        let queue = Queue::new();
        let cancel = Cancel::new();
        cancel.signal(());
        assert_eq!(
            block_on(relay.serve_next(&mut InstantDelay::default(), &queue, &cancel)),
            RingOutcome::Cancelled
        );
        assert!(relay.pin.levels.iter().all(|l| *l == Level::Low));
    }
}
