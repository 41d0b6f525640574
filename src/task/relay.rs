//! # Relay task
//! Rings the bell. Ring requests arrive through a bounded queue and are rung one after another.
//!
//! The relay coil is switched through a transistor on GPIO 15, HIGH rings.
use defmt::{info, warn};
use embassy_rp::gpio::Output;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::Delay;
use school_bell::actuator::{self, RingOutcome, RingRequest};
use school_bell::config::RING_QUEUE_DEPTH;
use school_bell::{Relay, RingBatch};

/// Queue of ring requests waiting for the relay
static RING_QUEUE: Channel<CriticalSectionRawMutex, RingRequest, RING_QUEUE_DEPTH> = Channel::new();

/// Signal to stop ringing
static CANCEL_SIGNAL: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Queues the bells that are due. What does not fit is dropped.
pub fn queue_rings(batch: &RingBatch) {
    let dropped = actuator::enqueue(&RING_QUEUE, batch);
    if dropped > 0 {
        warn!("Dropped {} ring requests", dropped);
    }
}

/// Signals the relay task to stop ringing and forget everything queued
pub fn signal_cancel_ringing() {
    CANCEL_SIGNAL.signal(());
}

#[embassy_executor::task]
pub async fn relay_handler(control_pin: Output<'static>) {
    info!("Relay task started");

    let mut relay = Relay::new(control_pin);
    let mut delay = Delay;

    loop {
        match relay.serve_next(&mut delay, &RING_QUEUE, &CANCEL_SIGNAL).await {
            RingOutcome::Completed => info!("Ring sequence completed"),
            RingOutcome::Cancelled => info!("Ringing stopped"),
            RingOutcome::PinFault => warn!("Ring sequence aborted, relay pin fault"),
        }
    }
}
