//! # School bell firmware
//! Raspberry Pi Pico W firmware of the school bell: rings a bell through a relay at the times of a persisted
//! schedule, keeps its clock in sync over wifi and serves a small web interface to view and change the schedule.
// we are in an environment with constrained resources, so we do not use the standard library and we define a different entry point.
#![no_std]
#![no_main]

use crate::task::bell_scheduler::bell_scheduler;
use crate::task::persistence::{FLASH_SIZE, FlashEeprom};
use crate::task::relay::relay_handler;
use crate::task::resources::{
    AssignedResources, FlashResources, RelayResources, WatchdogResources, WifiResources,
};
use crate::task::state::init_device_state;
use crate::task::time_updater::time_updater;
use crate::task::watchdog::watchdog_task;
use crate::task::web_server::web_server;
use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_rp::flash::{Async, Flash};
use embassy_rp::gpio::{Level, Output};
use school_bell::DeviceState;
use {defmt_rtt as _, panic_probe as _};

#[macro_use]
mod task;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Program start");

    // Initialize the peripherals for the RP2040
    let p = embassy_rp::init(Default::default());
    // and assign the peripherals to the places where we will use them
    let r = split_resources!(p);

    // the relay starts released and is owned by its task from here on
    let relay_pin = Output::new(r.relay.relay_pin, Level::Low);
    unwrap!(spawner.spawn(relay_handler(relay_pin)));

    // restore schedule and password before anything can ring or change them
    let flash = Flash::<_, Async, { FLASH_SIZE }>::new(r.flash.flash, r.flash.dma_ch);
    let store = FlashEeprom::open(flash).await;
    let state = DeviceState::load(store);
    info!("Loaded {} bell event(s)", state.table().len());
    init_device_state(state).await;

    unwrap!(spawner.spawn(watchdog_task(r.watchdog.watchdog)));
    unwrap!(spawner.spawn(bell_scheduler()));

    let stack = task::network::init(spawner, r.wifi).await;
    unwrap!(spawner.spawn(time_updater(stack)));
    unwrap!(spawner.spawn(web_server(stack)));
}
