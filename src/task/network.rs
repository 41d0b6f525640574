//! # Network
//! Brings up the Pico W's wifi chip and the network stack, joins the configured network and stays joined.
//!
//! # populate constants SSID and PASSWORD
//! make sure to have a `wifi_config.json` file in the config folder formatted as follows:
//!```json
//!  {
//!     "ssid": "some_ssid_here",
//!     "password": "some_password_here"
//! }
//! ```
//! build.rs turns it into `wifi_secrets.rs`.

include!(concat!(env!("OUT_DIR"), "/wifi_secrets.rs"));

use crate::task::resources::{Irqs, WifiResources};
use cyw43::JoinOptions;
use cyw43_pio::{DEFAULT_CLOCK_DIVIDER, PioSpi};
use defmt::{Debug2Format, error, info, unwrap};
use embassy_executor::Spawner;
use embassy_net::{Config, DhcpConfig, Stack, StackResources};
use embassy_rp::clocks::RoscRng;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{DMA_CH0, PIO0};
use embassy_rp::pio::Pio;
use embassy_time::{Duration, Timer, with_timeout};
use rand::RngCore;
use static_cell::StaticCell;

/// Hostname announced over DHCP
const HOSTNAME: &str = "schoolbell";
/// How long a join attempt may take
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause after a failed join attempt
const RETRY_AFTER: Duration = Duration::from_secs(30);
/// How often the link is checked once joined
const LINK_CHECK_INTERVAL: Duration = Duration::from_secs(10);

#[embassy_executor::task]
async fn wifi_task(runner: cyw43::Runner<'static, Output<'static>, PioSpi<'static, PIO0, 0, DMA_CH0>>) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, cyw43::NetDriver<'static>>) -> ! {
    runner.run().await
}

/// Start the wifi chip and the network stack. The stack is returned right away, joining the network happens in
/// the background.
pub async fn init(spawner: Spawner, r: WifiResources) -> Stack<'static> {
    info!("init wifi");
    let pwr = Output::new(r.pwr_pin, Level::Low);
    let cs = Output::new(r.cs_pin, Level::High);
    let mut pio = Pio::new(r.pio_sm, Irqs);
    let spi = PioSpi::new(
        &mut pio.common,
        pio.sm0,
        DEFAULT_CLOCK_DIVIDER,
        pio.irq0,
        cs,
        r.dio_pin,
        r.clk_pin,
        r.dma_ch,
    );

    // SAFETY: the cyw43 firmware and CLM blobs are flashed to these addresses alongside the program
    let fw = unsafe { core::slice::from_raw_parts(0x1010_0000 as *const u8, 230_321) };
    let clm = unsafe { core::slice::from_raw_parts(0x1014_0000 as *const u8, 4752) };

    static STATE: StaticCell<cyw43::State> = StaticCell::new();
    let state = STATE.init(cyw43::State::new());
    let (net_device, mut control, runner) = cyw43::new(state, pwr, spi, fw).await;
    unwrap!(spawner.spawn(wifi_task(runner)));

    info!("init control");
    control.init(clm).await;
    control.set_power_management(cyw43::PowerManagementMode::PowerSave).await;

    let mut dhcp_config = DhcpConfig::default();
    dhcp_config.hostname = HOSTNAME.try_into().ok();
    let config = Config::dhcpv4(dhcp_config);

    let seed = RoscRng.next_u64();

    static RESOURCES: StaticCell<StackResources<5>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(net_device, config, RESOURCES.init(StackResources::new()), seed);
    unwrap!(spawner.spawn(net_task(runner)));
    unwrap!(spawner.spawn(connection_keeper(control, stack)));

    stack
}

/// Joins the network and joins again whenever the link drops
#[embassy_executor::task]
async fn connection_keeper(mut control: cyw43::Control<'static>, stack: Stack<'static>) {
    info!("Connection keeper started");
    loop {
        if stack.is_link_up() {
            Timer::after(LINK_CHECK_INTERVAL).await;
            continue;
        }

        control.gpio_set(0, false).await; // Turn off the onboard LED
        info!("Joining WPA2 network with SSID: {:?}", SSID);
        match with_timeout(JOIN_TIMEOUT, control.join(SSID, JoinOptions::new(PASSWORD.as_bytes()))).await {
            Ok(Ok(())) => {
                control.gpio_set(0, true).await; // Turn on the onboard LED
                info!("Connected to wifi, waiting for DHCP");
                stack.wait_config_up().await;
                if let Some(config) = stack.config_v4() {
                    info!("Serving on {}", config.address);
                }
            }
            Ok(Err(e)) => {
                error!("Error connecting to wifi: {}", Debug2Format(&e));
                control.leave().await;
                Timer::after(RETRY_AFTER).await;
            }
            Err(_) => {
                error!("Timeout while trying to connect to wifi");
                control.leave().await;
                Timer::after(RETRY_AFTER).await;
            }
        }
    }
}
