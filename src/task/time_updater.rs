//! # Time Updater Task
//! Keeps the wall clock in sync with a time API.
//! The task requests the current time, parses the response and hands the sample to the shared clock.
//!
//! # populate constant TIME_SERVER_URL
//! make sure to have a `time_api.json` file in the config folder formatted as follows:
//! ```json
//! {
//!     "time api by zone": {
//!         "baseurl": "http://worldtimeapi.org/api",
//!         "timezone": "/timezone/Europe/Berlin"
//!     }
//! }
//! ```

include!(concat!(env!("OUT_DIR"), "/time_api_config.rs"));

use crate::task::state::CLOCK;
use crate::task::watchdog::{TaskId, report_task_success};
use core::str::from_utf8;
use defmt::{Debug2Format, Format, info, warn};
use embassy_net::Stack;
use embassy_net::dns::DnsSocket;
use embassy_net::tcp::client::{TcpClient, TcpClientState};
use embassy_rp::clocks::RoscRng;
use embassy_time::{Duration, Instant, Timer, with_timeout};
use rand::RngCore;
use reqwless::client::{HttpClient, TlsConfig, TlsVerify};
use reqwless::request::Method;
use serde::Deserialize;

/// How long to wait after a successful sync
const REFRESH_AFTER: Duration = Duration::from_secs(3600);
/// How long to wait after a failed sync
const RETRY_AFTER: Duration = Duration::from_secs(30);

/// Why no time sample could be taken
#[derive(Debug, Format)]
enum TimeFetchError {
    /// The request could not be built or sent
    Request,
    /// The response body could not be read
    Body,
    /// The response is not the expected JSON
    Parse,
}

/// The fields of the time API response the bell needs
#[derive(Deserialize)]
struct ApiResponse {
    /// Seconds since the epoch, UTC
    unixtime: u64,
    /// Offset of the configured zone from UTC, in seconds
    raw_offset: i32,
    /// Daylight saving offset on top of `raw_offset`, in seconds
    dst_offset: i32,
}

/// A time sample
struct TimeSample {
    /// Seconds since the epoch, UTC
    utc_epoch_secs: u64,
    /// Local offset from UTC including daylight saving, in seconds
    utc_offset_secs: i32,
}

/// Request the current time from the time API
async fn fetch_time(stack: Stack<'static>, seed: u64) -> Result<TimeSample, TimeFetchError> {
    // create buffers for the request and response
    let mut rx_buffer = [0; 8192];
    let mut tls_read_buffer = [0; 16640];
    let mut tls_write_buffer = [0; 16640];

    let client_state = TcpClientState::<1, 1024, 1024>::new();
    let tcp_client = TcpClient::new(stack, &client_state);
    let dns_client = DnsSocket::new(stack);
    let tls_config = TlsConfig::new(seed, &mut tls_read_buffer, &mut tls_write_buffer, TlsVerify::None);
    let mut http_client = HttpClient::new_with_tls(&tcp_client, &dns_client, tls_config);

    let mut request = http_client
        .request(Method::GET, TIME_SERVER_URL)
        .await
        .map_err(|e| {
            warn!("Failed to make HTTP request: {:?}", Debug2Format(&e));
            TimeFetchError::Request
        })?;
    let response = request.send(&mut rx_buffer).await.map_err(|e| {
        warn!("Failed to send HTTP request: {:?}", Debug2Format(&e));
        TimeFetchError::Request
    })?;
    let body = response.body().read_to_end().await.map_err(|e| {
        warn!("Failed to read response body: {:?}", Debug2Format(&e));
        TimeFetchError::Body
    })?;
    let body = from_utf8(body).map_err(|_| TimeFetchError::Body)?;
    info!("Response body: {:?}", body);

    let (response, _used) = serde_json_core::de::from_str::<ApiResponse>(body).map_err(|e| {
        warn!("Failed to parse response body: {:?}", Debug2Format(&e));
        TimeFetchError::Parse
    })?;
    Ok(TimeSample {
        utc_epoch_secs: response.unixtime,
        utc_offset_secs: response.raw_offset.saturating_add(response.dst_offset),
    })
}

#[embassy_executor::task]
pub async fn time_updater(stack: Stack<'static>) {
    info!("time updater task started");
    let seed = RoscRng.next_u64();

    loop {
        if with_timeout(RETRY_AFTER, stack.wait_config_up()).await.is_err() {
            warn!("Network still down, time sync postponed");
            report_task_success(TaskId::TimeUpdater).await;
            continue;
        }

        let sample = match fetch_time(stack, seed).await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Time sync failed ({}), retrying in {} seconds", e, RETRY_AFTER.as_secs());
                // still alive, the clock keeps running from the last sync
                report_task_success(TaskId::TimeUpdater).await;
                Timer::after(RETRY_AFTER).await;
                continue;
            }
        };

        let synced = CLOCK.lock().await.sync(
            sample.utc_epoch_secs,
            sample.utc_offset_secs,
            Instant::now().as_secs(),
        );
        if let Err(e) = synced {
            warn!("Time service sent an implausible time: {}", e);
            report_task_success(TaskId::TimeUpdater).await;
            Timer::after(RETRY_AFTER).await;
            continue;
        }

        report_task_success(TaskId::TimeUpdater).await;
        info!("Waiting for {} seconds before syncing again", REFRESH_AFTER.as_secs());
        Timer::after(REFRESH_AFTER).await;
    }
}
