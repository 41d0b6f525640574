//! # Web server task
//! Serves the plain text status page on port 80 and takes change requests.
//!
//! Every request is answered with `200 OK`, the outcome of a change request is the `Status:` line of the page.
use crate::task::relay::signal_cancel_ringing;
use crate::task::state::{DEVICE_STATE, UptimeClock};
use crate::task::watchdog::{TaskId, report_task_success};
use core::fmt::Write as _;
use defmt::{info, warn};
use embassy_net::Stack;
use embassy_net::tcp::{Error, TcpSocket};
use embassy_time::{Duration, with_timeout};
use heapless::String;
use school_bell::status::{self, Outcome};
use school_bell::{ClockSource, Request};

/// Port the page is served on
const HTTP_PORT: u16 = 80;
/// Largest request head read
const MAX_REQUEST_SIZE: usize = 1024;
/// Largest status page
const MAX_PAGE_SIZE: usize = 1536;
/// How long a client may take
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
/// How long to wait for a client before reporting in to the watchdog
const IDLE_REPORT_INTERVAL: Duration = Duration::from_secs(60);

#[embassy_executor::task]
pub async fn web_server(stack: Stack<'static>) {
    info!("Web server task started");
    let mut rx_buffer = [0; 1024];
    let mut tx_buffer = [0; 2048];

    loop {
        // Ensure network is configured before accepting connections.
        stack.wait_config_up().await;

        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(CLIENT_TIMEOUT));

        match with_timeout(IDLE_REPORT_INTERVAL, socket.accept(HTTP_PORT)).await {
            Ok(Ok(())) => {
                if let Err(e) = handle_connection(&mut socket).await {
                    warn!("Connection handling error: {:?}", e);
                }
            }
            Ok(Err(e)) => warn!("Accept error: {:?}", e),
            Err(_) => {}
        }

        socket.abort();
        report_task_success(TaskId::WebServer).await;
    }
}

/// Read a request, carry it out and answer with the status page
async fn handle_connection(socket: &mut TcpSocket<'_>) -> Result<(), Error> {
    let mut buf = [0u8; MAX_REQUEST_SIZE];
    let mut total = 0;

    // Read until we see the end of the request line or the buffer is full.
    loop {
        let n = socket.read(&mut buf[total..]).await?;
        if n == 0 {
            if total == 0 {
                return Ok(());
            }
            break;
        }
        total += n;
        if total >= MAX_REQUEST_SIZE || buf[..total].contains(&b'\n') {
            break;
        }
    }

    let request = Request::parse(&buf[..total]);
    let clock = UptimeClock::current().await;

    let mut page: String<MAX_PAGE_SIZE> = String::new();
    let outcome = {
        let mut guard = DEVICE_STATE.lock().await;
        let Some(state) = guard.as_mut() else {
            warn!("Device state not loaded yet");
            return Ok(());
        };
        let outcome = request.apply(state).await;
        let now = clock.now().map(|now| now.time_of_day());
        if status::render(&mut page, &state.snapshot(), now, outcome).is_err() {
            warn!("Status page truncated");
        }
        outcome
    };
    info!("Request served: {}", outcome);

    if outcome == Outcome::Silenced {
        signal_cancel_ringing();
    }

    let mut head: String<128> = String::new();
    if write!(
        head,
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        page.len()
    )
    .is_err()
    {
        warn!("Response head does not fit");
    }

    write_all(socket, head.as_bytes()).await?;
    write_all(socket, page.as_bytes()).await?;
    socket.close();
    socket.flush().await
}

/// Write all of `data`
async fn write_all(socket: &mut TcpSocket<'_>, mut data: &[u8]) -> Result<(), Error> {
    while !data.is_empty() {
        let n = socket.write(data).await?;
        if n == 0 {
            return Err(Error::ConnectionReset);
        }
        data = &data[n..];
    }
    Ok(())
}
