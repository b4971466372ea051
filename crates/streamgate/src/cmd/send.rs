use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::cmd::decode::print_datagram;
use crate::cmd::encode::encode_datagram;
use crate::cmd::{parse_payloads, SendArgs};
use crate::config::parse_duration;
use crate::exit::{io_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::OutputFormat;

/// Largest reply accepted while waiting.
const REPLY_BUFFER: usize = 65_507;

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)
        .map_err(|err| CliError::new(USAGE, format!("--wait-timeout: {err}")))?;
    let payloads = parse_payloads(&args.payloads, args.text)?;
    let datagram = encode_datagram(&payloads)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;

    runtime.block_on(exchange(&args, &datagram, wait_timeout, format))
}

async fn exchange(
    args: &SendArgs,
    datagram: &[u8],
    wait_timeout: Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    let target = resolve(&args.addr).await?;
    let socket = UdpSocket::bind(unspecified_for(target))
        .await
        .map_err(|err| io_error("bind failed", err))?;

    let sent = socket
        .send_to(datagram, target)
        .await
        .map_err(|err| io_error(&format!("send to {target} failed"), err))?;
    info!(%target, bytes = sent, frames = args.payloads.len(), "datagram sent");

    if !args.wait {
        return Ok(SUCCESS);
    }

    let mut buf = vec![0u8; REPLY_BUFFER];
    let (len, from) = tokio::time::timeout(wait_timeout, socket.recv_from(&mut buf))
        .await
        .map_err(|_| {
            CliError::new(
                TIMEOUT,
                format!("no reply from {target} within {wait_timeout:?}"),
            )
        })?
        .map_err(|err| io_error("receive failed", err))?;
    debug!(%from, bytes = len, "reply received");

    // Replies use the same framing as requests.
    buf.truncate(len);
    Ok(print_datagram(buf, format))
}

async fn resolve(addr: &str) -> CliResult<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await
        .map_err(|err| io_error(&format!("cannot resolve {addr}"), err))?
        .next()
        .ok_or_else(|| CliError::new(USAGE, format!("{addr} resolved to no addresses")))
}

fn unspecified_for(target: SocketAddr) -> SocketAddr {
    match target {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    }
}
