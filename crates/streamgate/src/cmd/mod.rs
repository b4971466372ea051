use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the UDP gateway.
    Serve(ServeArgs),
    /// Decode a hex datagram into frames.
    Decode(DecodeArgs),
    /// Encode payloads into one datagram and print it as hex.
    Encode(EncodeArgs),
    /// Encode payloads, send them as one datagram, and optionally wait for a reply.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// TOML configuration file.
    #[arg(long, short = 'c', value_name = "FILE", env = "STREAMGATE_CONFIG")]
    pub config: Option<PathBuf>,
    /// UDP listen address.
    #[arg(long, value_name = "ADDR", env = "STREAMGATE_BIND")]
    pub bind: Option<SocketAddr>,
    /// UDP listen port; 0 disables the gateway.
    #[arg(long, short = 'p', env = "STREAMGATE_PORT")]
    pub port: Option<u16>,
    /// Backend command processor address (host:port).
    #[arg(long, value_name = "ADDR", env = "STREAMGATE_BACKEND")]
    pub backend: Option<String>,
    /// Protocol name handed to the backend parser.
    #[arg(long, env = "STREAMGATE_PROTOCOL")]
    pub protocol: Option<String>,
    /// Heartbeat and retry interval (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", env = "STREAMGATE_HEARTBEAT")]
    pub heartbeat: Option<String>,
    /// Per-batch dispatch timeout (e.g. 30s).
    #[arg(long, value_name = "DURATION", env = "STREAMGATE_DISPATCH_TIMEOUT")]
    pub dispatch_timeout: Option<String>,
    /// Service client id.
    #[arg(long, env = "STREAMGATE_CLIENT_ID")]
    pub client_id: Option<String>,
    /// Service client secret.
    #[arg(long, env = "STREAMGATE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
    /// Bot whose session handle frames run under.
    #[arg(long, env = "STREAMGATE_BOT_USERNAME")]
    pub bot_username: Option<String>,
    /// Context area selected after switching identity.
    #[arg(long, env = "STREAMGATE_AREA")]
    pub area: Option<String>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Datagram bytes as hex; whitespace is ignored.
    #[arg(required = true, num_args = 1..)]
    pub hex: Vec<String>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// One payload per argument, as hex (or text with --text).
    #[arg(required = true, num_args = 1..)]
    pub payloads: Vec<String>,
    /// Treat payload arguments as UTF-8 text.
    #[arg(long)]
    pub text: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Gateway address (host:port).
    pub addr: String,
    /// One payload per argument, as hex (or text with --text).
    #[arg(required = true, num_args = 1..)]
    pub payloads: Vec<String>,
    /// Treat payload arguments as UTF-8 text.
    #[arg(long)]
    pub text: bool,
    /// Wait for one reply datagram and print its frames.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse hex, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let cleaned: String = input.split_whitespace().collect();
    let digits = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
        .unwrap_or(&cleaned);
    hex::decode(digits).map_err(|err| CliError::new(USAGE, format!("invalid hex {input:?}: {err}")))
}

/// Resolve payload arguments into bytes.
pub fn parse_payloads(payloads: &[String], text: bool) -> CliResult<Vec<Vec<u8>>> {
    if text {
        return Ok(payloads.iter().map(|p| p.as_bytes().to_vec()).collect());
    }
    payloads.iter().map(|p| parse_hex(p)).collect()
}
