use std::sync::Arc;

use streamgate_dispatch::{
    DispatchGateway, FramePipeline, SessionManager, SystemClock, TcpJsonGateway,
};
use streamgate_transport::UdpTransport;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cmd::ServeArgs;
use crate::config::{parse_duration, ServerConfig};
use crate::exit::{config_error, io_error, transport_error, CliResult, SUCCESS};

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let config = resolve_config(&args)?;
    if !config.enabled() {
        info!("listen port is 0; gateway disabled");
        return Ok(SUCCESS);
    }
    if config.client_id.is_empty() {
        warn!("no client id configured; backend login will likely be refused");
    }

    // Datagram callbacks and completions share one thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;

    runtime.block_on(serve(config))
}

/// File values first, then flags and environment.
pub fn resolve_config(args: &ServeArgs) -> CliResult<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path).map_err(config_error)?,
        None => ServerConfig::default(),
    };

    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(port) = args.port {
        config.bind.set_port(port);
    }
    if let Some(backend) = &args.backend {
        config.backend = backend.clone();
    }
    if let Some(protocol) = &args.protocol {
        config.protocol = protocol.clone();
    }
    if let Some(heartbeat) = &args.heartbeat {
        config.heartbeat_interval = parse_duration(heartbeat).map_err(config_error)?;
    }
    if let Some(timeout) = &args.dispatch_timeout {
        config.dispatch_timeout = parse_duration(timeout).map_err(config_error)?;
    }
    if let Some(client_id) = &args.client_id {
        config.client_id = client_id.clone();
    }
    if let Some(secret) = &args.client_secret {
        config.client_secret = secret.clone();
    }
    if let Some(bot) = &args.bot_username {
        config.bot_username = bot.clone();
    }
    if let Some(area) = &args.area {
        config.area = Some(area.clone());
    }

    config.validate().map_err(config_error)?;
    Ok(config)
}

async fn serve(config: ServerConfig) -> CliResult<i32> {
    let transport = UdpTransport::bind(config.udp_config())
        .await
        .map_err(|err| transport_error("bind failed", err))?;

    let gateway: Arc<dyn DispatchGateway> = Arc::new(
        TcpJsonGateway::new(config.backend.clone()).with_connect_timeout(config.connect_timeout),
    );
    let sessions = Arc::new(SessionManager::new(
        Arc::clone(&gateway),
        Arc::new(SystemClock),
        config.session_config(),
    ));
    let pipeline = Arc::new(FramePipeline::new(
        sessions,
        gateway,
        Arc::new(transport.reply_sender()),
        config.pipeline_config(),
    ));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; shutting down");
        }
        shutdown.cancel();
    });

    info!(
        local_addr = %transport.local_addr(),
        backend = %config.backend,
        protocol = %config.protocol,
        "gateway started"
    );
    transport
        .run(pipeline, cancel)
        .await
        .map_err(|err| transport_error("gateway stopped", err))?;

    Ok(SUCCESS)
}
