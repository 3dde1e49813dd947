use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use memngt_protocols::{client_to_daemon, daemon_to_client, ClientToDaemonHandler, ClientToDaemonProxy, DaemonToClientHandler};
use memngt_rpc::{CallOptions, RpcConfig, RpcService};

mod client;
mod daemon;

#[derive(Debug, Clone, ValueEnum)]
enum Mode {
    Daemon,
    Client,
}

/// Memory negotiation daemon, or a demo client of it
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Run as daemon or as client
    #[arg(env, short, long, default_value = "daemon")]
    mode: Mode,

    /// Listen address, a client usually takes port 0
    #[arg(env, short, long, default_value = "127.0.0.1:7000")]
    bind_addr: SocketAddr,

    /// Daemon address, used in client mode
    #[arg(env, short, long, default_value = "127.0.0.1:7000")]
    daemon_addr: SocketAddr,

    /// Name the client registers with
    #[arg(env, long, default_value = "memngt-client")]
    client_name: String,

    /// Memory the daemon shares out, in kilobytes
    #[arg(env, long, default_value_t = 1024 * 1024)]
    total_memory_kb: u32,

    /// Share granted to a newly registered client, in kilobytes
    #[arg(env, long, default_value_t = 64 * 1024)]
    client_share_kb: u32,

    /// Extra memory the client asks for after registering, in kilobytes
    #[arg(env, long, default_value_t = 16 * 1024)]
    request_kb: u32,

    /// Client call deadline in milliseconds, 0 waits forever
    #[arg(env, long, default_value_t = 5000)]
    call_deadline_ms: u64,

    /// Retransmit interval in milliseconds
    #[arg(env, long, default_value_t = 100)]
    retransmit_interval_ms: u64,

    /// Cache sweep period in milliseconds
    #[arg(env, long, default_value_t = 10_000)]
    cache_sweep_interval_ms: u64,

    /// Socket read timeout in milliseconds
    #[arg(env, long, default_value_t = 100)]
    read_timeout_ms: u64,

    /// Log rpc stats every this many seconds
    #[arg(env, long, default_value_t = 10)]
    stats_interval_secs: u64,
}

impl Args {
    fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            bind_addr: self.bind_addr,
            retransmit_interval_ms: self.retransmit_interval_ms,
            cache_sweep_interval_ms: self.cache_sweep_interval_ms,
            read_timeout_ms: self.read_timeout_ms,
            ..Default::default()
        }
    }

    fn call_options(&self) -> CallOptions {
        match self.call_deadline_ms {
            0 => CallOptions::default(),
            ms => CallOptions::default().with_deadline(Duration::from_millis(ms)),
        }
    }
}

fn main() {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::builder().format_timestamp_millis().init();
    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&term)).expect("Should register hook");
    let args = Args::parse();

    let service = match RpcService::new(args.rpc_config()) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            log::error!("Cannot start rpc service on {}: {}", args.bind_addr, e);
            std::process::exit(1);
        }
    };

    let mut running_daemon = None;
    let mut running_client = None;
    match args.mode {
        Mode::Daemon => {
            let instance = daemon::InMemoryDaemon::start(service.clone(), args.total_memory_kb, args.client_share_kb, args.call_options()).expect("Should start daemon notifier");
            service
                .register_handler(client_to_daemon::CONTRACT_NAME, Arc::new(ClientToDaemonHandler::new(instance.clone())))
                .expect("Should register daemon contract");
            log::info!("Daemon serving {} kb on {}", args.total_memory_kb, service.local_addr());
            running_daemon = Some(instance);
        }
        Mode::Client => {
            let client = Arc::new(client::InMemoryClient::new(args.request_kb));
            service
                .register_handler(daemon_to_client::CONTRACT_NAME, Arc::new(DaemonToClientHandler::new(client.clone())))
                .expect("Should register client contract");
            let proxy = service.create_proxy(args.daemon_addr, client_to_daemon::CONTRACT_NAME).with_options(args.call_options());
            let to_daemon = ClientToDaemonProxy::new(proxy);
            if let Err(e) = client.negotiate(&to_daemon, &args.client_name, std::process::id(), service.local_addr().port()) {
                log::error!("Negotiation with daemon {} failed: {}", args.daemon_addr, e);
            }
            running_client = Some(client);
        }
    }

    let stats_interval = Duration::from_secs(args.stats_interval_secs.max(1));
    let mut last_stats = Instant::now();
    while !term.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
        if last_stats.elapsed() >= stats_interval {
            last_stats = Instant::now();
            log_stats(&service);
        }
    }

    log::info!("Shutdown requested");
    service.shutdown();
    if let Some(daemon) = running_daemon {
        daemon.stop();
        log::info!("Daemon stopped with {} kb free", daemon.free_kb());
    }
    if let Some(client) = running_client {
        log::info!("Client stopped with share {} kb", client.share_kb());
    }
    log_stats(&service);
    log::info!("Server shutdown");
}

fn log_stats(service: &RpcService) {
    match serde_json::to_string(&service.stats()) {
        Ok(json) => log::info!("Rpc stats: {}", json),
        Err(e) => log::error!("Cannot encode rpc stats: {}", e),
    }
}
