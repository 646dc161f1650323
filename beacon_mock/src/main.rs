use beacon_mock::config::BeaconConfig;
use beacon_mock::http::{self, Config as HttpConfig, Context};
use beacon_mock::manager::BeaconMockManager;
use clap::{Arg, ArgAction, Command};
use parking_lot::RwLock;
use slog::{error, info};
use std::net::Ipv4Addr;
use std::process::exit;
use std::sync::Arc;

fn main() {
    let matches = Command::new("beacon-mock")
        .about("Partial mock of a consensus-layer node, for testing applications that use the validator status routes")
        .arg(
            Arg::new("ip")
                .long("ip")
                .short('i')
                .action(ArgAction::Set)
                .default_value("127.0.0.1")
                .help("The IP address to bind the API server to"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .action(ArgAction::Set)
                .default_value("48812")
                .help("The port to bind the API server to (0 picks an unused port)"),
        )
        .arg(
            Arg::new("config-file")
                .long("config-file")
                .short('c')
                .action(ArgAction::Set)
                .help("An optional configuration file to load; defaults are used when omitted"),
        )
        .arg(
            Arg::new("debug-level")
                .long("debug-level")
                .action(ArgAction::Set)
                .default_value("info")
                .help("Log verbosity: info, debug, trace, warn or error"),
        )
        .get_matches();

    let log = match logging::term_logger(
        matches
            .get_one::<String>("debug-level")
            .map(String::as_str)
            .unwrap_or("info"),
    ) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("Error building logger: {}", e);
            exit(1);
        }
    };

    let listen_addr = match matches
        .get_one::<String>("ip")
        .expect("ip has a default")
        .parse::<Ipv4Addr>()
    {
        Ok(addr) => addr,
        Err(e) => {
            error!(log, "Invalid --ip value"; "error" => %e);
            exit(1);
        }
    };
    let listen_port = match matches
        .get_one::<String>("port")
        .expect("port has a default")
        .parse::<u16>()
    {
        Ok(port) => port,
        Err(e) => {
            error!(log, "Invalid --port value"; "error" => %e);
            exit(1);
        }
    };

    let config = match matches.get_one::<String>("config-file") {
        None => BeaconConfig::default(),
        Some(path) => match BeaconConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!(log, "Error loading config file"; "error" => e);
                exit(1);
            }
        },
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(log, "Error starting tokio runtime"; "error" => %e);
            exit(1);
        }
    };

    runtime.block_on(async {
        let manager = Arc::new(RwLock::new(BeaconMockManager::new(log.clone(), config)));
        let ctx = Arc::new(Context {
            config: HttpConfig {
                listen_addr,
                listen_port,
            },
            manager,
            log: log.clone(),
        });

        let (shutdown_tx, shutdown_rx) = futures::channel::oneshot::channel::<()>();
        let (_addr, server) = match http::serve(ctx, async {
            let _ = shutdown_rx.await;
        }) {
            Ok(bound) => bound,
            Err(e) => {
                error!(log, "Error starting HTTP server"; "error" => ?e);
                exit(1);
            }
        };

        let server_handle = tokio::spawn(server);

        wait_for_shutdown_signal().await;
        info!(log, "Shutting down");
        let _ = shutdown_tx.send(());
        let _ = server_handle.await;
    });
}

async fn wait_for_shutdown_signal() {
    let sigint = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("unable to register SIGTERM handler");
        tokio::select! {
            _ = sigint => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = sigint.await;
    }
}
