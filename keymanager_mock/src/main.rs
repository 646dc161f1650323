use api_types::{Address, Hash256};
use clap::{Arg, ArgAction, Command};
use keymanager_mock::database::{KeyManagerOpts, DEFAULT_API_TOKEN, DEFAULT_GRAFFITI};
use keymanager_mock::http::{self, Config as HttpConfig, Context};
use keymanager_mock::manager::KeyManagerMock;
use parking_lot::RwLock;
use slog::{error, info};
use std::net::Ipv4Addr;
use std::process::exit;
use std::str::FromStr;
use std::sync::Arc;

fn main() {
    let matches = Command::new("keymanager-mock")
        .about("Partial mock of a validator client, for testing applications that use the key manager API")
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
                .default_value("48822")
                .help("The port to bind the API server to (0 picks an unused port)"),
        )
        .arg(
            Arg::new("default-fee-recipient")
                .long("default-fee-recipient")
                .short('f')
                .action(ArgAction::Set)
                .help("The default fee recipient address"),
        )
        .arg(
            Arg::new("default-graffiti")
                .long("default-graffiti")
                .short('g')
                .action(ArgAction::Set)
                .default_value(DEFAULT_GRAFFITI)
                .help("The default graffiti string"),
        )
        .arg(
            Arg::new("genesis-validators-root")
                .long("genesis-validators-root")
                .short('r')
                .action(ArgAction::Set)
                .help("The genesis validators root hash"),
        )
        .arg(
            Arg::new("api-token")
                .long("api-token")
                .short('t')
                .action(ArgAction::Set)
                .default_value(DEFAULT_API_TOKEN)
                .help("The bearer token required by the key manager routes"),
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

    let default_fee_recipient = match matches.get_one::<String>("default-fee-recipient") {
        None => None,
        Some(value) => match Address::from_str(value.trim_start_matches("0x")) {
            Ok(address) => Some(address),
            Err(e) => {
                error!(log, "Invalid --default-fee-recipient value"; "error" => ?e);
                exit(1);
            }
        },
    };
    let genesis_validators_root = match matches.get_one::<String>("genesis-validators-root") {
        None => None,
        Some(value) => match Hash256::from_str(value.trim_start_matches("0x")) {
            Ok(root) => Some(root),
            Err(e) => {
                error!(log, "Invalid --genesis-validators-root value"; "error" => ?e);
                exit(1);
            }
        },
    };

    let opts = KeyManagerOpts {
        default_fee_recipient,
        default_graffiti: matches.get_one::<String>("default-graffiti").cloned(),
        genesis_validators_root,
        api_token: matches.get_one::<String>("api-token").cloned(),
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(log, "Error starting tokio runtime"; "error" => %e);
            exit(1);
        }
    };

    runtime.block_on(async {
        let manager = Arc::new(RwLock::new(KeyManagerMock::new(log.clone(), opts)));
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
