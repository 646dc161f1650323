//! The warp HTTP surface over the Beacon mock: the `/eth` read routes used by
//! staking tooling plus the `/admin` mutation routes used by tests.
//!
//! Admin mutations are GET requests with query parameters; the surface exists
//! purely for testing and keeps the original tooling-friendly dispatch.

use crate::manager::BeaconMockManager;
use api_types::{GenericResponse, Hash256, PublicKeyBytes, QueryVec, ValidatorId};
use parking_lot::RwLock;
use serde::Deserialize;
use slog::{info, Logger};
use std::collections::HashMap;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use std::sync::Arc;
use warp::{Filter, Rejection};
use warp_utils::reject::{custom_bad_request, custom_not_found};

#[derive(Debug)]
pub enum Error {
    Warp(warp::Error),
    Other(String),
}

impl From<warp::Error> for Error {
    fn from(e: warp::Error) -> Self {
        Error::Warp(e)
    }
}

/// Configuration for the HTTP server.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub listen_addr: Ipv4Addr,
    pub listen_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: Ipv4Addr::new(127, 0, 0, 1),
            listen_port: 48812,
        }
    }
}

/// Everything the server needs to answer requests.
pub struct Context {
    pub config: Config,
    pub manager: Arc<RwLock<BeaconMockManager>>,
    pub log: Logger,
}

#[derive(Deserialize)]
struct ValidatorsQuery {
    id: Option<QueryVec<ValidatorId>>,
}

/// Pulls a required admin query parameter, mirroring the `missing {name}`
/// errors of the original surface.
fn required_param(query: &HashMap<String, String>, name: &str) -> Result<String, Rejection> {
    query
        .get(name)
        .cloned()
        .ok_or_else(|| custom_bad_request(format!("missing {}", name)))
}

fn parse_u64(value: &str, name: &str) -> Result<u64, Rejection> {
    value
        .parse::<u64>()
        .map_err(|e| custom_bad_request(format!("error parsing {} [{}]: {}", name, value, e)))
}

fn parse_hash(value: &str, name: &str) -> Result<Hash256, Rejection> {
    Hash256::from_str(value.trim_start_matches("0x"))
        .map_err(|e| custom_bad_request(format!("error parsing {} [{}]: {}", name, value, e)))
}

fn parse_validator_id(value: &str) -> Result<ValidatorId, Rejection> {
    ValidatorId::from_str(value).map_err(custom_bad_request)
}

/// Creates the server, binding immediately and returning the bound address
/// together with the future that runs it. The server shuts down gracefully
/// when `shutdown` resolves.
pub fn serve(
    ctx: Arc<Context>,
    shutdown: impl Future<Output = ()> + Send + Sync + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>), Error> {
    let config = ctx.config.clone();
    let log = ctx.log.clone();

    let inner_ctx = ctx.clone();
    let ctx_filter = warp::any().map(move || inner_ctx.clone());

    let eth_v1 = warp::path("eth").and(warp::path("v1"));
    let admin = warp::path("admin");

    // GET eth/v1/beacon/states/{state_id}/validators
    let get_validators = eth_v1
        .and(warp::path("beacon"))
        .and(warp::path("states"))
        .and(warp::path::param::<String>())
        .and(warp::path("validators"))
        .and(warp::path::end())
        .and(warp::query::<ValidatorsQuery>())
        .and(ctx_filter.clone())
        .and_then(
            |state_id: String, query: ValidatorsQuery, ctx: Arc<Context>| async move {
                let ids = query.id.map(|q| q.0).unwrap_or_default();
                let data = ctx
                    .manager
                    .read()
                    .validators_data(&state_id, &ids)
                    .map_err(custom_bad_request)?;
                Ok::<_, Rejection>(warp::reply::json(&GenericResponse::from(data)))
            },
        );

    // GET eth/v1/beacon/states/{state_id}/validators/{validator_id}
    let get_validator = eth_v1
        .and(warp::path("beacon"))
        .and(warp::path("states"))
        .and(warp::path::param::<String>())
        .and(warp::path("validators"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(ctx_filter.clone())
        .and_then(
            |state_id: String, validator_id: String, ctx: Arc<Context>| async move {
                let id = parse_validator_id(&validator_id)?;
                let data = ctx
                    .manager
                    .read()
                    .validator_data(&state_id, &id)
                    .map_err(custom_bad_request)?;
                Ok::<_, Rejection>(warp::reply::json(&GenericResponse::from(data)))
            },
        );

    // GET eth/v1/node/syncing
    let get_syncing = eth_v1
        .and(warp::path("node"))
        .and(warp::path("syncing"))
        .and(warp::path::end())
        .and(ctx_filter.clone())
        .and_then(|ctx: Arc<Context>| async move {
            let data = ctx.manager.read().syncing_data();
            Ok::<_, Rejection>(warp::reply::json(&GenericResponse::from(data)))
        });

    // GET eth/v1/config/deposit_contract
    let get_deposit_contract = eth_v1
        .and(warp::path("config"))
        .and(warp::path("deposit_contract"))
        .and(warp::path::end())
        .and(ctx_filter.clone())
        .and_then(|ctx: Arc<Context>| async move {
            let data = ctx.manager.read().deposit_contract_data();
            Ok::<_, Rejection>(warp::reply::json(&GenericResponse::from(data)))
        });

    // GET eth/v1/config/spec
    let get_config_spec = eth_v1
        .and(warp::path("config"))
        .and(warp::path("spec"))
        .and(warp::path::end())
        .and(ctx_filter.clone())
        .and_then(|ctx: Arc<Context>| async move {
            let data = ctx.manager.read().config_spec_data();
            Ok::<_, Rejection>(warp::reply::json(&GenericResponse::from(data)))
        });

    // GET eth/v1/beacon/genesis
    let get_genesis = eth_v1
        .and(warp::path("beacon"))
        .and(warp::path("genesis"))
        .and(warp::path::end())
        .and(ctx_filter.clone())
        .and_then(|ctx: Arc<Context>| async move {
            let data = ctx.manager.read().genesis_data();
            Ok::<_, Rejection>(warp::reply::json(&GenericResponse::from(data)))
        });

    // GET eth/v1/beacon/headers?slot={slot}
    let get_headers = eth_v1
        .and(warp::path("beacon"))
        .and(warp::path("headers"))
        .and(warp::path::end())
        .and(warp::query::<HashMap<String, String>>())
        .and(ctx_filter.clone())
        .and_then(
            |query: HashMap<String, String>, ctx: Arc<Context>| async move {
                let slot = required_param(&query, "slot")?;
                let header = ctx
                    .manager
                    .read()
                    .header_data(&slot)
                    .map_err(custom_bad_request)?
                    .ok_or_else(|| custom_not_found(format!("slot [{}] does not exist", slot)))?;
                Ok::<_, Rejection>(warp::reply::json(&header))
            },
        );

    // GET eth/v1/beacon/headers/{block_id}
    let get_header = eth_v1
        .and(warp::path("beacon"))
        .and(warp::path("headers"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(ctx_filter.clone())
        .and_then(|block_id: String, ctx: Arc<Context>| async move {
            let header = ctx
                .manager
                .read()
                .header_data(&block_id)
                .map_err(custom_bad_request)?
                .ok_or_else(|| custom_not_found(format!("block [{}] does not exist", block_id)))?;
            Ok::<_, Rejection>(warp::reply::json(&header))
        });

    // GET eth/v1/beacon/states/{state_id}/finality_checkpoints
    let get_finality_checkpoints = eth_v1
        .and(warp::path("beacon"))
        .and(warp::path("states"))
        .and(warp::path::param::<String>())
        .and(warp::path("finality_checkpoints"))
        .and(warp::path::end())
        .and(ctx_filter.clone())
        .and_then(|state_id: String, ctx: Arc<Context>| async move {
            let data = ctx
                .manager
                .read()
                .finality_checkpoints(&state_id)
                .map_err(custom_bad_request)?;
            Ok::<_, Rejection>(warp::reply::json(&GenericResponse::from(data)))
        });

    // GET eth/v1/beacon/states/{state_id}/pending_deposits
    let get_pending_deposits = eth_v1
        .and(warp::path("beacon"))
        .and(warp::path("states"))
        .and(warp::path::param::<String>())
        .and(warp::path("pending_deposits"))
        .and(warp::path::end())
        .and(ctx_filter.clone())
        .and_then(|state_id: String, ctx: Arc<Context>| async move {
            let data = ctx
                .manager
                .read()
                .pending_deposits_data(&state_id)
                .map_err(custom_bad_request)?;
            Ok::<_, Rejection>(warp::reply::json(&GenericResponse::from(data)))
        });

    // GET eth/v1/beacon/blinded_blocks/{block_id}
    let get_blinded_block = eth_v1
        .and(warp::path("beacon"))
        .and(warp::path("blinded_blocks"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(ctx_filter.clone())
        .and_then(|block_id: String, ctx: Arc<Context>| async move {
            let data = ctx
                .manager
                .read()
                .blinded_block_data(&block_id)
                .map_err(custom_bad_request)?
                .ok_or_else(|| custom_not_found(format!("block [{}] does not exist", block_id)))?;
            Ok::<_, Rejection>(warp::reply::json(&GenericResponse::from(data)))
        });

    // GET admin/add-validator?pubkey={hex}&creds={hex}
    let admin_add_validator = admin
        .and(warp::path("add-validator"))
        .and(warp::path::end())
        .and(warp::query::<HashMap<String, String>>())
        .and(ctx_filter.clone())
        .and_then(
            |query: HashMap<String, String>, ctx: Arc<Context>| async move {
                let pubkey_string = required_param(&query, "pubkey")?;
                let creds_string = required_param(&query, "creds")?;
                let pubkey =
                    PublicKeyBytes::from_str(&pubkey_string).map_err(custom_bad_request)?;
                let creds = parse_hash(&creds_string, "creds")?;

                let index = ctx
                    .manager
                    .write()
                    .add_validator(pubkey, creds)
                    .map_err(custom_bad_request)?;
                Ok::<_, Rejection>(warp::reply::json(&api_types::AddValidatorResponse { index }))
            },
        );

    // GET admin/commit-block?validated={bool}
    let admin_commit_block = admin
        .and(warp::path("commit-block"))
        .and(warp::path::end())
        .and(warp::query::<HashMap<String, String>>())
        .and(ctx_filter.clone())
        .and_then(
            |query: HashMap<String, String>, ctx: Arc<Context>| async move {
                let validated_string = required_param(&query, "validated")?;
                let validated = validated_string.parse::<bool>().map_err(|e| {
                    custom_bad_request(format!(
                        "error parsing validated [{}]: {}",
                        validated_string, e
                    ))
                })?;
                ctx.manager.write().commit_block(validated);
                Ok::<_, Rejection>(warp::reply::json(&()))
            },
        );

    // GET admin/set-balance?id={id}&balance={gwei}
    let admin_set_balance = admin
        .and(warp::path("set-balance"))
        .and(warp::path::end())
        .and(warp::query::<HashMap<String, String>>())
        .and(ctx_filter.clone())
        .and_then(
            |query: HashMap<String, String>, ctx: Arc<Context>| async move {
                let id = parse_validator_id(&required_param(&query, "id")?)?;
                let balance = parse_u64(&required_param(&query, "balance")?, "balance")?;

                let mut manager = ctx.manager.write();
                let validator = manager.validator_mut(&id).map_err(custom_bad_request)?;
                validator.set_balance(balance);
                Ok::<_, Rejection>(warp::reply::json(&()))
            },
        );

    // GET admin/set-status?id={id}&status={status}
    let admin_set_status = admin
        .and(warp::path("set-status"))
        .and(warp::path::end())
        .and(warp::query::<HashMap<String, String>>())
        .and(ctx_filter.clone())
        .and_then(
            |query: HashMap<String, String>, ctx: Arc<Context>| async move {
                let id = parse_validator_id(&required_param(&query, "id")?)?;
                let status = required_param(&query, "status")?
                    .parse()
                    .map_err(custom_bad_request)?;

                let mut manager = ctx.manager.write();
                let validator = manager.validator_mut(&id).map_err(custom_bad_request)?;
                validator.set_status(status);
                Ok::<_, Rejection>(warp::reply::json(&()))
            },
        );

    // GET admin/set-activation-epoch?id={id}&epoch={epoch}
    let admin_set_activation_epoch = admin
        .and(warp::path("set-activation-epoch"))
        .and(warp::path::end())
        .and(warp::query::<HashMap<String, String>>())
        .and(ctx_filter.clone())
        .and_then(
            |query: HashMap<String, String>, ctx: Arc<Context>| async move {
                let id = parse_validator_id(&required_param(&query, "id")?)?;
                let epoch = parse_u64(&required_param(&query, "epoch")?, "epoch")?;

                let mut manager = ctx.manager.write();
                let validator = manager.validator_mut(&id).map_err(custom_bad_request)?;
                validator.set_activation_epoch(epoch);
                Ok::<_, Rejection>(warp::reply::json(&()))
            },
        );

    // GET admin/slash?id={id}&penalty={gwei}
    let admin_slash = admin
        .and(warp::path("slash"))
        .and(warp::path::end())
        .and(warp::query::<HashMap<String, String>>())
        .and(ctx_filter.clone())
        .and_then(
            |query: HashMap<String, String>, ctx: Arc<Context>| async move {
                let id = parse_validator_id(&required_param(&query, "id")?)?;
                let penalty = parse_u64(&required_param(&query, "penalty")?, "penalty")?;

                let mut manager = ctx.manager.write();
                let validator = manager.validator_mut(&id).map_err(custom_bad_request)?;
                validator.slash(penalty).map_err(custom_bad_request)?;
                Ok::<_, Rejection>(warp::reply::json(&()))
            },
        );

    // GET admin/set-highest-slot?slot={slot}
    let admin_set_highest_slot = admin
        .and(warp::path("set-highest-slot"))
        .and(warp::path::end())
        .and(warp::query::<HashMap<String, String>>())
        .and(ctx_filter.clone())
        .and_then(
            |query: HashMap<String, String>, ctx: Arc<Context>| async move {
                let slot = parse_u64(&required_param(&query, "slot")?, "slot")?;
                ctx.manager.write().set_highest_slot(slot);
                Ok::<_, Rejection>(warp::reply::json(&()))
            },
        );

    // GET admin/set-slot-block-root?slot={slot}&root={hex}
    let admin_set_slot_block_root = admin
        .and(warp::path("set-slot-block-root"))
        .and(warp::path::end())
        .and(warp::query::<HashMap<String, String>>())
        .and(ctx_filter.clone())
        .and_then(
            |query: HashMap<String, String>, ctx: Arc<Context>| async move {
                let slot = parse_u64(&required_param(&query, "slot")?, "slot")?;
                let root = parse_hash(&required_param(&query, "root")?, "root")?;
                ctx.manager.write().set_slot_block_root(slot, root);
                Ok::<_, Rejection>(warp::reply::json(&()))
            },
        );

    // GET admin/set-slot-execution-block-number?slot={slot}&block_number={n}
    let admin_set_slot_execution_block_number = admin
        .and(warp::path("set-slot-execution-block-number"))
        .and(warp::path::end())
        .and(warp::query::<HashMap<String, String>>())
        .and(ctx_filter.clone())
        .and_then(
            |query: HashMap<String, String>, ctx: Arc<Context>| async move {
                let slot = parse_u64(&required_param(&query, "slot")?, "slot")?;
                let block_number =
                    parse_u64(&required_param(&query, "block_number")?, "block_number")?;
                ctx.manager
                    .write()
                    .set_slot_execution_block_number(slot, block_number);
                Ok::<_, Rejection>(warp::reply::json(&()))
            },
        );

    // GET admin/reset
    let admin_reset = admin
        .and(warp::path("reset"))
        .and(warp::path::end())
        .and(ctx_filter)
        .and_then(|ctx: Arc<Context>| async move {
            ctx.manager.write().reset();
            Ok::<_, Rejection>(warp::reply::json(&()))
        });

    let routes = warp::get()
        .and(
            get_validator
                .or(get_validators)
                .or(get_syncing)
                .or(get_deposit_contract)
                .or(get_config_spec)
                .or(get_genesis)
                .or(get_header)
                .or(get_headers)
                .or(get_finality_checkpoints)
                .or(get_pending_deposits)
                .or(get_blinded_block)
                .or(admin_add_validator)
                .or(admin_commit_block)
                .or(admin_set_balance)
                .or(admin_set_status)
                .or(admin_set_activation_epoch)
                .or(admin_slash)
                .or(admin_set_highest_slot)
                .or(admin_set_slot_block_root)
                .or(admin_set_slot_execution_block_number)
                .or(admin_reset),
        )
        .recover(warp_utils::reject::handle_rejection)
        .with(warp::log::custom(move |request_info| {
            info!(
                log,
                "Processed HTTP request";
                "method" => %request_info.method(),
                "path" => request_info.path(),
                "status" => request_info.status().as_u16(),
            );
        }));

    let (listening_socket, server) = warp::serve(routes).try_bind_with_graceful_shutdown(
        SocketAddrV4::new(config.listen_addr, config.listen_port),
        async {
            shutdown.await;
        },
    )?;

    info!(
        ctx.log,
        "Beacon mock HTTP server started";
        "listen_address" => listening_socket.to_string(),
    );

    Ok((listening_socket, server))
}
