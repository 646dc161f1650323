//! The warp HTTP surface over the key-manager mock: the bearer-authenticated
//! standard `/eth` routes plus the unauthenticated `/admin` bootstrap surface.

use crate::manager::KeyManagerMock;
use api_types::{
    ApiTokenData, DefaultFeeRecipientData, DefaultGraffitiData, DeleteKeystoresRequest,
    DeleteKeystoresResponse, GenericResponse, GenesisValidatorsRootData, GetFeeRecipientResponse,
    GetGraffitiResponse, ImportKeystoresRequest, ImportKeystoresResponse, Interchange, Keystore,
    ListKeystoresResponse, PublicKeyBytes, SetFeeRecipientRequest, SetGraffitiRequest,
};
use parking_lot::RwLock;
use slog::{info, Logger};
use std::collections::HashMap;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection};
use warp_utils::reject::{custom_bad_request, unauthorized};

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
            listen_port: 48822,
        }
    }
}

pub struct Context {
    pub config: Config,
    pub manager: Arc<RwLock<KeyManagerMock>>,
    pub log: Logger,
}

fn parse_pubkey(value: &str) -> Result<PublicKeyBytes, Rejection> {
    PublicKeyBytes::from_str(value).map_err(custom_bad_request)
}

/// Checks the `Authorization` header against the current token. The admin
/// surface can rotate the token at runtime, so the check reads it per
/// request.
fn check_auth(manager: &Arc<RwLock<KeyManagerMock>>, header: Option<&str>) -> Result<(), Rejection> {
    let header = match header {
        Some(header) => header,
        None => return Err(unauthorized("No Authorization header found".to_string())),
    };
    let token = match header.strip_prefix("Bearer ") {
        Some(token) => token,
        None => return Err(unauthorized(format!("invalid auth header: {}", header))),
    };
    if token != manager.read().database().api_token() {
        return Err(unauthorized(format!("invalid auth token: {}", token)));
    }
    Ok(())
}

/// Creates the server, binding immediately and returning the bound address
/// together with the future that runs it.
pub fn serve(
    ctx: Arc<Context>,
    shutdown: impl Future<Output = ()> + Send + Sync + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>), Error> {
    let config = ctx.config.clone();
    let log = ctx.log.clone();

    let inner_ctx = ctx.clone();
    let ctx_filter = warp::any().map(move || inner_ctx.clone());

    let auth_manager = ctx.manager.clone();
    let auth = warp::header::optional::<String>("authorization")
        .and(warp::any().map(move || auth_manager.clone()))
        .and_then(
            |header: Option<String>, manager: Arc<RwLock<KeyManagerMock>>| async move {
                check_auth(&manager, header.as_deref()).map(|()| ())
            },
        )
        .untuple_one();

    let eth_v1 = warp::path("eth").and(warp::path("v1"));
    let admin = warp::path("admin");

    // GET eth/v1/keystores
    let get_keystores = eth_v1
        .and(warp::path("keystores"))
        .and(warp::path::end())
        .and(warp::get())
        .and(auth.clone())
        .and(ctx_filter.clone())
        .and_then(|ctx: Arc<Context>| async move {
            let data = ctx.manager.read().database().all_validators();
            Ok::<_, Rejection>(warp::reply::json(&ListKeystoresResponse { data }))
        });

    // POST eth/v1/keystores
    let post_keystores = eth_v1
        .and(warp::path("keystores"))
        .and(warp::path::end())
        .and(warp::post())
        .and(auth.clone())
        .and(warp::body::json())
        .and(ctx_filter.clone())
        .and_then(
            |body: ImportKeystoresRequest, ctx: Arc<Context>| async move {
                let keystores = body
                    .keystores
                    .iter()
                    .map(|json| {
                        serde_json::from_str::<Keystore>(json)
                            .map_err(|e| format!("error deserializing keystore: {}", e))
                    })
                    .collect::<Result<Vec<_>, String>>()
                    .map_err(custom_bad_request)?;

                let slashing_protection = body
                    .slashing_protection
                    .as_deref()
                    .map(|json| {
                        Interchange::from_json_str(json).map_err(|e| {
                            format!("error deserializing slashing protection: {}", e)
                        })
                    })
                    .transpose()
                    .map_err(custom_bad_request)?;

                let data = ctx.manager.write().database_mut().add_validators(
                    &keystores,
                    &body.passwords,
                    slashing_protection.as_ref(),
                );
                Ok::<_, Rejection>(warp::reply::json(&ImportKeystoresResponse { data }))
            },
        );

    // DELETE eth/v1/keystores
    let delete_keystores = eth_v1
        .and(warp::path("keystores"))
        .and(warp::path::end())
        .and(warp::delete())
        .and(auth.clone())
        .and(warp::body::json())
        .and(ctx_filter.clone())
        .and_then(
            |body: DeleteKeystoresRequest, ctx: Arc<Context>| async move {
                let (data, bundle) = ctx
                    .manager
                    .write()
                    .database_mut()
                    .delete_validators(&body.pubkeys);
                let slashing_protection = bundle.to_json_string().map_err(|e| {
                    warp_utils::reject::custom_server_error(format!(
                        "error serializing slashing protection: {}",
                        e
                    ))
                })?;
                Ok::<_, Rejection>(warp::reply::json(&DeleteKeystoresResponse {
                    data,
                    slashing_protection,
                }))
            },
        );

    // GET eth/v1/validator/{pubkey}/feerecipient
    let get_fee_recipient = eth_v1
        .and(warp::path("validator"))
        .and(warp::path::param::<String>())
        .and(warp::path("feerecipient"))
        .and(warp::path::end())
        .and(warp::get())
        .and(auth.clone())
        .and(ctx_filter.clone())
        .and_then(|pubkey: String, ctx: Arc<Context>| async move {
            let pubkey = parse_pubkey(&pubkey)?;
            let ethaddress = ctx.manager.read().database().fee_recipient(&pubkey);
            let data = GetFeeRecipientResponse { pubkey, ethaddress };
            Ok::<_, Rejection>(warp::reply::json(&GenericResponse::from(data)))
        });

    // POST eth/v1/validator/{pubkey}/feerecipient
    let post_fee_recipient = eth_v1
        .and(warp::path("validator"))
        .and(warp::path::param::<String>())
        .and(warp::path("feerecipient"))
        .and(warp::path::end())
        .and(warp::post())
        .and(auth.clone())
        .and(warp::body::json())
        .and(ctx_filter.clone())
        .and_then(
            |pubkey: String, body: SetFeeRecipientRequest, ctx: Arc<Context>| async move {
                let pubkey = parse_pubkey(&pubkey)?;
                let found = ctx
                    .manager
                    .write()
                    .database_mut()
                    .set_fee_recipient(&pubkey, body.ethaddress);
                if !found {
                    return Err(custom_bad_request("validator not found".to_string()));
                }
                Ok::<_, Rejection>(warp::reply::with_status(
                    warp::reply(),
                    StatusCode::ACCEPTED,
                ))
            },
        );

    // GET eth/v1/validator/{pubkey}/graffiti
    let get_graffiti = eth_v1
        .and(warp::path("validator"))
        .and(warp::path::param::<String>())
        .and(warp::path("graffiti"))
        .and(warp::path::end())
        .and(warp::get())
        .and(auth.clone())
        .and(ctx_filter.clone())
        .and_then(|pubkey: String, ctx: Arc<Context>| async move {
            let pubkey = parse_pubkey(&pubkey)?;
            let graffiti = ctx.manager.read().database().graffiti(&pubkey);
            let data = GetGraffitiResponse { pubkey, graffiti };
            Ok::<_, Rejection>(warp::reply::json(&GenericResponse::from(data)))
        });

    // POST eth/v1/validator/{pubkey}/graffiti
    let post_graffiti = eth_v1
        .and(warp::path("validator"))
        .and(warp::path::param::<String>())
        .and(warp::path("graffiti"))
        .and(warp::path::end())
        .and(warp::post())
        .and(auth)
        .and(warp::body::json())
        .and(ctx_filter.clone())
        .and_then(
            |pubkey: String, body: SetGraffitiRequest, ctx: Arc<Context>| async move {
                let pubkey = parse_pubkey(&pubkey)?;
                let found = ctx
                    .manager
                    .write()
                    .database_mut()
                    .set_graffiti(&pubkey, body.graffiti);
                if !found {
                    return Err(custom_bad_request("validator not found".to_string()));
                }
                Ok::<_, Rejection>(warp::reply::with_status(
                    warp::reply(),
                    StatusCode::ACCEPTED,
                ))
            },
        );

    // GET/POST admin/default-fee-recipient
    let admin_get_default_fee_recipient = admin
        .and(warp::path("default-fee-recipient"))
        .and(warp::path::end())
        .and(warp::get())
        .and(ctx_filter.clone())
        .and_then(|ctx: Arc<Context>| async move {
            let data = DefaultFeeRecipientData {
                fee_recipient: ctx.manager.read().database().default_fee_recipient(),
            };
            Ok::<_, Rejection>(warp::reply::json(&GenericResponse::from(data)))
        });
    let admin_set_default_fee_recipient = admin
        .and(warp::path("default-fee-recipient"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(ctx_filter.clone())
        .and_then(
            |body: DefaultFeeRecipientData, ctx: Arc<Context>| async move {
                ctx.manager
                    .write()
                    .database_mut()
                    .set_default_fee_recipient(body.fee_recipient);
                Ok::<_, Rejection>(warp::reply::json(&()))
            },
        );

    // GET/POST admin/default-graffiti
    let admin_get_default_graffiti = admin
        .and(warp::path("default-graffiti"))
        .and(warp::path::end())
        .and(warp::get())
        .and(ctx_filter.clone())
        .and_then(|ctx: Arc<Context>| async move {
            let data = DefaultGraffitiData {
                graffiti: ctx.manager.read().database().default_graffiti().to_string(),
            };
            Ok::<_, Rejection>(warp::reply::json(&GenericResponse::from(data)))
        });
    let admin_set_default_graffiti = admin
        .and(warp::path("default-graffiti"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(ctx_filter.clone())
        .and_then(|body: DefaultGraffitiData, ctx: Arc<Context>| async move {
            ctx.manager
                .write()
                .database_mut()
                .set_default_graffiti(body.graffiti);
            Ok::<_, Rejection>(warp::reply::json(&()))
        });

    // GET/POST admin/genesis-validators-root
    let admin_get_genesis_validators_root = admin
        .and(warp::path("genesis-validators-root"))
        .and(warp::path::end())
        .and(warp::get())
        .and(ctx_filter.clone())
        .and_then(|ctx: Arc<Context>| async move {
            let data = GenesisValidatorsRootData {
                genesis_validators_root: ctx.manager.read().database().genesis_validators_root(),
            };
            Ok::<_, Rejection>(warp::reply::json(&GenericResponse::from(data)))
        });
    let admin_set_genesis_validators_root = admin
        .and(warp::path("genesis-validators-root"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(ctx_filter.clone())
        .and_then(
            |body: GenesisValidatorsRootData, ctx: Arc<Context>| async move {
                ctx.manager
                    .write()
                    .database_mut()
                    .set_genesis_validators_root(body.genesis_validators_root);
                Ok::<_, Rejection>(warp::reply::json(&()))
            },
        );

    // GET/POST admin/api-token. This is the bootstrap: it is deliberately
    // unauthenticated.
    let admin_get_api_token = admin
        .and(warp::path("api-token"))
        .and(warp::path::end())
        .and(warp::get())
        .and(ctx_filter.clone())
        .and_then(|ctx: Arc<Context>| async move {
            let data = ApiTokenData {
                token: ctx.manager.read().database().api_token().to_string(),
            };
            Ok::<_, Rejection>(warp::reply::json(&GenericResponse::from(data)))
        });
    let admin_set_api_token = admin
        .and(warp::path("api-token"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(ctx_filter.clone())
        .and_then(|body: ApiTokenData, ctx: Arc<Context>| async move {
            ctx.manager.write().database_mut().set_api_token(body.token);
            Ok::<_, Rejection>(warp::reply::json(&()))
        });

    // GET admin/snapshot?name={name}
    let admin_snapshot = admin
        .and(warp::path("snapshot"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(ctx_filter.clone())
        .and_then(
            |query: HashMap<String, String>, ctx: Arc<Context>| async move {
                let name = query
                    .get("name")
                    .ok_or_else(|| custom_bad_request("missing snapshot name".to_string()))?;
                ctx.manager.write().take_snapshot(name);
                Ok::<_, Rejection>(warp::reply::json(&()))
            },
        );

    // GET admin/revert?name={name}
    let admin_revert = admin
        .and(warp::path("revert"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(ctx_filter)
        .and_then(
            |query: HashMap<String, String>, ctx: Arc<Context>| async move {
                let name = query
                    .get("name")
                    .ok_or_else(|| custom_bad_request("missing snapshot name".to_string()))?;
                ctx.manager
                    .write()
                    .revert_to_snapshot(name)
                    .map_err(custom_bad_request)?;
                Ok::<_, Rejection>(warp::reply::json(&()))
            },
        );

    let routes = get_keystores
        .or(post_keystores)
        .or(delete_keystores)
        .or(get_fee_recipient)
        .or(post_fee_recipient)
        .or(get_graffiti)
        .or(post_graffiti)
        .or(admin_get_default_fee_recipient)
        .or(admin_set_default_fee_recipient)
        .or(admin_get_default_graffiti)
        .or(admin_set_default_graffiti)
        .or(admin_get_genesis_validators_root)
        .or(admin_set_genesis_validators_root)
        .or(admin_get_api_token)
        .or(admin_set_api_token)
        .or(admin_snapshot)
        .or(admin_revert)
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
        "Key-manager mock HTTP server started";
        "listen_address" => listening_socket.to_string(),
    );

    Ok((listening_socket, server))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{KeyManagerOpts, DEFAULT_API_TOKEN};
    use api_types::{Address, DeleteKeystoreStatus, ErrorMessage, ImportKeystoreStatus};
    use futures::channel::oneshot;

    struct TestServer {
        base_url: String,
        client: reqwest::Client,
        _shutdown: oneshot::Sender<()>,
    }

    impl TestServer {
        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base_url, path)
        }

        fn bearer(&self) -> String {
            format!("Bearer {}", DEFAULT_API_TOKEN)
        }
    }

    fn spawn_server() -> TestServer {
        let manager = Arc::new(RwLock::new(KeyManagerMock::new(
            logging::null_logger(),
            KeyManagerOpts::default(),
        )));
        let ctx = Arc::new(Context {
            config: Config {
                listen_addr: Ipv4Addr::new(127, 0, 0, 1),
                listen_port: 0,
            },
            manager,
            log: logging::null_logger(),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (addr, server) = serve(ctx, async {
            let _ = shutdown_rx.await;
        })
        .unwrap();
        tokio::spawn(server);

        TestServer {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
            _shutdown: shutdown_tx,
        }
    }

    fn keystore_json(byte: u8) -> String {
        serde_json::to_string(&Keystore {
            pubkey: PublicKeyBytes::repeat_byte(byte),
            path: Some("m/12381/3600/0/0/0".to_string()),
            uuid: None,
            version: Some(4),
        })
        .unwrap()
    }

    async fn import_one(server: &TestServer, byte: u8) {
        let response = server
            .client
            .post(server.url("/eth/v1/keystores"))
            .header("Authorization", server.bearer())
            .json(&ImportKeystoresRequest {
                keystores: vec![keystore_json(byte)],
                passwords: vec!["password".to_string()],
                slashing_protection: None,
            })
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn auth_error_triplet() {
        let server = spawn_server();
        let url = server.url("/eth/v1/keystores");

        // Missing header.
        let response = server.client.get(&url).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 401);
        let error: ErrorMessage = response.json().await.unwrap();
        assert_eq!(error.message, "No Authorization header found");

        // Malformed header.
        let response = server
            .client
            .get(&url)
            .header("Authorization", "Basic abc")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 401);
        let error: ErrorMessage = response.json().await.unwrap();
        assert!(error.message.starts_with("invalid auth header"));

        // Wrong token.
        let response = server
            .client
            .get(&url)
            .header("Authorization", "Bearer wrong")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 401);
        let error: ErrorMessage = response.json().await.unwrap();
        assert!(error.message.starts_with("invalid auth token"));
    }

    #[tokio::test]
    async fn import_list_delete_flow() {
        let server = spawn_server();
        import_one(&server, 1).await;

        // Duplicate import reports per-keystore status.
        let response = server
            .client
            .post(server.url("/eth/v1/keystores"))
            .header("Authorization", server.bearer())
            .json(&ImportKeystoresRequest {
                keystores: vec![keystore_json(1), keystore_json(2)],
                passwords: vec!["a".to_string(), "b".to_string()],
                slashing_protection: None,
            })
            .send()
            .await
            .unwrap();
        let body: ImportKeystoresResponse = response.json().await.unwrap();
        assert_eq!(body.data[0].status, ImportKeystoreStatus::Duplicate);
        assert_eq!(body.data[1].status, ImportKeystoreStatus::Imported);

        let response = server
            .client
            .get(server.url("/eth/v1/keystores"))
            .header("Authorization", server.bearer())
            .send()
            .await
            .unwrap();
        let body: ListKeystoresResponse = response.json().await.unwrap();
        assert_eq!(body.data.len(), 2);
        assert!(!body.data[0].readonly);

        let response = server
            .client
            .delete(server.url("/eth/v1/keystores"))
            .header("Authorization", server.bearer())
            .json(&DeleteKeystoresRequest {
                pubkeys: vec![
                    PublicKeyBytes::repeat_byte(1),
                    PublicKeyBytes::repeat_byte(7),
                ],
            })
            .send()
            .await
            .unwrap();
        let body: DeleteKeystoresResponse = response.json().await.unwrap();
        assert_eq!(body.data[0].status, DeleteKeystoreStatus::Deleted);
        assert_eq!(body.data[1].status, DeleteKeystoreStatus::NotFound);
        let bundle = body.interchange().unwrap();
        assert_eq!(bundle.data.len(), 1);
    }

    #[tokio::test]
    async fn fee_recipient_get_and_set() {
        let server = spawn_server();
        import_one(&server, 1).await;
        let pubkey = PublicKeyBytes::repeat_byte(1);

        // Known validator gets its own value after a set.
        let response = server
            .client
            .post(server.url(&format!("/eth/v1/validator/{}/feerecipient", pubkey)))
            .header("Authorization", server.bearer())
            .json(&SetFeeRecipientRequest {
                ethaddress: Address::repeat_byte(0x77),
            })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 202);

        let response = server
            .client
            .get(server.url(&format!("/eth/v1/validator/{}/feerecipient", pubkey)))
            .header("Authorization", server.bearer())
            .send()
            .await
            .unwrap();
        let body: GenericResponse<GetFeeRecipientResponse> = response.json().await.unwrap();
        assert_eq!(body.data.ethaddress, Address::repeat_byte(0x77));

        // Unknown validators read the default but reject sets.
        let unknown = PublicKeyBytes::repeat_byte(9);
        let response = server
            .client
            .get(server.url(&format!("/eth/v1/validator/{}/feerecipient", unknown)))
            .header("Authorization", server.bearer())
            .send()
            .await
            .unwrap();
        let body: GenericResponse<GetFeeRecipientResponse> = response.json().await.unwrap();
        assert_eq!(body.data.ethaddress, Address::repeat_byte(0xfe));

        let response = server
            .client
            .post(server.url(&format!("/eth/v1/validator/{}/feerecipient", unknown)))
            .header("Authorization", server.bearer())
            .json(&SetFeeRecipientRequest {
                ethaddress: Address::repeat_byte(0x77),
            })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn admin_surface_is_unauthenticated() {
        let server = spawn_server();

        // Rotate the token through the bootstrap surface.
        let response = server
            .client
            .post(server.url("/admin/api-token"))
            .json(&ApiTokenData {
                token: "rotated".to_string(),
            })
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());

        // The old token no longer authenticates.
        let response = server
            .client
            .get(server.url("/eth/v1/keystores"))
            .header("Authorization", server.bearer())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 401);

        // The new one does.
        let response = server
            .client
            .get(server.url("/eth/v1/keystores"))
            .header("Authorization", "Bearer rotated")
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn admin_snapshot_and_revert() {
        let server = spawn_server();
        let snapshot_url = server.url("/admin/snapshot?name=clean");
        assert!(server
            .client
            .get(&snapshot_url)
            .send()
            .await
            .unwrap()
            .status()
            .is_success());

        import_one(&server, 1).await;

        assert!(server
            .client
            .get(server.url("/admin/revert?name=clean"))
            .send()
            .await
            .unwrap()
            .status()
            .is_success());

        let response = server
            .client
            .get(server.url("/eth/v1/keystores"))
            .header("Authorization", server.bearer())
            .send()
            .await
            .unwrap();
        let body: ListKeystoresResponse = response.json().await.unwrap();
        assert!(body.data.is_empty());

        // Unknown snapshots are a 400.
        let response = server
            .client
            .get(server.url("/admin/revert?name=missing"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn default_graffiti_applies_to_new_imports() {
        let server = spawn_server();

        server
            .client
            .post(server.url("/admin/default-graffiti"))
            .json(&DefaultGraffitiData {
                graffiti: "custom".to_string(),
            })
            .send()
            .await
            .unwrap();

        import_one(&server, 1).await;

        let pubkey = PublicKeyBytes::repeat_byte(1);
        let response = server
            .client
            .get(server.url(&format!("/eth/v1/validator/{}/graffiti", pubkey)))
            .header("Authorization", server.bearer())
            .send()
            .await
            .unwrap();
        let body: GenericResponse<GetGraffitiResponse> = response.json().await.unwrap();
        assert_eq!(body.data.graffiti, "custom");
    }
}
