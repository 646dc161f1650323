//! An in-process mock of an execution-layer dev node, far enough for the
//! harness's own tests to run without a real node.
//!
//! Implements the JSON-RPC methods the coordinator drives, including the
//! dev-node quirk the coordinator has to compensate for: reverting to a
//! snapshot deletes it (and every snapshot taken after it).

use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use warp::Filter;

pub const DEFAULT_CHAIN_ID: u64 = 31337;
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvmBlock {
    pub number: u64,
    pub timestamp: u64,
}

/// The mock node's chain state.
#[derive(Debug, Clone)]
pub struct EvmState {
    pub chain_id: u64,
    pub blocks: Vec<EvmBlock>,
    pub clock: u64,
    next_snapshot_id: u64,
    snapshots: HashMap<String, (Vec<EvmBlock>, u64)>,
}

impl EvmState {
    fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            blocks: vec![EvmBlock {
                number: 0,
                timestamp: GENESIS_TIMESTAMP,
            }],
            clock: GENESIS_TIMESTAMP,
            next_snapshot_id: 1,
            snapshots: HashMap::new(),
        }
    }

    pub fn latest_block(&self) -> EvmBlock {
        *self.blocks.last().expect("the chain always has a genesis block")
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    fn take_snapshot(&mut self) -> String {
        let id = format!("0x{:x}", self.next_snapshot_id);
        self.next_snapshot_id += 1;
        self.snapshots
            .insert(id.clone(), (self.blocks.clone(), self.clock));
        id
    }

    /// Reverting consumes the snapshot, like a real dev node.
    fn revert(&mut self, id: &str) -> bool {
        match self.snapshots.remove(id) {
            None => false,
            Some((blocks, clock)) => {
                self.blocks = blocks;
                self.clock = clock;
                true
            }
        }
    }

    fn mine(&mut self) {
        let next = EvmBlock {
            number: self.latest_block().number + 1,
            timestamp: self.clock,
        };
        self.blocks.push(next);
    }
}

/// A running mock node bound to an OS-assigned localhost port.
pub struct MockEvmServer {
    addr: SocketAddr,
    state: Arc<RwLock<EvmState>>,
    _shutdown: futures::channel::oneshot::Sender<()>,
}

impl MockEvmServer {
    /// Spawns the server onto the current tokio runtime.
    pub fn spawn() -> Self {
        Self::spawn_with_chain_id(DEFAULT_CHAIN_ID)
    }

    pub fn spawn_with_chain_id(chain_id: u64) -> Self {
        let state = Arc::new(RwLock::new(EvmState::new(chain_id)));

        let handler_state = state.clone();
        let route = warp::post()
            .and(warp::path::end())
            .and(warp::body::json())
            .map(move |body: Value| {
                let response = match handle_rpc(&handler_state, &body) {
                    Ok(result) => json!({
                        "jsonrpc": "2.0",
                        "id": body.get("id").cloned().unwrap_or(Value::Null),
                        "result": result,
                    }),
                    Err(message) => json!({
                        "jsonrpc": "2.0",
                        "id": body.get("id").cloned().unwrap_or(Value::Null),
                        "error": { "code": -32000, "message": message },
                    }),
                };
                warp::reply::json(&response)
            });

        let (shutdown_tx, shutdown_rx) = futures::channel::oneshot::channel::<()>();
        let (addr, server) = warp::serve(route)
            .bind_with_graceful_shutdown(
                SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 0),
                async {
                    let _ = shutdown_rx.await;
                },
            );
        tokio::spawn(server);

        Self {
            addr,
            state,
            _shutdown: shutdown_tx,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> Arc<RwLock<EvmState>> {
        self.state.clone()
    }
}

fn handle_rpc(state: &Arc<RwLock<EvmState>>, body: &Value) -> Result<Value, String> {
    let method = body
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing/invalid method field".to_string())?;
    let params = body.get("params").cloned().unwrap_or(json!([]));

    match method {
        "eth_chainId" => Ok(json!(format!("0x{:x}", state.read().chain_id))),
        "eth_blockNumber" => Ok(json!(format!("0x{:x}", state.read().latest_block().number))),
        "eth_getBlockByNumber" => {
            let tag = params
                .get(0)
                .and_then(Value::as_str)
                .ok_or_else(|| "missing/invalid params[0] value".to_string())?;
            if tag != "latest" {
                return Err(format!("the tag {} is not supported", tag));
            }
            let block = state.read().latest_block();
            Ok(json!({
                "number": format!("0x{:x}", block.number),
                "timestamp": format!("0x{:x}", block.timestamp),
                "hash": format!("0x{:064x}", block.number),
            }))
        }
        "evm_snapshot" => Ok(json!(state.write().take_snapshot())),
        "evm_revert" => {
            let id = params
                .get(0)
                .and_then(Value::as_str)
                .ok_or_else(|| "missing/invalid params[0] value".to_string())?;
            Ok(json!(state.write().revert(id)))
        }
        "evm_mine" => {
            state.write().mine();
            Ok(json!("0x0"))
        }
        "evm_increaseTime" => {
            let seconds = params
                .get(0)
                .and_then(Value::as_u64)
                .ok_or_else(|| "missing/invalid params[0] value".to_string())?;
            let mut state = state.write();
            state.clock += seconds;
            Ok(json!(seconds))
        }
        other => Err(format!("the method {} does not exist/is not available", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution_rpc::EvmRpcClient;

    #[tokio::test]
    async fn serves_chain_metadata() {
        let server = MockEvmServer::spawn();
        let client = EvmRpcClient::new(&server.url()).unwrap();

        assert_eq!(client.chain_id().await.unwrap(), DEFAULT_CHAIN_ID);
        let (number, timestamp) = client.latest_block().await.unwrap();
        assert_eq!(number, 0);
        assert_eq!(timestamp, GENESIS_TIMESTAMP);
    }

    #[tokio::test]
    async fn mining_and_time_travel() {
        let server = MockEvmServer::spawn();
        let client = EvmRpcClient::new(&server.url()).unwrap();

        client.mine().await.unwrap();
        client.increase_time(12).await.unwrap();
        client.mine().await.unwrap();

        let (number, timestamp) = client.latest_block().await.unwrap();
        assert_eq!(number, 2);
        assert_eq!(timestamp, GENESIS_TIMESTAMP + 12);
    }

    #[tokio::test]
    async fn snapshots_are_consumed_on_revert() {
        let server = MockEvmServer::spawn();
        let client = EvmRpcClient::new(&server.url()).unwrap();

        let id = client.snapshot().await.unwrap();
        client.mine().await.unwrap();

        assert!(client.revert(&id).await.unwrap());
        let (number, _) = client.latest_block().await.unwrap();
        assert_eq!(number, 0);

        // Reverting to the same id again fails: the snapshot is gone.
        assert!(!client.revert(&id).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_snapshots_return_false() {
        let server = MockEvmServer::spawn();
        let client = EvmRpcClient::new(&server.url()).unwrap();

        let reverted = client.revert("0xff").await.unwrap();
        assert!(!reverted);
    }
}
