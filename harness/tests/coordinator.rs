//! End-to-end coordinator tests against the in-process mock dev node.

use api_types::{Hash256, PublicKeyBytes};
use harness::test_utils::{MockEvmServer, GENESIS_TIMESTAMP};
use harness::{HarnessModule, TestHarness};
use keymanager_mock::{KeyManagerMock, KeyManagerOpts};
use std::fs;
use std::io::Write;
use std::sync::{Arc, Mutex};

async fn build_harness(server: &MockEvmServer) -> TestHarness {
    TestHarness::new_with_endpoint(logging::null_logger(), &server.url())
        .await
        .unwrap()
}

fn write_compose_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
    write!(
        file,
        r#"
services:
  api:
    image: example/api:latest
    container_name: fixture-api
networks:
  internal: {{}}
"#
    )
    .unwrap();
    file
}

#[tokio::test]
async fn construction_derives_config_from_the_chain() {
    let server = MockEvmServer::spawn();

    // Put the chain in a non-trivial position first.
    {
        let client = harness::EvmRpcClient::new(&server.url()).unwrap();
        client.mine().await.unwrap();
        client.increase_time(7).await.unwrap();
        client.mine().await.unwrap();
    }

    let mut harness = build_harness(&server).await;

    {
        let beacon = harness.beacon();
        let beacon = beacon.read();
        let config = beacon.config();
        assert_eq!(config.chain_id, 31337);
        assert_eq!(config.first_execution_block_index, 2);
        assert_eq!(config.genesis_time, GENESIS_TIMESTAMP + 7);
    }
    assert_eq!(harness.chain_id(), 31337);

    // The first committed slot links to the observed block index.
    harness.commit_block().await.unwrap();
    {
        let beacon = harness.beacon();
        let beacon = beacon.read();
        assert_eq!(beacon.database().execution_block_for_slot(0), Some(2));
    }

    harness.close().await.unwrap();
}

#[tokio::test]
async fn revert_to_baseline_restores_every_module() {
    let server = MockEvmServer::spawn();
    let mut harness = build_harness(&server).await;
    let compose = write_compose_file();

    for _ in 0..3 {
        // Mutate the Beacon mock, the Docker mock, the filesystem and the
        // chain.
        harness
            .beacon()
            .write()
            .add_validator(PublicKeyBytes::repeat_byte(0x01), Hash256::zero())
            .unwrap();
        harness
            .docker()
            .write()
            .compose_up("fixture", &[compose.path()])
            .unwrap();
        let marker = harness.test_dir().unwrap().join("marker.txt");
        fs::write(&marker, b"dirty").unwrap();
        harness.commit_block().await.unwrap();

        harness.revert_to_baseline().await.unwrap();

        assert!(harness.beacon().read().database().validators().is_empty());
        assert_eq!(harness.beacon().read().current_slot(), 0);
        assert!(harness.docker().read().state().containers.is_empty());
        assert!(harness.docker().read().state().networks.is_empty());
        assert!(!marker.exists());

        let (block_number, _) = harness.rpc().latest_block().await.unwrap();
        assert_eq!(block_number, 0);
    }

    harness.close().await.unwrap();
}

#[tokio::test]
async fn custom_snapshots_survive_repeated_reverts() {
    let server = MockEvmServer::spawn();
    let mut harness = build_harness(&server).await;

    harness
        .beacon()
        .write()
        .add_validator(PublicKeyBytes::repeat_byte(0x01), Hash256::zero())
        .unwrap();
    let snapshot = harness.take_snapshot().await.unwrap();

    // Mutate past the snapshot, then revert twice. The second revert only
    // works because the coordinator re-snapshots the dev node on revert.
    harness.commit_block().await.unwrap();
    harness.revert_to_snapshot(&snapshot).await.unwrap();
    assert_eq!(harness.beacon().read().current_slot(), 0);

    harness.commit_block().await.unwrap();
    harness.commit_block().await.unwrap();
    harness.revert_to_snapshot(&snapshot).await.unwrap();

    assert_eq!(harness.beacon().read().current_slot(), 0);
    assert_eq!(harness.beacon().read().database().validators().len(), 1);
    let (block_number, _) = harness.rpc().latest_block().await.unwrap();
    assert_eq!(block_number, 0);

    assert!(harness.revert_to_snapshot("bogus").await.is_err());

    harness.close().await.unwrap();
}

#[tokio::test]
async fn commit_block_couples_both_chains() {
    let server = MockEvmServer::spawn();
    let mut harness = build_harness(&server).await;
    let seconds_per_slot = harness.beacon().read().config().seconds_per_slot;

    harness.commit_block().await.unwrap();
    harness.commit_block().await.unwrap();

    assert_eq!(harness.beacon().read().current_slot(), 2);
    let (block_number, timestamp) = harness.rpc().latest_block().await.unwrap();
    assert_eq!(block_number, 2);
    // The first mine happens before the first clock bump.
    assert_eq!(timestamp, GENESIS_TIMESTAMP + seconds_per_slot);

    harness.close().await.unwrap();
}

#[tokio::test]
async fn advance_slots_without_blocks_skips_mining() {
    let server = MockEvmServer::spawn();
    let mut harness = build_harness(&server).await;

    harness.advance_slots(5, false).await.unwrap();

    assert_eq!(harness.beacon().read().current_slot(), 5);
    let (block_number, _) = harness.rpc().latest_block().await.unwrap();
    assert_eq!(block_number, 0);

    // With blocks, each slot mines.
    harness.advance_slots(2, true).await.unwrap();
    assert_eq!(harness.beacon().read().current_slot(), 7);
    let (block_number, _) = harness.rpc().latest_block().await.unwrap();
    assert_eq!(block_number, 2);

    harness.close().await.unwrap();
}

/// A module that records every call it receives.
struct RecordingModule {
    name: String,
    snapshots: Arc<Mutex<Vec<String>>>,
    reverts: Arc<Mutex<Vec<String>>>,
    closes: Arc<Mutex<u32>>,
}

impl HarnessModule for RecordingModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<(), String> {
        *self.closes.lock().unwrap() += 1;
        Ok(())
    }

    fn take_snapshot(&mut self, name: &str) -> Result<String, String> {
        self.snapshots.lock().unwrap().push(name.to_string());
        Ok(name.to_string())
    }

    fn revert_to_snapshot(&mut self, name: &str) -> Result<(), String> {
        self.reverts.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn registered_modules_join_snapshots() {
    let server = MockEvmServer::spawn();
    let mut harness = build_harness(&server).await;

    let snapshots = Arc::new(Mutex::new(vec![]));
    let reverts = Arc::new(Mutex::new(vec![]));
    let closes = Arc::new(Mutex::new(0));

    // Registering a second module under the same name replaces the first;
    // only the replacement should see any calls.
    let orphan_snapshots = Arc::new(Mutex::new(vec![]));
    harness.register_module(Box::new(RecordingModule {
        name: "recorder".to_string(),
        snapshots: orphan_snapshots.clone(),
        reverts: Arc::new(Mutex::new(vec![])),
        closes: Arc::new(Mutex::new(0)),
    }));
    harness.register_module(Box::new(RecordingModule {
        name: "recorder".to_string(),
        snapshots: snapshots.clone(),
        reverts: reverts.clone(),
        closes: closes.clone(),
    }));

    let snapshot = harness.take_snapshot().await.unwrap();
    harness.revert_to_snapshot(&snapshot).await.unwrap();

    assert_eq!(*snapshots.lock().unwrap(), vec![snapshot.clone()]);
    assert_eq!(*reverts.lock().unwrap(), vec![snapshot.clone()]);
    assert!(orphan_snapshots.lock().unwrap().is_empty());

    // A key-manager mock also slots straight into the registry.
    harness.register_module(Box::new(KeyManagerMock::new(
        logging::null_logger(),
        KeyManagerOpts::default(),
    )));
    let second = harness.take_snapshot().await.unwrap();
    harness.revert_to_snapshot(&second).await.unwrap();

    harness.close().await.unwrap();
    assert_eq!(*closes.lock().unwrap(), 1);
}

#[tokio::test]
async fn simulating_an_unsynced_client() {
    let server = MockEvmServer::spawn();
    let mut harness = build_harness(&server).await;

    harness.commit_block().await.unwrap();
    harness.set_beacon_head_slot(14);

    let syncing = harness.beacon().read().syncing_data();
    assert!(syncing.is_syncing);
    assert_eq!(syncing.head_slot, 14);
    assert_eq!(syncing.sync_distance, 13);

    harness.close().await.unwrap();
}
