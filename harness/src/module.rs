//! The capability every snapshot-bearing subsystem implements.

use crate::filesystem::FilesystemManager;
use beacon_mock::BeaconMockManager;
use docker_mock::DockerMock;
use keymanager_mock::KeyManagerMock;

/// A module the test harness can snapshot and revert as part of a
/// coordinator-level snapshot.
///
/// The harness chooses the snapshot name (all modules share one id per
/// coordinator snapshot); the module returns whatever identifier it actually
/// stored the snapshot under, which is usually the same name.
pub trait HarnessModule {
    /// A stable human-readable name. Registering a second module under the
    /// same name replaces the first.
    fn name(&self) -> &str;

    /// Releases the module's resources. Must be safe to call repeatedly.
    fn close(&mut self) -> Result<(), String>;

    /// Stores a snapshot under `name`, returning the module's identifier for
    /// it.
    fn take_snapshot(&mut self, name: &str) -> Result<String, String>;

    /// Restores the state stored under `name`. The snapshot must remain
    /// revertible again afterwards.
    fn revert_to_snapshot(&mut self, name: &str) -> Result<(), String>;
}

impl HarnessModule for BeaconMockManager {
    fn name(&self) -> &str {
        BeaconMockManager::name(self)
    }

    fn close(&mut self) -> Result<(), String> {
        BeaconMockManager::close(self);
        Ok(())
    }

    fn take_snapshot(&mut self, name: &str) -> Result<String, String> {
        Ok(BeaconMockManager::take_snapshot(self, name))
    }

    fn revert_to_snapshot(&mut self, name: &str) -> Result<(), String> {
        BeaconMockManager::revert_to_snapshot(self, name)
    }
}

impl HarnessModule for DockerMock {
    fn name(&self) -> &str {
        DockerMock::name(self)
    }

    fn close(&mut self) -> Result<(), String> {
        DockerMock::close(self);
        Ok(())
    }

    fn take_snapshot(&mut self, name: &str) -> Result<String, String> {
        Ok(DockerMock::take_snapshot(self, name))
    }

    fn revert_to_snapshot(&mut self, name: &str) -> Result<(), String> {
        DockerMock::revert_to_snapshot(self, name)
    }
}

impl HarnessModule for KeyManagerMock {
    fn name(&self) -> &str {
        KeyManagerMock::name(self)
    }

    fn close(&mut self) -> Result<(), String> {
        KeyManagerMock::close(self);
        Ok(())
    }

    fn take_snapshot(&mut self, name: &str) -> Result<String, String> {
        Ok(KeyManagerMock::take_snapshot(self, name))
    }

    fn revert_to_snapshot(&mut self, name: &str) -> Result<(), String> {
        KeyManagerMock::revert_to_snapshot(self, name)
    }
}

impl HarnessModule for FilesystemManager {
    fn name(&self) -> &str {
        FilesystemManager::name(self)
    }

    fn close(&mut self) -> Result<(), String> {
        FilesystemManager::close(self)
    }

    fn take_snapshot(&mut self, name: &str) -> Result<String, String> {
        FilesystemManager::take_named_snapshot(self, name)
    }

    fn revert_to_snapshot(&mut self, name: &str) -> Result<(), String> {
        FilesystemManager::revert_to_snapshot(self, name)
    }
}
