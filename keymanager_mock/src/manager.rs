use crate::database::{KeyManagerDatabase, KeyManagerOpts};
use slog::{info, Logger};
use std::collections::HashMap;

/// Wraps the key-manager database with a registry of named snapshots.
pub struct KeyManagerMock {
    name: String,
    database: KeyManagerDatabase,
    snapshots: HashMap<String, KeyManagerDatabase>,
    log: Logger,
}

impl KeyManagerMock {
    pub fn new(log: Logger, opts: KeyManagerOpts) -> Self {
        Self {
            name: "keymanager".to_string(),
            database: KeyManagerDatabase::new(opts),
            snapshots: HashMap::new(),
            log,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &KeyManagerDatabase {
        &self.database
    }

    pub fn database_mut(&mut self) -> &mut KeyManagerDatabase {
        &mut self.database
    }

    /// Swaps in a custom-provisioned database.
    pub fn set_database(&mut self, database: KeyManagerDatabase) {
        self.database = database;
    }

    /// Stores a deep clone of the database under `name`.
    pub fn take_snapshot(&mut self, name: &str) -> String {
        self.snapshots.insert(name.to_string(), self.database.clone());
        info!(self.log, "Took key-manager snapshot"; "name" => name);
        name.to_string()
    }

    /// Installs a clone of the named snapshot, leaving the stored copy
    /// revertible again later.
    pub fn revert_to_snapshot(&mut self, name: &str) -> Result<(), String> {
        let snapshot = self
            .snapshots
            .get(name)
            .ok_or_else(|| format!("snapshot [{}] does not exist", name))?;
        self.database = snapshot.clone();
        info!(self.log, "Reverted to key-manager snapshot"; "name" => name);
        Ok(())
    }

    /// Releases all state. Safe to call more than once.
    pub fn close(&mut self) {
        self.database = KeyManagerDatabase::new(KeyManagerOpts::default());
        self.snapshots.clear();
    }
}
