use api_types::{Address, Hash256};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_CHAIN_ID: u64 = 0x4242;
pub const DEFAULT_SECONDS_PER_SLOT: u64 = 12;
pub const DEFAULT_SLOTS_PER_EPOCH: u64 = 32;
pub const DEFAULT_EPOCHS_PER_SYNC_COMMITTEE_PERIOD: u64 = 256;

/// Configuration of the mock chain.
///
/// Loadable from JSON or YAML, picked by file extension. A zero genesis time
/// is replaced with the current time (truncated to seconds) at load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub chain_id: u64,
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
    pub epochs_per_sync_committee_period: u64,
    pub deposit_contract: Address,

    /// Unix seconds. Zero means "unset".
    pub genesis_time: u64,
    #[serde(with = "serde_utils::bytes_4_hex")]
    pub genesis_fork_version: [u8; 4],
    pub genesis_validators_root: Hash256,

    #[serde(with = "serde_utils::bytes_4_hex")]
    pub altair_fork_version: [u8; 4],
    pub altair_fork_epoch: u64,
    #[serde(with = "serde_utils::bytes_4_hex")]
    pub bellatrix_fork_version: [u8; 4],
    pub bellatrix_fork_epoch: u64,
    #[serde(with = "serde_utils::bytes_4_hex")]
    pub capella_fork_version: [u8; 4],
    pub capella_fork_epoch: u64,
    #[serde(with = "serde_utils::bytes_4_hex")]
    pub deneb_fork_version: [u8; 4],
    pub deneb_fork_epoch: u64,

    /// The execution block index the first validated slot links to.
    pub first_execution_block_index: u64,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            seconds_per_slot: DEFAULT_SECONDS_PER_SLOT,
            slots_per_epoch: DEFAULT_SLOTS_PER_EPOCH,
            epochs_per_sync_committee_period: DEFAULT_EPOCHS_PER_SYNC_COMMITTEE_PERIOD,
            deposit_contract: Address::repeat_byte(0x42),
            genesis_time: now_truncated_to_seconds(),
            genesis_fork_version: [0x42, 0x00, 0x00, 0x00],
            genesis_validators_root: Hash256::repeat_byte(0x42),
            altair_fork_version: [0x42, 0x00, 0x00, 0x01],
            altair_fork_epoch: 0,
            bellatrix_fork_version: [0x42, 0x00, 0x00, 0x02],
            bellatrix_fork_epoch: 0,
            capella_fork_version: [0x42, 0x00, 0x00, 0x03],
            capella_fork_epoch: 0,
            deneb_fork_version: [0x42, 0x00, 0x00, 0x04],
            deneb_fork_epoch: 0,
            first_execution_block_index: 0,
        }
    }
}

impl BeaconConfig {
    /// Loads a config from a `.json`, `.yaml` or `.yml` file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| format!("error reading config file [{}]: {}", path.display(), e))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let mut config: BeaconConfig = match extension {
            "json" => serde_json::from_slice(&bytes).map_err(|e| {
                format!("error unmarshalling config file [{}]: {}", path.display(), e)
            })?,
            "yaml" | "yml" => serde_yaml::from_slice(&bytes).map_err(|e| {
                format!("error unmarshalling config file [{}]: {}", path.display(), e)
            })?,
            other => {
                return Err(format!(
                    "unsupported config file extension [{}] for [{}]",
                    other,
                    path.display()
                ))
            }
        };

        if config.genesis_time == 0 {
            config.genesis_time = now_truncated_to_seconds();
        }

        Ok(config)
    }
}

fn now_truncated_to_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_config() -> BeaconConfig {
        BeaconConfig {
            chain_id: 31337,
            genesis_time: 1_700_000_000,
            first_execution_block_index: 128,
            ..BeaconConfig::default()
        }
    }

    #[test]
    fn json_round_trip() {
        let config = sample_config();
        let json = serde_json::to_string(&config).unwrap();
        let restored: BeaconConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn yaml_round_trip() {
        let config = sample_config();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let restored: BeaconConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn load_json_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .unwrap();
        write!(
            file,
            "{}",
            serde_json::to_string(&sample_config()).unwrap()
        )
        .unwrap();

        let loaded = BeaconConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded, sample_config());
    }

    #[test]
    fn load_yaml_file_with_zero_genesis_time() {
        let config = BeaconConfig {
            genesis_time: 0,
            ..sample_config()
        };
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        write!(file, "{}", serde_yaml::to_string(&config).unwrap()).unwrap();

        let loaded = BeaconConfig::load_from_file(file.path()).unwrap();
        // The zero genesis time is substituted at load.
        assert!(loaded.genesis_time > 0);
        assert_eq!(loaded.chain_id, config.chain_id);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(BeaconConfig::load_from_file("/tmp/config.toml").is_err());
    }
}
