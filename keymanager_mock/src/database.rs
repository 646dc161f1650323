use api_types::{
    Address, DeleteKeystoreStatus, Hash256, ImportKeystoreStatus, Interchange, InterchangeData,
    Keystore, PublicKeyBytes, SingleKeystoreResponse, Status,
};
use std::collections::BTreeMap;

pub const DEFAULT_GRAFFITI: &str = "drydock";
pub const DEFAULT_API_TOKEN: &str = "drydock-api-token-0123456789abcdef";

/// A validator known to the key manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorRecord {
    pub pubkey: PublicKeyBytes,
    pub derivation_path: Option<String>,
    pub fee_recipient: Address,
    pub graffiti: String,
    pub slashing_protection: Interchange,
}

/// Construction options; unset fields fall back to the defaults above.
#[derive(Debug, Clone, Default)]
pub struct KeyManagerOpts {
    pub default_fee_recipient: Option<Address>,
    pub default_graffiti: Option<String>,
    pub genesis_validators_root: Option<Hash256>,
    pub api_token: Option<String>,
}

/// The key-manager model: pubkey-keyed validator records plus process-wide
/// defaults. Cloning produces a fully independent copy.
#[derive(Debug, Clone)]
pub struct KeyManagerDatabase {
    keys: BTreeMap<PublicKeyBytes, ValidatorRecord>,

    default_fee_recipient: Address,
    default_graffiti: String,
    genesis_validators_root: Hash256,
    api_token: String,
}

impl KeyManagerDatabase {
    pub fn new(opts: KeyManagerOpts) -> Self {
        Self {
            keys: BTreeMap::new(),
            default_fee_recipient: opts
                .default_fee_recipient
                .unwrap_or_else(|| Address::repeat_byte(0xfe)),
            default_graffiti: opts
                .default_graffiti
                .unwrap_or_else(|| DEFAULT_GRAFFITI.to_string()),
            genesis_validators_root: opts
                .genesis_validators_root
                .unwrap_or_else(|| Hash256::repeat_byte(0x42)),
            api_token: opts
                .api_token
                .unwrap_or_else(|| DEFAULT_API_TOKEN.to_string()),
        }
    }

    /*
     * Defaults & token
     */

    pub fn default_fee_recipient(&self) -> Address {
        self.default_fee_recipient
    }

    pub fn set_default_fee_recipient(&mut self, address: Address) {
        self.default_fee_recipient = address;
    }

    pub fn default_graffiti(&self) -> &str {
        &self.default_graffiti
    }

    pub fn set_default_graffiti(&mut self, graffiti: String) {
        self.default_graffiti = graffiti;
    }

    pub fn genesis_validators_root(&self) -> Hash256 {
        self.genesis_validators_root
    }

    pub fn set_genesis_validators_root(&mut self, root: Hash256) {
        self.genesis_validators_root = root;
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    pub fn set_api_token(&mut self, token: String) {
        self.api_token = token;
    }

    /*
     * Keystores
     */

    /// Imports keystores, assigning defaults to each new validator. The
    /// slashing-protection record for a pubkey is pulled from the supplied
    /// bundle when present, otherwise synthesized empty.
    pub fn add_validators(
        &mut self,
        keystores: &[Keystore],
        _passwords: &[String],
        slashing_protection: Option<&Interchange>,
    ) -> Vec<Status<ImportKeystoreStatus>> {
        keystores
            .iter()
            .map(|keystore| {
                let pubkey = keystore.pubkey;
                if self.keys.contains_key(&pubkey) {
                    return Status::ok(ImportKeystoreStatus::Duplicate);
                }

                let matching_records: Vec<InterchangeData> = slashing_protection
                    .map(|bundle| {
                        bundle
                            .data
                            .iter()
                            .filter(|data| data.pubkey == pubkey)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();

                let slashing_protection = if matching_records.is_empty() {
                    Interchange::for_pubkey(self.genesis_validators_root, pubkey)
                } else {
                    Interchange {
                        data: matching_records,
                        ..Interchange::empty(self.genesis_validators_root)
                    }
                };

                self.keys.insert(
                    pubkey,
                    ValidatorRecord {
                        pubkey,
                        derivation_path: keystore.path.clone(),
                        fee_recipient: self.default_fee_recipient,
                        graffiti: self.default_graffiti.clone(),
                        slashing_protection,
                    },
                );
                Status::ok(ImportKeystoreStatus::Imported)
            })
            .collect()
    }

    /// Deletes validators, returning per-key statuses and the aggregated
    /// slashing-protection bundle of the deleted keys.
    pub fn delete_validators(
        &mut self,
        pubkeys: &[PublicKeyBytes],
    ) -> (Vec<Status<DeleteKeystoreStatus>>, Interchange) {
        let mut aggregated = Interchange::empty(self.genesis_validators_root);

        let statuses = pubkeys
            .iter()
            .map(|pubkey| match self.keys.remove(pubkey) {
                None => Status::ok(DeleteKeystoreStatus::NotFound),
                Some(record) => {
                    aggregated.data.extend(record.slashing_protection.data);
                    Status::ok(DeleteKeystoreStatus::Deleted)
                }
            })
            .collect();

        (statuses, aggregated)
    }

    pub fn all_validators(&self) -> Vec<SingleKeystoreResponse> {
        self.keys
            .values()
            .map(|record| SingleKeystoreResponse {
                validating_pubkey: record.pubkey,
                derivation_path: record.derivation_path.clone(),
                readonly: false,
            })
            .collect()
    }

    pub fn validator(&self, pubkey: &PublicKeyBytes) -> Option<&ValidatorRecord> {
        self.keys.get(pubkey)
    }

    /*
     * Fee recipients & graffiti
     */

    /// The validator's fee recipient, or the default for unknown validators.
    pub fn fee_recipient(&self, pubkey: &PublicKeyBytes) -> Address {
        self.keys
            .get(pubkey)
            .map(|record| record.fee_recipient)
            .unwrap_or(self.default_fee_recipient)
    }

    /// Updates a validator's fee recipient. Returns whether it was found.
    pub fn set_fee_recipient(&mut self, pubkey: &PublicKeyBytes, address: Address) -> bool {
        match self.keys.get_mut(pubkey) {
            Some(record) => {
                record.fee_recipient = address;
                true
            }
            None => false,
        }
    }

    pub fn graffiti(&self, pubkey: &PublicKeyBytes) -> String {
        self.keys
            .get(pubkey)
            .map(|record| record.graffiti.clone())
            .unwrap_or_else(|| self.default_graffiti.clone())
    }

    pub fn set_graffiti(&mut self, pubkey: &PublicKeyBytes, graffiti: String) -> bool {
        match self.keys.get_mut(pubkey) {
            Some(record) => {
                record.graffiti = graffiti;
                true
            }
            None => false,
        }
    }
}
