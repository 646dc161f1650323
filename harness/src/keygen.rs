//! Deterministic key derivation for test fixtures: EOA keys via BIP-32 and
//! BLS keys via EIP-2333/EIP-2334, both from one mnemonic.
//!
//! This is test tooling, not a wallet: derivation paths are simple indexed
//! templates and derived keys are cached for the generator's lifetime. BLS
//! secrets are returned as raw scalars; nothing here signs anything.

use bip39::{Language, Mnemonic, Seed};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use num_bigint::BigUint;
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;

/// The ubiquitous development mnemonic, matching the accounts a stock dev
/// node funds at genesis.
pub const DEFAULT_MNEMONIC: &str =
    "test test test test test test test test test test test junk";

/// `{}` is replaced with the key index.
pub const DEFAULT_ETH_DERIVATION_PATH: &str = "m/44'/60'/0'/0/{}";
pub const DEFAULT_BLS_DERIVATION_PATH: &str = "m/12381/3600/{}/0/0";

/// The BLS12-381 curve order, the modulus of EIP-2333 secrets.
const BLS_CURVE_ORDER_HEX: &[u8] =
    b"73eda753299d7d483339d80809a1d80553bda402fffe5bfeffffffff00000001";

type HmacSha512 = Hmac<Sha512>;

/// Derives EOA and BLS private keys from a mnemonic plus indexed derivation
/// paths.
pub struct KeyGenerator {
    seed: Vec<u8>,
    eth_derivation_path: String,
    bls_derivation_path: String,
    eth_keys: HashMap<u32, SecretKey>,
    bls_keys: HashMap<u32, [u8; 32]>,
}

impl KeyGenerator {
    pub fn new(
        mnemonic: &str,
        eth_derivation_path: &str,
        bls_derivation_path: &str,
    ) -> Result<Self, String> {
        let mnemonic = Mnemonic::from_phrase(mnemonic, Language::English)
            .map_err(|e| format!("invalid mnemonic: {}", e))?;
        let seed = Seed::new(&mnemonic, "");

        Ok(Self {
            seed: seed.as_bytes().to_vec(),
            eth_derivation_path: eth_derivation_path.to_string(),
            bls_derivation_path: bls_derivation_path.to_string(),
            eth_keys: HashMap::new(),
            bls_keys: HashMap::new(),
        })
    }

    pub fn with_defaults() -> Result<Self, String> {
        Self::new(
            DEFAULT_MNEMONIC,
            DEFAULT_ETH_DERIVATION_PATH,
            DEFAULT_BLS_DERIVATION_PATH,
        )
    }

    /// The EOA private key at `index` of the eth derivation path.
    pub fn eth_private_key(&mut self, index: u32) -> Result<SecretKey, String> {
        if let Some(key) = self.eth_keys.get(&index) {
            return Ok(*key);
        }

        let path = parse_derivation_path(&self.eth_derivation_path.replacen("{}", &index.to_string(), 1))?;
        let key = derive_bip32(&self.seed, &path)?;
        self.eth_keys.insert(index, key);
        Ok(key)
    }

    /// The BLS private key at `index` of the BLS derivation path, as a
    /// big-endian scalar.
    pub fn bls_private_key(&mut self, index: u32) -> Result<[u8; 32], String> {
        if let Some(key) = self.bls_keys.get(&index) {
            return Ok(*key);
        }

        let path = parse_derivation_path(&self.bls_derivation_path.replacen("{}", &index.to_string(), 1))?;
        let mut key = hkdf_mod_r(&self.seed)?;
        for component in path {
            // EIP-2333 has no hardened notion; components are plain indices.
            key = derive_bls_child(&key, component & !HARDENED_FLAG)?;
        }
        self.bls_keys.insert(index, key);
        Ok(key)
    }
}

const HARDENED_FLAG: u32 = 1 << 31;

/// Parses `m/44'/60'/0'/0/5` into child indices, with `'` marking hardened
/// derivation.
fn parse_derivation_path(path: &str) -> Result<Vec<u32>, String> {
    let mut parts = path.split('/');
    if parts.next() != Some("m") {
        return Err(format!("derivation path [{}] must start with m/", path));
    }

    parts
        .map(|part| {
            let (digits, hardened) = match part.strip_suffix('\'') {
                Some(digits) => (digits, true),
                None => (part, false),
            };
            let index: u32 = digits
                .parse()
                .map_err(|e| format!("invalid path component [{}]: {}", part, e))?;
            if index >= HARDENED_FLAG {
                return Err(format!("path component [{}] is out of range", part));
            }
            Ok(if hardened { index | HARDENED_FLAG } else { index })
        })
        .collect()
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut mac = HmacSha512::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// BIP-32 private derivation over secp256k1.
fn derive_bip32(seed: &[u8], path: &[u32]) -> Result<SecretKey, String> {
    let secp = Secp256k1::new();

    let master = hmac_sha512(b"Bitcoin seed", seed);
    let mut key = SecretKey::from_slice(&master[..32])
        .map_err(|e| format!("invalid master key: {}", e))?;
    let mut chain_code = master[32..].to_vec();

    for &index in path {
        let mut data = Vec::with_capacity(37);
        if index & HARDENED_FLAG != 0 {
            data.push(0);
            data.extend_from_slice(&key.secret_bytes());
        } else {
            data.extend_from_slice(&PublicKey::from_secret_key(&secp, &key).serialize());
        }
        data.extend_from_slice(&index.to_be_bytes());

        let derived = hmac_sha512(&chain_code, &data);
        let tweak_bytes: [u8; 32] = derived[..32]
            .try_into()
            .expect("HMAC-SHA512 output is 64 bytes");
        let tweak = Scalar::from_be_bytes(tweak_bytes)
            .map_err(|e| format!("invalid child key tweak: {}", e))?;
        key = key
            .add_tweak(&tweak)
            .map_err(|e| format!("invalid child key at index {}: {}", index, e))?;
        chain_code = derived[32..].to_vec();
    }

    Ok(key)
}

/// EIP-2333 `HKDF_mod_r`.
fn hkdf_mod_r(ikm: &[u8]) -> Result<[u8; 32], String> {
    let order = BigUint::parse_bytes(BLS_CURVE_ORDER_HEX, 16)
        .expect("the curve order constant parses");

    let mut ikm_with_postfix = ikm.to_vec();
    ikm_with_postfix.push(0);

    let mut salt: Vec<u8> = b"BLS-SIG-KEYGEN-SALT-".to_vec();
    loop {
        salt = Sha256::digest(&salt).to_vec();

        let hkdf = Hkdf::<Sha256>::new(Some(&salt), &ikm_with_postfix);
        let mut okm = [0u8; 48];
        // info = key_info (empty) || I2OSP(L = 48, 2)
        hkdf.expand(&[0x00, 0x30], &mut okm)
            .map_err(|e| format!("HKDF expand failed: {}", e))?;

        let secret = BigUint::from_bytes_be(&okm) % &order;
        if secret != BigUint::default() {
            let bytes = secret.to_bytes_be();
            let mut padded = [0u8; 32];
            padded[32 - bytes.len()..].copy_from_slice(&bytes);
            return Ok(padded);
        }
    }
}

/// EIP-2333 parent-to-child derivation via the compressed lamport PK.
fn derive_bls_child(parent: &[u8; 32], index: u32) -> Result<[u8; 32], String> {
    let lamport_pk = parent_to_lamport_pk(parent, index)?;
    hkdf_mod_r(&lamport_pk)
}

fn parent_to_lamport_pk(parent: &[u8; 32], index: u32) -> Result<[u8; 32], String> {
    let salt = index.to_be_bytes();
    let not_parent: Vec<u8> = parent.iter().map(|byte| !byte).collect();

    let mut hasher = Sha256::new();
    for ikm in [&parent[..], &not_parent[..]] {
        let hkdf = Hkdf::<Sha256>::new(Some(&salt), ikm);
        let mut okm = vec![0u8; 255 * 32];
        hkdf.expand(&[], &mut okm)
            .map_err(|e| format!("HKDF expand failed: {}", e))?;
        for chunk in okm.chunks(32) {
            hasher.update(Sha256::digest(chunk));
        }
    }
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eth_keys_match_the_stock_dev_accounts() {
        let mut generator = KeyGenerator::with_defaults().unwrap();

        // The first two accounts every dev-node user knows by heart.
        assert_eq!(
            hex::encode(generator.eth_private_key(0).unwrap().secret_bytes()),
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
        );
        assert_eq!(
            hex::encode(generator.eth_private_key(1).unwrap().secret_bytes()),
            "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
        );
    }

    #[test]
    fn bls_derivation_matches_the_reference_vector() {
        // Test case 0 from EIP-2333.
        let seed = hex::decode(
            "c55257c360c07c72029aebc1b53c05ed0362ada38ead3e3e9efa3708e5349553\
             1f09a6987599d18264c1e1c92f2cf141630c7a3c4ab7c81b2f001698e7463b04",
        )
        .unwrap();

        let master = hkdf_mod_r(&seed).unwrap();
        assert_eq!(
            BigUint::from_bytes_be(&master).to_string(),
            "6083874454709270928345386274498605044986640685124978867557563392430687146096"
        );

        let child = derive_bls_child(&master, 0).unwrap();
        assert_eq!(
            BigUint::from_bytes_be(&child).to_string(),
            "20397789859736650942317412262472558107875392172444076792671091975210932703118"
        );
    }

    #[test]
    fn keys_are_deterministic_and_distinct() {
        let mut a = KeyGenerator::with_defaults().unwrap();
        let mut b = KeyGenerator::with_defaults().unwrap();

        assert_eq!(a.bls_private_key(3).unwrap(), b.bls_private_key(3).unwrap());
        assert_ne!(a.bls_private_key(3).unwrap(), a.bls_private_key(4).unwrap());
        assert_eq!(a.eth_private_key(2).unwrap(), b.eth_private_key(2).unwrap());
        assert_ne!(a.eth_private_key(2).unwrap(), a.eth_private_key(3).unwrap());

        // The cache returns the same key on repeat lookups.
        assert_eq!(a.eth_private_key(2).unwrap(), a.eth_private_key(2).unwrap());
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert!(KeyGenerator::new(
            "definitely not a mnemonic",
            DEFAULT_ETH_DERIVATION_PATH,
            DEFAULT_BLS_DERIVATION_PATH
        )
        .is_err());

        assert!(parse_derivation_path("44'/60'/0'/0/0").is_err());
        assert!(parse_derivation_path("m/44'/abc/0").is_err());
        assert_eq!(
            parse_derivation_path("m/44'/60'/0'/0/5").unwrap(),
            vec![
                44 | HARDENED_FLAG,
                60 | HARDENED_FLAG,
                HARDENED_FLAG,
                0,
                5
            ]
        );
    }
}
