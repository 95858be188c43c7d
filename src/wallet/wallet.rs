use crate::error::{BlockchainError, Result};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde::{Deserialize, Serialize};

const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;

/// An ECDSA P-256 key pair. The address is base58check over
/// version ‖ pub_key_hash ‖ checksum.
#[derive(Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = crate::utils::new_key_pair()?;
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .map_err(|e| {
                    BlockchainError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
                })?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(Wallet { pkcs8, public_key })
    }

    pub fn get_address(&self) -> String {
        let pub_key_hash = hash_pub_key(self.public_key.as_slice());
        let mut payload: Vec<u8> = vec![VERSION];
        payload.extend(pub_key_hash.as_slice());
        let checksum = checksum(payload.as_slice());
        payload.extend(checksum.as_slice());
        crate::utils::base58_encode(payload.as_slice())
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }
}

/// RIPEMD-160 of SHA-256 of the public key: the 20-byte spending identity.
pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let pub_key_sha256 = crate::utils::sha256_digest(pub_key);
    crate::utils::ripemd160_digest(pub_key_sha256.as_slice())
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = crate::utils::sha256_digest(payload);
    let second_sha = crate::utils::sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

pub fn validate_address(address: &str) -> bool {
    let payload = match crate::utils::base58_decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };
    if payload.len() < ADDRESS_CHECK_SUM_LEN + 1 {
        return false;
    }

    let actual_checksum = &payload[payload.len() - ADDRESS_CHECK_SUM_LEN..];
    let target_checksum = checksum(&payload[..payload.len() - ADDRESS_CHECK_SUM_LEN]);
    actual_checksum.eq(target_checksum.as_slice())
}

/// Derive the printable address for a raw public key hash.
pub fn convert_address(pub_hash_key: &[u8]) -> String {
    let mut payload: Vec<u8> = vec![VERSION];
    payload.extend(pub_hash_key);
    let checksum = checksum(payload.as_slice());
    payload.extend(checksum.as_slice());
    crate::utils::base58_encode(payload.as_slice())
}

/// Strip the version byte and checksum from a validated address, leaving
/// the public key hash.
pub fn address_to_pub_key_hash(address: &str) -> Result<Vec<u8>> {
    if !validate_address(address) {
        return Err(BlockchainError::InvalidAddress(address.to_string()));
    }
    let payload = crate::utils::base58_decode(address)?;
    Ok(payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_valid_base58check() {
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();
        assert!(validate_address(&address));
    }

    #[test]
    fn test_corrupted_address_fails_validation() {
        let wallet = Wallet::new().unwrap();
        let mut address = wallet.get_address();
        // Flip the leading character to break the checksum.
        let flipped = if address.starts_with('2') { "3" } else { "2" };
        address.replace_range(0..1, flipped);
        assert!(!validate_address(&address));
        assert!(!validate_address("not an address"));
    }

    #[test]
    fn test_address_round_trips_through_pub_key_hash() {
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();

        let pub_key_hash = address_to_pub_key_hash(&address).unwrap();
        assert_eq!(pub_key_hash, hash_pub_key(wallet.get_public_key()));
        assert_eq!(convert_address(&pub_key_hash), address);
    }

    #[test]
    fn test_pub_key_hash_is_twenty_bytes() {
        let wallet = Wallet::new().unwrap();
        assert_eq!(hash_pub_key(wallet.get_public_key()).len(), 20);
    }
}
