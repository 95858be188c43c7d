//! Wallet collaborator: key generation, base58check addresses, and the
//! file-backed wallet collection. The ledger core only consumes public key
//! hashes and raw key material from here.

#[allow(clippy::module_inception)]
pub mod wallet;
pub mod wallets;

pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet,
    ADDRESS_CHECK_SUM_LEN,
};
pub use wallets::Wallets;
