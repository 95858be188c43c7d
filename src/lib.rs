//! # emberchain
//!
//! A minimal cryptocurrency engine: an append-only, hash-linked ledger of
//! UTXO transactions, gated by a fixed-difficulty proof-of-work puzzle and
//! persisted in an embedded sled database.
//!
//! - `core/`: blocks, transactions, the chain, proof-of-work
//! - `wallet/`: ECDSA P-256 keys, base58check addresses
//! - `config/`: environment-driven runtime settings
//! - `utils/`: digests, encodings, serialization layer
//! - `cli/`: command definitions for the binary
//!
//! There is no networking, no mempool, and no fork choice; one process owns
//! the ledger and appends to it directly.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    Block, Blockchain, BlockchainIterator, ProofOfWork, TXInput, TXOutput, Transaction,
    COINBASE_VOUT, MINING_DIFFICULTY, SUBSIDY,
};
pub use error::{BlockchainError, Result};
pub use utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, ripemd160_digest, sha256_digest,
};
pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet, Wallets,
    ADDRESS_CHECK_SUM_LEN,
};
