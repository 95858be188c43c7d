//! Factories for ledger tests: temporary sled stores and throwaway wallets.

use crate::core::{Blockchain, Transaction};
use crate::error::Result;
use crate::wallet::Wallet;
use tempfile::TempDir;

/// Create a temporary directory for testing
pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| crate::error::BlockchainError::Io(e.to_string()))
}

/// Fresh ledger over temporary storage, with the wallet that owns the
/// genesis subsidy.
pub fn create_test_blockchain() -> Result<(Blockchain, Wallet, TempDir)> {
    let temp_dir = create_temp_dir()?;
    let db_path = temp_dir.path().join("test_ledger");

    let wallet = Wallet::new()?;
    let blockchain = Blockchain::create_blockchain(
        &wallet.get_address(),
        db_path.to_str().expect("temp path should be valid UTF-8"),
    )?;

    Ok((blockchain, wallet, temp_dir))
}

/// Signed spend from `wallet` to `to`, built against the current chain.
pub fn create_test_transaction(
    wallet: &Wallet,
    to: &str,
    amount: u64,
    blockchain: &Blockchain,
) -> Result<Transaction> {
    Transaction::new_utxo_transaction(wallet, to, amount, blockchain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProofOfWork;

    #[test]
    fn test_create_test_blockchain() {
        let (blockchain, _wallet, _temp_dir) = create_test_blockchain().unwrap();

        let blocks: Vec<_> = blockchain
            .iterator()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].is_genesis());
        assert!(ProofOfWork::validate(&blocks[0]));
    }

    #[test]
    fn test_create_test_transaction() {
        let (blockchain, wallet, _temp_dir) = create_test_blockchain().unwrap();
        let recipient = Wallet::new().unwrap();

        let tx =
            create_test_transaction(&wallet, &recipient.get_address(), 10, &blockchain).unwrap();
        assert!(blockchain.verify_transaction(&tx).unwrap());
    }
}
