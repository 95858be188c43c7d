use crate::core::{ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, deserialize, serialize, sha256_digest};
use data_encoding::HEXLOWER;
use log::info;
use serde::{Deserialize, Serialize};

/// One record of the chain. Constructed once by mining, never mutated
/// afterwards; the previous-hash field is empty only for the genesis block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    timestamp: i64,
    pre_block_hash: Vec<u8>,
    hash: Vec<u8>,
    transactions: Vec<Transaction>,
    nonce: i64,
}

impl Block {
    pub fn new_block(pre_block_hash: Vec<u8>, transactions: &[Transaction]) -> Result<Block> {
        if transactions.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        let mut block = Block {
            timestamp: current_timestamp()?,
            pre_block_hash,
            hash: vec![],
            transactions: transactions.to_vec(),
            nonce: 0,
        };

        let pow = ProofOfWork::new_proof_of_work(block.clone());
        let (nonce, hash) = pow.run()?;
        block.nonce = nonce;
        block.hash = hash;
        info!(
            "Proof-of-work completed for block {}",
            HEXLOWER.encode(block.hash.as_slice())
        );

        Ok(block)
    }

    pub fn generate_genesis_block(transaction: &Transaction) -> Result<Block> {
        Block::new_block(vec![], &[transaction.clone()])
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.pre_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_hash_bytes(&self) -> Vec<u8> {
        self.hash.clone()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }

    pub fn is_genesis(&self) -> bool {
        self.pre_block_hash.is_empty()
    }

    /// Digest binding the block's transactions: the SHA-256 of every
    /// transaction id concatenated in order.
    pub fn hash_transactions(&self) -> Vec<u8> {
        let mut txhashs = vec![];
        for transaction in &self.transactions {
            txhashs.extend(transaction.get_id());
        }

        sha256_digest(txhashs.as_slice())
    }

    /// Copy of this block with a different nonce, for tamper tests.
    #[cfg(test)]
    pub fn with_nonce(mut self, nonce: i64) -> Block {
        self.nonce = nonce;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    fn coinbase() -> Transaction {
        let wallet = Wallet::new().unwrap();
        Transaction::new_coinbase_tx(&wallet.get_address()).unwrap()
    }

    #[test]
    fn test_empty_transaction_list_is_rejected() {
        assert!(Block::new_block(vec![], &[]).is_err());
    }

    #[test]
    fn test_genesis_block_has_empty_previous_hash() {
        let block = Block::generate_genesis_block(&coinbase()).unwrap();
        assert!(block.is_genesis());
        assert!(block.get_pre_block_hash().is_empty());
        assert_eq!(block.get_hash().len(), 32);
    }

    #[test]
    fn test_block_links_to_previous_hash() {
        let genesis = Block::generate_genesis_block(&coinbase()).unwrap();
        let next = Block::new_block(genesis.get_hash_bytes(), &[coinbase()]).unwrap();
        assert!(!next.is_genesis());
        assert_eq!(next.get_pre_block_hash(), genesis.get_hash());
    }

    #[test]
    fn test_serialization_round_trip() {
        let block = Block::generate_genesis_block(&coinbase()).unwrap();
        let bytes = block.serialize().unwrap();
        let decoded = Block::deserialize(&bytes).unwrap();
        assert_eq!(block, decoded);
    }

    #[test]
    fn test_hash_transactions_depends_on_tx_ids() {
        let block_a = Block::generate_genesis_block(&coinbase()).unwrap();
        let block_b = Block::generate_genesis_block(&coinbase()).unwrap();
        // Different coinbase ids, different digests.
        assert_ne!(block_a.hash_transactions(), block_b.hash_transactions());
    }
}
