// The ledger: a hash-linked chain of blocks stored in sled, with a single
// mutable pointer (the tip hash) and UTXO queries answered by replaying
// history backward from the tip.

use crate::core::{Block, TXOutput, Transaction};
use crate::error::{BlockchainError, Result};
use data_encoding::HEXLOWER;
use log::info;
use sled::{Db, Tree};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

const TIP_BLOCK_HASH_KEY: &str = "tip_block_hash";
const BLOCKS_TREE: &str = "blocks";

const GENESIS_NOTE: &str = "Genesis block reward";

#[derive(Clone, Debug)]
pub struct Blockchain {
    tip_hash: Arc<RwLock<Vec<u8>>>,
    // Serializes the read-tip, mine, write-block window. Readers never take
    // this lock.
    writer: Arc<Mutex<()>>,
    db: Db,
    db_path: PathBuf,
}

impl Blockchain {
    /// Create a fresh ledger at `db_path`, minting the genesis coinbase for
    /// `genesis_address`. Fails if a ledger is already initialized there.
    pub fn create_blockchain(genesis_address: &str, db_path: &str) -> Result<Blockchain> {
        let path = PathBuf::from(db_path);
        let db = sled::open(&path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let blocks_tree = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;

        if blocks_tree
            .contains_key(TIP_BLOCK_HASH_KEY)
            .map_err(|e| BlockchainError::Database(format!("Failed to check tip hash: {e}")))?
        {
            return Err(BlockchainError::AlreadyExists(db_path.to_string()));
        }

        info!("Creating genesis block for address {genesis_address}");
        let coinbase_tx = Transaction::new_coinbase_tx_with_note(genesis_address, GENESIS_NOTE)?;
        let genesis = Block::generate_genesis_block(&coinbase_tx)?;
        Self::update_blocks_tree(&blocks_tree, &genesis)?;

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(genesis.get_hash_bytes())),
            writer: Arc::new(Mutex::new(())),
            db,
            db_path: path,
        })
    }

    /// Open the ledger at `db_path`. Fails if none has been created there.
    pub fn open_blockchain(db_path: &str) -> Result<Blockchain> {
        let path = PathBuf::from(db_path);
        let db = sled::open(&path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let blocks_tree = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;

        let tip_bytes = blocks_tree
            .get(TIP_BLOCK_HASH_KEY)
            .map_err(|e| BlockchainError::Database(format!("Failed to get tip hash: {e}")))?
            .ok_or_else(|| BlockchainError::NotInitialized(db_path.to_string()))?;

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(tip_bytes.to_vec())),
            writer: Arc::new(Mutex::new(())),
            db,
            db_path: path,
        })
    }

    // Block and tip pointer land in one sled transaction, so a crash never
    // leaves a tip naming an unwritten block.
    fn update_blocks_tree(blocks_tree: &Tree, block: &Block) -> Result<()> {
        let block_hash = block.get_hash_bytes();
        let block_data = block.serialize()?;

        blocks_tree
            .transaction(|tx_db| {
                tx_db.insert(block_hash.as_slice(), block_data.as_slice())?;
                tx_db.insert(TIP_BLOCK_HASH_KEY, block_hash.as_slice())?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError| {
                BlockchainError::Database(format!("Failed to update blocks tree: {e}"))
            })?;

        Ok(())
    }

    pub fn get_db_path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn get_tip_hash(&self) -> Vec<u8> {
        self.tip_hash
            .read()
            .expect("Failed to acquire read lock on tip_hash - this should never happen")
            .clone()
    }

    fn set_tip_hash(&self, new_tip_hash: &[u8]) {
        let mut tip_hash = self
            .tip_hash
            .write()
            .expect("Failed to acquire write lock on tip_hash - this should never happen");
        *tip_hash = new_tip_hash.to_vec();
    }

    /// Validate `transactions`, mine a block binding them to the current
    /// tip, persist it, and advance the tip. Blocks until proof-of-work
    /// completes; appends are serialized by a single-writer lock.
    pub fn mine_block(&self, transactions: &[Transaction]) -> Result<Block> {
        let _writer = self
            .writer
            .lock()
            .expect("Failed to acquire writer lock - this should never happen");

        for (i, transaction) in transactions.iter().enumerate() {
            if !self.verify_transaction(transaction)? {
                return Err(BlockchainError::Transaction(format!(
                    "Invalid transaction at index {i}"
                )));
            }
            self.validate_transaction_inputs(transaction)?;
        }
        Self::check_for_double_spending(transactions)?;

        let block = Block::new_block(self.get_tip_hash(), transactions)?;

        let blocks_tree = self
            .db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;
        Self::update_blocks_tree(&blocks_tree, &block)?;
        self.set_tip_hash(block.get_hash());

        info!(
            "Mined block {} with {} transactions",
            HEXLOWER.encode(block.get_hash()),
            transactions.len()
        );
        Ok(block)
    }

    /// Walk the chain from the current tip back to genesis. The tip is
    /// snapshotted here; an append racing this traversal is simply not
    /// observed.
    pub fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator::new(self.get_tip_hash(), self.db.clone())
    }

    /// Linear scan for a transaction by id.
    pub fn find_transaction(&self, txid: &[u8]) -> Result<Transaction> {
        for block in self.iterator() {
            let block = block?;
            for transaction in block.get_transactions() {
                if txid.eq(transaction.get_id()) {
                    return Ok(transaction.clone());
                }
            }
        }
        Err(BlockchainError::TransactionNotFound)
    }

    // Single backward walk shared by the UTXO queries. Returns the
    // transactions holding at least one output that is locked by
    // `pub_key_hash` and not spent, plus the spent-output map accumulated
    // along the way. Spends are recorded in the same per-transaction pass
    // that emits candidates; the walk order (tip to genesis) is load-bearing
    // for addresses that send and receive within one transaction.
    fn walk_unspent(
        &self,
        pub_key_hash: &[u8],
    ) -> Result<(Vec<Transaction>, HashMap<String, Vec<i64>>)> {
        let mut unspent_txs: Vec<Transaction> = vec![];
        let mut spent_txos: HashMap<String, Vec<i64>> = HashMap::new();

        for block in self.iterator() {
            let block = block?;
            for tx in block.get_transactions() {
                let txid_hex = HEXLOWER.encode(tx.get_id());

                'outputs: for (idx, out) in tx.get_vout().iter().enumerate() {
                    if let Some(outs) = spent_txos.get(txid_hex.as_str()) {
                        for spent_out_idx in outs {
                            if (idx as i64).eq(spent_out_idx) {
                                continue 'outputs;
                            }
                        }
                    }
                    if out.is_locked_with_key(pub_key_hash) {
                        unspent_txs.push(tx.clone());
                        break 'outputs;
                    }
                }

                if tx.is_coinbase() {
                    continue;
                }
                for txin in tx.get_vin() {
                    if txin.uses_key(pub_key_hash) {
                        let in_txid_hex = HEXLOWER.encode(txin.get_txid());
                        spent_txos
                            .entry(in_txid_hex)
                            .or_default()
                            .push(txin.get_vout());
                    }
                }
            }
        }
        Ok((unspent_txs, spent_txos))
    }

    fn is_spent(spent_txos: &HashMap<String, Vec<i64>>, txid_hex: &str, idx: usize) -> bool {
        spent_txos
            .get(txid_hex)
            .map(|outs| outs.contains(&(idx as i64)))
            .unwrap_or(false)
    }

    /// Every transaction still holding at least one unspent output locked
    /// by `pub_key_hash`, newest first.
    pub fn find_unspent_transactions(&self, pub_key_hash: &[u8]) -> Result<Vec<Transaction>> {
        let (unspent_txs, _) = self.walk_unspent(pub_key_hash)?;
        Ok(unspent_txs)
    }

    /// The UTXO set for `pub_key_hash`: the individual unspent outputs it
    /// can unlock. An address with no history yields an empty set.
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let (unspent_txs, spent_txos) = self.walk_unspent(pub_key_hash)?;
        let mut utxos = vec![];

        for tx in &unspent_txs {
            let txid_hex = HEXLOWER.encode(tx.get_id());
            for (idx, out) in tx.get_vout().iter().enumerate() {
                if Self::is_spent(&spent_txos, &txid_hex, idx) {
                    continue;
                }
                if out.is_locked_with_key(pub_key_hash) {
                    utxos.push(out.clone());
                }
            }
        }
        Ok(utxos)
    }

    /// Greedily accumulate unspent outputs in chain-walk order until the
    /// running total reaches `amount`, then stop. Returns the partial
    /// accumulation when the funds fall short; the caller checks
    /// sufficiency.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, HashMap<String, Vec<usize>>)> {
        let (unspent_txs, spent_txos) = self.walk_unspent(pub_key_hash)?;
        let mut unspent_outputs: HashMap<String, Vec<usize>> = HashMap::new();
        let mut accumulated = 0u64;

        'work: for tx in &unspent_txs {
            let txid_hex = HEXLOWER.encode(tx.get_id());
            for (idx, out) in tx.get_vout().iter().enumerate() {
                if Self::is_spent(&spent_txos, &txid_hex, idx) {
                    continue;
                }
                if out.is_locked_with_key(pub_key_hash) && accumulated < amount {
                    accumulated += out.get_value();
                    unspent_outputs
                        .entry(txid_hex.clone())
                        .or_default()
                        .push(idx);
                }
                if accumulated >= amount {
                    break 'work;
                }
            }
        }
        Ok((accumulated, unspent_outputs))
    }

    /// Resolve every input's referenced transaction and sign `transaction`
    /// with `pkcs8`. A missing reference aborts the signing.
    pub fn sign_transaction(&self, transaction: &mut Transaction, pkcs8: &[u8]) -> Result<()> {
        if transaction.is_coinbase() {
            return Ok(());
        }

        let mut prev_txs: HashMap<String, Transaction> = HashMap::new();
        for vin in transaction.get_vin() {
            let prev_tx = self.find_transaction(vin.get_txid())?;
            prev_txs.insert(HEXLOWER.encode(prev_tx.get_id()), prev_tx);
        }
        transaction.sign(pkcs8, &prev_txs)
    }

    /// Resolve referenced transactions and verify `transaction`'s
    /// signatures. A reference missing from the chain makes the
    /// transaction invalid, not an error.
    pub fn verify_transaction(&self, transaction: &Transaction) -> Result<bool> {
        if transaction.is_coinbase() {
            return Ok(true);
        }

        let mut prev_txs: HashMap<String, Transaction> = HashMap::new();
        for vin in transaction.get_vin() {
            match self.find_transaction(vin.get_txid()) {
                Ok(prev_tx) => {
                    prev_txs.insert(HEXLOWER.encode(prev_tx.get_id()), prev_tx);
                }
                Err(BlockchainError::TransactionNotFound) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        Ok(transaction.verify(&prev_txs))
    }

    /// Whether some transaction already on the chain consumes the output
    /// `txid:vout`.
    pub fn is_output_spent(&self, txid: &[u8], vout: i64) -> Result<bool> {
        for block in self.iterator() {
            let block = block?;
            for transaction in block.get_transactions() {
                if transaction.is_coinbase() {
                    continue;
                }
                for input in transaction.get_vin() {
                    if input.get_txid() == txid && input.get_vout() == vout {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Reject a transaction whose inputs are already spent on-chain or
    /// reference transactions that do not exist.
    fn validate_transaction_inputs(&self, transaction: &Transaction) -> Result<()> {
        if transaction.is_coinbase() {
            return Ok(());
        }

        for input in transaction.get_vin() {
            if self.is_output_spent(input.get_txid(), input.get_vout())? {
                return Err(BlockchainError::Transaction(format!(
                    "Input already spent: {}:{}",
                    HEXLOWER.encode(input.get_txid()),
                    input.get_vout()
                )));
            }
            self.find_transaction(input.get_txid()).map_err(|_| {
                BlockchainError::Transaction(format!(
                    "Referenced transaction not found: {}",
                    HEXLOWER.encode(input.get_txid())
                ))
            })?;
        }
        Ok(())
    }

    // No two transactions in one batch may consume the same output.
    fn check_for_double_spending(transactions: &[Transaction]) -> Result<()> {
        let mut spent_outputs: HashSet<(Vec<u8>, i64)> = HashSet::new();

        for (tx_index, transaction) in transactions.iter().enumerate() {
            if transaction.is_coinbase() {
                continue;
            }
            for input in transaction.get_vin() {
                let output_reference = (input.get_txid().to_vec(), input.get_vout());
                if !spent_outputs.insert(output_reference) {
                    return Err(BlockchainError::Transaction(format!(
                        "Double-spending detected in transaction {}: output {}:{} already spent in this block",
                        tx_index,
                        HEXLOWER.encode(input.get_txid()),
                        input.get_vout()
                    )));
                }
            }
        }
        Ok(())
    }
}

pub struct BlockchainIterator {
    db: Db,
    current_hash: Vec<u8>,
}

impl BlockchainIterator {
    fn new(tip_hash: Vec<u8>, db: Db) -> BlockchainIterator {
        BlockchainIterator {
            current_hash: tip_hash,
            db,
        }
    }
}

impl Iterator for BlockchainIterator {
    type Item = Result<Block>;

    // A missing or undecodable block is a corrupted store and surfaces as
    // an error rather than silently ending the walk.
    fn next(&mut self) -> Option<Self::Item> {
        if self.current_hash.is_empty() {
            return None;
        }

        let block_tree = match self.db.open_tree(BLOCKS_TREE) {
            Ok(tree) => tree,
            Err(e) => return Some(Err(e.into())),
        };
        let data = match block_tree.get(self.current_hash.as_slice()) {
            Ok(Some(data)) => data,
            Ok(None) => {
                return Some(Err(BlockchainError::Database(format!(
                    "Missing block {}",
                    HEXLOWER.encode(self.current_hash.as_slice())
                ))))
            }
            Err(e) => return Some(Err(e.into())),
        };
        let block = match Block::deserialize(data.as_ref()) {
            Ok(block) => block,
            Err(e) => return Some(Err(e)),
        };
        self.current_hash = block.get_pre_block_hash().to_vec();
        Some(Ok(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;
    use tempfile::tempdir;

    #[test]
    fn test_create_fails_when_ledger_exists() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("ledger");
        let db_path = db_path.to_str().unwrap();

        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();

        let blockchain = Blockchain::create_blockchain(&address, db_path).unwrap();
        drop(blockchain);

        match Blockchain::create_blockchain(&address, db_path) {
            Err(BlockchainError::AlreadyExists(_)) => {}
            other => panic!("Expected AlreadyExists, got {other:?}"),
        }
    }

    #[test]
    fn test_open_fails_when_ledger_missing() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("ledger");

        match Blockchain::open_blockchain(db_path.to_str().unwrap()) {
            Err(BlockchainError::NotInitialized(_)) => {}
            other => panic!("Expected NotInitialized, got {other:?}"),
        }
    }

    #[test]
    fn test_find_transaction_miss_is_typed() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("ledger");

        let wallet = Wallet::new().unwrap();
        let blockchain =
            Blockchain::create_blockchain(&wallet.get_address(), db_path.to_str().unwrap())
                .unwrap();

        match blockchain.find_transaction(&[0u8; 32]) {
            Err(BlockchainError::TransactionNotFound) => {}
            other => panic!("Expected TransactionNotFound, got {other:?}"),
        }
    }
}
