//! Core ledger functionality: blocks, transactions, the chain itself, and
//! the proof-of-work puzzle gating block admission.

pub mod block;
pub mod blockchain;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::{Blockchain, BlockchainIterator};
pub use proof_of_work::{ProofOfWork, MINING_DIFFICULTY};
pub use transaction::{TXInput, TXOutput, Transaction, COINBASE_VOUT, SUBSIDY};
