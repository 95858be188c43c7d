use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::debug;
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;

/// Mining difficulty, fixed for the whole chain: the number of leading zero
/// bits a block hash must carry. There is no retargeting.
pub const MINING_DIFFICULTY: u32 = 12;

const MAX_NONCE: i64 = i64::MAX;

pub struct ProofOfWork {
    block: Block,
    target: BigInt,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: Block) -> ProofOfWork {
        let mut target = BigInt::from(1);
        target.shl_assign(256 - MINING_DIFFICULTY);
        ProofOfWork { block, target }
    }

    /// Recompute the digest with the block's stored nonce and check it
    /// against the target. This is the sole admission check for a block.
    pub fn validate(block: &Block) -> bool {
        let pow = ProofOfWork::new_proof_of_work(block.clone());
        let data = pow.prepare_data(block.get_nonce());
        let hash = sha256_digest(data.as_slice());
        let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());
        hash_int < pow.target
    }

    fn prepare_data(&self, nonce: i64) -> Vec<u8> {
        let mut data_bytes = vec![];
        data_bytes.extend(self.block.get_pre_block_hash());
        data_bytes.extend(self.block.hash_transactions());
        data_bytes.extend(self.block.get_timestamp().to_be_bytes());
        data_bytes.extend(i64::from(MINING_DIFFICULTY).to_be_bytes());
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes
    }

    /// Search nonce values from zero until the digest falls below the
    /// target. Runs to completion; there is no cancellation point between
    /// probes. Exhausting the nonce space fails the block.
    pub fn run(&self) -> Result<(i64, Vec<u8>)> {
        let mut nonce = 0;
        while nonce < MAX_NONCE {
            let data = self.prepare_data(nonce);
            let hash = sha256_digest(data.as_slice());
            let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());

            if hash_int < self.target {
                debug!(
                    "Nonce {} produced {}",
                    nonce,
                    HEXLOWER.encode(hash.as_slice())
                );
                return Ok((nonce, hash));
            }
            nonce += 1;
        }
        Err(BlockchainError::Mining(
            "Nonce space exhausted without meeting target".to_string(),
        ))
    }
}
