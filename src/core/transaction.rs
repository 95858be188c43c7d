// UTXO transaction model: every transaction consumes previous outputs and
// creates new ones, except the coinbase which mints the block subsidy.

use crate::core::Blockchain;
use crate::error::{BlockchainError, Result};
use crate::utils::{
    base58_decode, deserialize, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    serialize, sha256_digest,
};
use crate::wallet::{hash_pub_key, validate_address, Wallet, ADDRESS_CHECK_SUM_LEN};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Subsidy paid by every coinbase transaction.
pub const SUBSIDY: u64 = 100;

/// Output index carried by the coinbase sentinel input.
pub const COINBASE_VOUT: i64 = -1;

/// Reference to a previous transaction output, plus the material proving
/// the spender may consume it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: i64,
    signature: Vec<u8>,
    pub_key: Vec<u8>,
}

impl TXInput {
    pub fn new(txid: &[u8], vout: i64) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            signature: vec![],
            pub_key: vec![],
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> i64 {
        self.vout
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    /// Whether this input was produced by the holder of `pub_key_hash`.
    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        let locking_hash = hash_pub_key(self.pub_key.as_slice());
        locking_hash.eq(pub_key_hash)
    }
}

/// A claim on `value` coins, spendable by whoever holds the key hashing to
/// `pub_key_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    pub fn new(value: u64, address: &str) -> Result<TXOutput> {
        if value == 0 {
            return Err(BlockchainError::Transaction(
                "Transaction value must be positive".to_string(),
            ));
        }

        let mut output = TXOutput {
            value,
            pub_key_hash: vec![],
        };
        output.lock(address)?;
        Ok(output)
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    fn lock(&mut self, address: &str) -> Result<()> {
        if !validate_address(address) {
            return Err(BlockchainError::InvalidAddress(address.to_string()));
        }

        let payload = base58_decode(address)?;
        if payload.len() < ADDRESS_CHECK_SUM_LEN + 1 {
            return Err(BlockchainError::InvalidAddress(
                "Address too short".to_string(),
            ));
        }

        self.pub_key_hash = payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec();
        Ok(())
    }

    /// The sole spending-authorization rule: byte equality of key hashes.
    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

/// A transfer of value. The id is the hash of the transaction with all
/// input signatures and public keys cleared, so it is a stable signing
/// target regardless of signature bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    pub fn new_coinbase_tx(to: &str) -> Result<Transaction> {
        Self::new_coinbase_tx_with_note(to, "")
    }

    /// Coinbase transaction paying the subsidy to `to`. The sentinel input
    /// carries the note in its pub_key field and a fresh UUID in its
    /// signature field so two coinbases for one address never share an id.
    pub fn new_coinbase_tx_with_note(to: &str, note: &str) -> Result<Transaction> {
        let note = if note.is_empty() {
            format!("Coins to {to}")
        } else {
            note.to_string()
        };

        let tx_input = TXInput {
            txid: vec![],
            vout: COINBASE_VOUT,
            signature: Uuid::new_v4().as_bytes().to_vec(),
            pub_key: note.into_bytes(),
        };
        let txout = TXOutput::new(SUBSIDY, to)?;

        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![txout],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Build and sign a spend of `amount` coins from `wallet`'s outputs to
    /// `to`, returning change to the sender.
    pub fn new_utxo_transaction(
        wallet: &Wallet,
        to: &str,
        amount: u64,
        blockchain: &Blockchain,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(BlockchainError::Transaction(
                "Amount must be positive".to_string(),
            ));
        }
        if !validate_address(to) {
            return Err(BlockchainError::InvalidAddress(format!(
                "Invalid to address: {to}"
            )));
        }

        let from = wallet.get_address();
        let public_key_hash = hash_pub_key(wallet.get_public_key());

        let (accumulated, valid_outputs) =
            blockchain.find_spendable_outputs(public_key_hash.as_slice(), amount)?;
        if accumulated < amount {
            return Err(BlockchainError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut inputs = vec![];
        for (txid_hex, outs) in valid_outputs {
            let txid = HEXLOWER.decode(txid_hex.as_bytes()).map_err(|e| {
                BlockchainError::Transaction(format!("Invalid transaction ID: {e}"))
            })?;
            for out in outs {
                let mut input = TXInput::new(txid.as_slice(), out as i64);
                input.pub_key = wallet.get_public_key().to_vec();
                inputs.push(input);
            }
        }

        let mut outputs = vec![TXOutput::new(amount, to)?];
        let change = accumulated - amount;
        if change > 0 {
            outputs.push(TXOutput::new(change, &from)?);
        }

        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.hash()?;

        blockchain.sign_transaction(&mut tx, wallet.get_pkcs8())?;
        Ok(tx)
    }

    /// True iff the single input is the coinbase sentinel.
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty() && self.vin[0].vout == COINBASE_VOUT
    }

    fn trimmed_copy(&self) -> Transaction {
        let mut inputs = vec![];
        for input in &self.vin {
            inputs.push(TXInput::new(input.get_txid(), input.get_vout()));
        }
        Transaction {
            id: self.id.clone(),
            vin: inputs,
            vout: self.vout.clone(),
        }
    }

    /// Sign every input against the referenced transactions in `prev_txs`
    /// (keyed by hex transaction id). The per-input digest is the hash of a
    /// trimmed copy whose current input carries the referenced output's
    /// pub_key_hash in place of a public key.
    pub fn sign(
        &mut self,
        pkcs8: &[u8],
        prev_txs: &HashMap<String, Transaction>,
    ) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let mut tx_copy = self.trimmed_copy();

        for (idx, vin) in self.vin.iter_mut().enumerate() {
            let prev_tx = prev_txs
                .get(&HEXLOWER.encode(vin.get_txid()))
                .ok_or_else(|| {
                    BlockchainError::Transaction("Previous transaction not found".to_string())
                })?;

            let out_idx = usize::try_from(vin.vout).map_err(|_| {
                BlockchainError::Transaction("Invalid output index".to_string())
            })?;
            if out_idx >= prev_tx.vout.len() {
                return Err(BlockchainError::Transaction(
                    "Invalid output index".to_string(),
                ));
            }

            tx_copy.vin[idx].signature = vec![];
            tx_copy.vin[idx].pub_key = prev_tx.vout[out_idx].pub_key_hash.clone();
            tx_copy.id = tx_copy.content_hash()?;
            tx_copy.vin[idx].pub_key = vec![];

            vin.signature = ecdsa_p256_sha256_sign_digest(pkcs8, tx_copy.get_id())?;
        }
        Ok(())
    }

    /// Check every input's signature against the same digests `sign`
    /// produced. Returns false, never panics, on a missing reference, a bad
    /// index, a key that does not match the referenced output's lock, or a
    /// signature mismatch. Coinbase transactions are always valid.
    pub fn verify(&self, prev_txs: &HashMap<String, Transaction>) -> bool {
        if self.is_coinbase() {
            return true;
        }

        let mut tx_copy = self.trimmed_copy();

        for (idx, vin) in self.vin.iter().enumerate() {
            let prev_tx = match prev_txs.get(&HEXLOWER.encode(vin.get_txid())) {
                Some(tx) => tx,
                None => return false,
            };

            let out_idx = match usize::try_from(vin.vout) {
                Ok(idx) if idx < prev_tx.vout.len() => idx,
                _ => return false,
            };

            // The spender's key must hash to the lock on the referenced
            // output.
            let prev_out = &prev_tx.vout[out_idx];
            if !hash_pub_key(vin.pub_key.as_slice()).eq(prev_out.get_pub_key_hash()) {
                return false;
            }

            tx_copy.vin[idx].signature = vec![];
            tx_copy.vin[idx].pub_key = prev_out.pub_key_hash.clone();
            tx_copy.id = match tx_copy.content_hash() {
                Ok(id) => id,
                Err(_) => return false,
            };
            tx_copy.vin[idx].pub_key = vec![];

            if !ecdsa_p256_sha256_sign_verify(
                vin.pub_key.as_slice(),
                vin.signature.as_slice(),
                tx_copy.get_id(),
            ) {
                return false;
            }
        }
        true
    }

    // SHA-256 over the serialized transaction with its id cleared. Used for
    // the per-input signing digests, where the caller has already arranged
    // the input fields.
    fn content_hash(&self) -> Result<Vec<u8>> {
        let tx_copy = Transaction {
            id: vec![],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(tx_copy.serialize()?.as_slice()))
    }

    // The transaction id: computed with every input's signature and public
    // key cleared, so it is a stable signing target independent of
    // signature bytes. A coinbase has no signing material to clear; its
    // sentinel input (note plus uniqueness nonce) feeds the id as-is.
    fn hash(&self) -> Result<Vec<u8>> {
        if self.is_coinbase() {
            self.content_hash()
        } else {
            self.trimmed_copy().content_hash()
        }
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_id_bytes(&self) -> Vec<u8> {
        self.id.clone()
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    fn refs(txs: &[&Transaction]) -> HashMap<String, Transaction> {
        txs.iter()
            .map(|tx| (HEXLOWER.encode(tx.get_id()), (*tx).clone()))
            .collect()
    }

    /// An unsigned spend of `prev`'s output 0, paying `to`.
    fn spend_of(prev: &Transaction, spender: &Wallet, to: &str, amount: u64) -> Transaction {
        let mut input = TXInput::new(prev.get_id(), 0);
        input.pub_key = spender.get_public_key().to_vec();

        let mut tx = Transaction {
            id: vec![],
            vin: vec![input],
            vout: vec![TXOutput::new(amount, to).unwrap()],
        };
        tx.id = tx.hash().unwrap();
        tx
    }

    #[test]
    fn test_coinbase_structure() {
        let wallet = Wallet::new().unwrap();
        let tx = Transaction::new_coinbase_tx(&wallet.get_address()).unwrap();

        assert!(tx.is_coinbase());
        assert_eq!(tx.get_vin().len(), 1);
        assert!(tx.get_vin()[0].get_txid().is_empty());
        assert_eq!(tx.get_vin()[0].get_vout(), COINBASE_VOUT);
        assert_eq!(tx.get_vout().len(), 1);
        assert_eq!(tx.get_vout()[0].get_value(), SUBSIDY);
        assert_eq!(tx.get_id().len(), 32);
    }

    #[test]
    fn test_coinbase_ids_are_unique_for_same_address() {
        let wallet = Wallet::new().unwrap();
        let a = Transaction::new_coinbase_tx(&wallet.get_address()).unwrap();
        let b = Transaction::new_coinbase_tx(&wallet.get_address()).unwrap();
        assert_ne!(a.get_id(), b.get_id());
    }

    #[test]
    fn test_coinbase_is_always_valid() {
        let wallet = Wallet::new().unwrap();
        let tx = Transaction::new_coinbase_tx(&wallet.get_address()).unwrap();
        assert!(tx.verify(&HashMap::new()));
    }

    #[test]
    fn test_output_lock_matches_owner_only() {
        let owner = Wallet::new().unwrap();
        let other = Wallet::new().unwrap();
        let output = TXOutput::new(10, &owner.get_address()).unwrap();

        assert!(output.is_locked_with_key(&hash_pub_key(owner.get_public_key())));
        assert!(!output.is_locked_with_key(&hash_pub_key(other.get_public_key())));
        assert_eq!(output.get_pub_key_hash().len(), 20);
    }

    #[test]
    fn test_zero_value_output_is_rejected() {
        let wallet = Wallet::new().unwrap();
        assert!(TXOutput::new(0, &wallet.get_address()).is_err());
    }

    #[test]
    fn test_sign_then_verify() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let prev = Transaction::new_coinbase_tx(&alice.get_address()).unwrap();

        let mut tx = spend_of(&prev, &alice, &bob.get_address(), SUBSIDY);
        tx.sign(alice.get_pkcs8(), &refs(&[&prev])).unwrap();

        assert!(tx.verify(&refs(&[&prev])));
    }

    #[test]
    fn test_verify_rejects_tampered_signature() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let prev = Transaction::new_coinbase_tx(&alice.get_address()).unwrap();

        let mut tx = spend_of(&prev, &alice, &bob.get_address(), SUBSIDY);
        tx.sign(alice.get_pkcs8(), &refs(&[&prev])).unwrap();
        tx.vin[0].signature[0] ^= 0x01;

        assert!(!tx.verify(&refs(&[&prev])));
    }

    #[test]
    fn test_verify_rejects_tampered_output_lock() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let prev = Transaction::new_coinbase_tx(&alice.get_address()).unwrap();

        let mut tx = spend_of(&prev, &alice, &bob.get_address(), SUBSIDY);
        tx.sign(alice.get_pkcs8(), &refs(&[&prev])).unwrap();

        let mut altered_prev = prev.clone();
        altered_prev.vout[0].pub_key_hash[0] ^= 0x01;

        assert!(!tx.verify(&refs(&[&altered_prev])));
    }

    #[test]
    fn test_verify_rejects_wrong_spender_key() {
        let alice = Wallet::new().unwrap();
        let mallory = Wallet::new().unwrap();
        let prev = Transaction::new_coinbase_tx(&alice.get_address()).unwrap();

        // Mallory signs with a key that does not hash to the output's lock.
        let mut tx = spend_of(&prev, &mallory, &mallory.get_address(), SUBSIDY);
        tx.sign(mallory.get_pkcs8(), &refs(&[&prev])).unwrap();

        assert!(!tx.verify(&refs(&[&prev])));
    }

    #[test]
    fn test_verify_fails_on_missing_reference() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let prev = Transaction::new_coinbase_tx(&alice.get_address()).unwrap();

        let mut tx = spend_of(&prev, &alice, &bob.get_address(), SUBSIDY);
        tx.sign(alice.get_pkcs8(), &refs(&[&prev])).unwrap();

        assert!(!tx.verify(&HashMap::new()));
    }

    #[test]
    fn test_sign_fails_on_missing_reference() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let prev = Transaction::new_coinbase_tx(&alice.get_address()).unwrap();

        let mut tx = spend_of(&prev, &alice, &bob.get_address(), SUBSIDY);
        assert!(tx.sign(alice.get_pkcs8(), &HashMap::new()).is_err());
    }

    #[test]
    fn test_id_ignores_signature_bytes() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let prev = Transaction::new_coinbase_tx(&alice.get_address()).unwrap();

        let tx = spend_of(&prev, &alice, &bob.get_address(), SUBSIDY);
        let id_before = tx.get_id_bytes();

        let mut signed = tx.clone();
        signed.sign(alice.get_pkcs8(), &refs(&[&prev])).unwrap();

        // The id was computed before signing and is not recomputed from
        // signature bytes.
        assert_eq!(id_before, signed.get_id_bytes());
    }

    #[test]
    fn test_serialization_round_trip() {
        let wallet = Wallet::new().unwrap();
        let tx = Transaction::new_coinbase_tx(&wallet.get_address()).unwrap();
        let bytes = tx.serialize().unwrap();
        let decoded = Transaction::deserialize(&bytes).unwrap();
        assert_eq!(tx, decoded);
    }
}
