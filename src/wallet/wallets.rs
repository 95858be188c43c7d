use crate::config::GLOBAL_CONFIG;
use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;

/// File-backed collection of wallets, keyed by address.
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
    file_path: PathBuf,
}

impl Wallets {
    /// Load the wallet collection from the configured wallet file, or start
    /// empty if the file does not exist yet.
    pub fn new() -> Result<Wallets> {
        Self::with_file(PathBuf::from(GLOBAL_CONFIG.get_wallet_file()))
    }

    pub fn with_file(file_path: PathBuf) -> Result<Wallets> {
        let mut wallets = Wallets {
            wallets: HashMap::new(),
            file_path,
        };
        wallets.load_from_file()?;
        Ok(wallets)
    }

    pub fn create_wallet(&mut self) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();
        self.wallets.insert(address.clone(), wallet);
        self.save_to_file()?;
        Ok(address)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    fn load_from_file(&mut self) -> Result<()> {
        if !self.file_path.exists() {
            return Ok(());
        }

        let mut file = File::open(&self.file_path)
            .map_err(|e| BlockchainError::Wallet(format!("Failed to open wallet file: {e}")))?;
        let mut buf = vec![];
        file.read_to_end(&mut buf)
            .map_err(|e| BlockchainError::Wallet(format!("Failed to read wallet file: {e}")))?;
        self.wallets = deserialize(buf.as_slice())?;
        Ok(())
    }

    fn save_to_file(&self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.file_path)
            .map_err(|e| BlockchainError::Wallet(format!("Failed to open wallet file: {e}")))?;
        let mut writer = BufWriter::new(file);
        let wallets_bytes = serialize(&self.wallets)?;
        writer
            .write_all(wallets_bytes.as_slice())
            .map_err(|e| BlockchainError::Wallet(format!("Failed to write wallet file: {e}")))?;
        writer
            .flush()
            .map_err(|e| BlockchainError::Wallet(format!("Failed to flush wallet file: {e}")))?;
        Ok(())
    }
}
