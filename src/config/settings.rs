use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;
use std::sync::RwLock;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

static DEFAULT_DATA_DIR: &str = "./data";
static DEFAULT_WALLET_FILE: &str = "wallet.dat";

const DATA_DIR_KEY: &str = "DATA_DIR";
const WALLET_FILE_KEY: &str = "WALLET_FILE";

/// Runtime settings: where the ledger database lives and where the wallet
/// collection is stored. Overridable via EMBER_DATA_DIR and
/// EMBER_WALLET_FILE.
pub struct Config {
    inner: RwLock<HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let data_dir = env::var("EMBER_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
        let wallet_file =
            env::var("EMBER_WALLET_FILE").unwrap_or_else(|_| DEFAULT_WALLET_FILE.to_string());

        let mut map = HashMap::new();
        map.insert(String::from(DATA_DIR_KEY), data_dir);
        map.insert(String::from(WALLET_FILE_KEY), wallet_file);

        Config {
            inner: RwLock::new(map),
        }
    }

    pub fn get_data_dir(&self) -> String {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen");
        inner
            .get(DATA_DIR_KEY)
            .expect("Data dir should always be present in config")
            .clone()
    }

    pub fn set_data_dir(&self, path: String) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on config - this should never happen");
        inner.insert(String::from(DATA_DIR_KEY), path);
    }

    pub fn get_wallet_file(&self) -> String {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen");
        inner
            .get(WALLET_FILE_KEY)
            .expect("Wallet file should always be present in config")
            .clone()
    }

    pub fn set_wallet_file(&self, path: String) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on config - this should never happen");
        inner.insert(String::from(WALLET_FILE_KEY), path);
    }
}
