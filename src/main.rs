use clap::Parser;
use data_encoding::HEXLOWER;
use emberchain::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Blockchain, Command,
    Opt, ProofOfWork, Transaction, Wallets, GLOBAL_CONFIG,
};
use log::{error, LevelFilter};
use std::process;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Createblockchain { address } => {
            if !validate_address(&address) {
                return Err(format!("Invalid address: {address}").into());
            }
            Blockchain::create_blockchain(&address, &GLOBAL_CONFIG.get_data_dir())?;
            println!("Done!");
        }
        Command::Createwallet => {
            let mut wallets = Wallets::new()?;
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}");
        }
        Command::GetBalance { address } => {
            let pub_key_hash = address_to_pub_key_hash(&address)?;
            let blockchain = Blockchain::open_blockchain(&GLOBAL_CONFIG.get_data_dir())?;
            let utxos = blockchain.find_utxo(pub_key_hash.as_slice())?;

            let balance: u64 = utxos.iter().map(|utxo| utxo.get_value()).sum();
            println!("Balance of {address}: {balance}");
        }
        Command::ListAddresses => {
            let wallets = Wallets::new()?;
            for address in wallets.get_addresses() {
                println!("{address}");
            }
        }
        Command::Send { from, to, amount } => {
            if !validate_address(&from) {
                return Err(format!("Invalid sender address: {from}").into());
            }
            if !validate_address(&to) {
                return Err(format!("Invalid recipient address: {to}").into());
            }
            if amount == 0 {
                return Err("Amount must be positive".into());
            }

            let wallets = Wallets::new()?;
            let wallet = wallets
                .get_wallet(&from)
                .ok_or_else(|| format!("Wallet not found for address: {from}"))?;

            let blockchain = Blockchain::open_blockchain(&GLOBAL_CONFIG.get_data_dir())?;
            let transaction = Transaction::new_utxo_transaction(wallet, &to, amount, &blockchain)?;
            blockchain.mine_block(&[transaction])?;
            println!("Success!");
        }
        Command::Printchain => {
            let blockchain = Blockchain::open_blockchain(&GLOBAL_CONFIG.get_data_dir())?;
            for block in blockchain.iterator() {
                let block = block?;

                if block.is_genesis() {
                    println!("Pre block hash: None");
                } else {
                    println!(
                        "Pre block hash: {}",
                        HEXLOWER.encode(block.get_pre_block_hash())
                    );
                }
                println!("Cur block hash: {}", HEXLOWER.encode(block.get_hash()));
                println!("Cur block timestamp: {}", block.get_timestamp());
                println!("PoW valid: {}", ProofOfWork::validate(&block));

                for tx in block.get_transactions() {
                    let cur_txid_hex = HEXLOWER.encode(tx.get_id());
                    println!("- Transaction txid_hex: {cur_txid_hex}");

                    if !tx.is_coinbase() {
                        for input in tx.get_vin() {
                            let txid_hex = HEXLOWER.encode(input.get_txid());
                            let pub_key_hash = hash_pub_key(input.get_pub_key());
                            let address = convert_address(pub_key_hash.as_slice());
                            println!(
                                "-- Input txid = {}, vout = {}, from = {}",
                                txid_hex,
                                input.get_vout(),
                                address,
                            );
                        }
                    }
                    for output in tx.get_vout() {
                        let address = convert_address(output.get_pub_key_hash());
                        println!("-- Output value = {}, to = {}", output.get_value(), address);
                    }
                }
                println!();
            }
        }
    }
    Ok(())
}
