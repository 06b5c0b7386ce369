//! Single-authority ledger node.
//!
//! Opens (or creates) a chain in a RocksDB directory and produces blocks
//! signed by the authority key.
//!
//! # Usage
//! ```text
//! ledger [OPTIONS]
//! ```
//!
//! # Options
//! - `--data-dir <dir>`: Database directory (defaults to `~/.ledger/{chain_id}/db`)
//! - `--network <main|test>`: Network tag stamped into blocks and transactions
//! - `--chain-id <id>`: Chain identifier
//! - `--blocks <n>`: Number of blocks to produce before exiting
//! - `--verbose`: Print debug-level log lines
//! - `--no-color`: Plain log output
//!
//! # Identity
//! The authority key is stored encrypted at `~/.ledger/{chain_id}/authority.key`.
//! The passphrase is read from `LEDGER_PASSPHRASE`, or prompted if not set.

use ledger::core::blockchain::Blockchain;
use ledger::core::config::{ChainConfig, DEV_CHAIN_ID, NETWORK_MAIN, NETWORK_TEST};
use ledger::core::payload::{Emission, Payload, Transfer, User};
use ledger::core::registry::Registry;
use ledger::core::transaction::Envelope;
use ledger::crypto::key_file::{default_key_path, load_or_generate};
use ledger::crypto::key_pair::PrivateKey;
use ledger::storage::chain_store::ChainStore;
use ledger::storage::kv::KvStore;
use ledger::storage::rocksdb_store::RocksStore;
use ledger::types::asset::Asset;
use ledger::types::number::Number;
use ledger::utils::log::{Level, Timestamp, set_color, set_max_level};
use ledger::{error, info, warn};
use rpassword::prompt_password;
use std::env;
use std::path::PathBuf;
use std::process;
use zeroize::Zeroizing;

/// Coins minted to the authority whenever its balance runs low.
const TOP_UP: i64 = 1_000;

struct Options {
    data_dir: Option<PathBuf>,
    network: u8,
    chain_id: u64,
    blocks: u64,
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let opts = parse_args(&args);

    let passphrase = Zeroizing::new(env::var("LEDGER_PASSPHRASE").unwrap_or_else(|_| {
        prompt_password(format!("Enter passphrase for chain {}: ", opts.chain_id))
            .unwrap_or_else(|e| {
                error!("{e}");
                process::exit(1);
            })
    }));
    if passphrase.is_empty() {
        eprintln!("Passphrase cannot be empty");
        process::exit(1);
    }

    let authority = match default_key_path(opts.chain_id)
        .and_then(|path| load_or_generate(&path, passphrase.as_bytes()))
    {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Failed to load or generate authority key: {}", e);
            process::exit(1);
        }
    };

    let data_dir = match opts.data_dir.clone().or_else(|| {
        dirs::home_dir().map(|home| {
            home.join(".ledger")
                .join(opts.chain_id.to_string())
                .join("db")
        })
    }) {
        Some(dir) => dir,
        None => {
            eprintln!("Cannot determine a data directory, pass --data-dir");
            process::exit(1);
        }
    };
    let store = match RocksStore::open(&data_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to open {}: {}", data_dir.display(), e);
            process::exit(1);
        }
    };

    let authority_key = authority.public_key();
    let cfg = ChainConfig::new(opts.network, opts.chain_id, authority_key, authority_key);
    let chain_store = match ChainStore::open(store, cfg, Registry::standard()) {
        Ok(chain_store) => chain_store,
        Err(e) => {
            eprintln!("Failed to open chain: {}", e);
            process::exit(1);
        }
    };

    let mut chain = Blockchain::new(chain_store);
    info!(
        "Chain {} opened at {} (height {}, authority {})",
        opts.chain_id,
        data_dir.display(),
        chain.height(),
        authority_key.address()
    );

    for _ in 0..opts.blocks {
        let candidates = match demo_transactions(&chain, &authority) {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("Failed to read chain state: {}", e);
                process::exit(1);
            }
        };
        match chain.produce(&candidates, &authority) {
            Ok(Some(block)) => info!(
                "Block {} committed at {}: {} transactions, state root {}",
                block.num(),
                Timestamp(block.header.timestamp),
                block.items.len(),
                block.header.state_root
            ),
            Ok(None) => warn!("Nothing to include at height {}", chain.height() + 1),
            Err(e) => {
                error!("Block production failed: {}", e);
                process::exit(1);
            }
        }
    }

    let address = authority_key.address();
    match chain.store().address_info(&address, 0, &Asset::like()) {
        Ok(inf) => info!(
            "Authority {} holds {} {} (last tx {})",
            inf.tagged_address,
            inf.balance,
            inf.asset,
            inf.last_tx.map_or_else(|| "none".to_string(), |h| h.to_string())
        ),
        Err(e) => error!("Failed to read authority balance: {}", e),
    }
    match chain.store().statistic() {
        Ok(stat) => info!(
            "Chain totals: {} blocks, {} transactions, {} users, supply {}",
            stat.blocks,
            stat.txs,
            stat.users,
            stat.coin(&Asset::like()).supply
        ),
        Err(e) => error!("Failed to read chain statistics: {}", e),
    }
}

/// Candidate transactions for the next block: a top-up emission when the
/// authority is low on coins, a payment to a fresh account and, on the
/// first block, a nickname for the authority.
fn demo_transactions<S: KvStore>(
    chain: &Blockchain<S>,
    authority: &PrivateKey,
) -> Result<Vec<Envelope>, ledger::storage::chain_store::ChainError> {
    let store = chain.store();
    let cfg = store.config();
    let address = authority.public_key().address();
    let next = chain.height() + 1;
    let mut candidates = Vec::new();

    let balance = store.balance(&Asset::like(), &address)?;
    if balance < Number::from(TOP_UP / 10) {
        let emission = Emission::new(Asset::like(), Number::from(1), "top-up").with_out(
            address,
            TOP_UP,
            format!("top-up-{}-{}", cfg.chain_id, next),
            TOP_UP,
        );
        candidates.push(Envelope::new(cfg, authority, &Payload::from(emission)));
    }

    let recipient = PrivateKey::new().public_key().address();
    let transfer = Transfer::single(Asset::like(), Number::from(next % 10 + 1), recipient, cfg.chain_id);
    candidates.push(Envelope::new(cfg, authority, &Payload::from(transfer)));

    if store.user_tx(&address)?.is_none() {
        let user = User::new(format!("authority{}", cfg.chain_id), 0, Vec::new());
        candidates.push(Envelope::new(cfg, authority, &Payload::from(user)));
    }
    Ok(candidates)
}

fn parse_args(args: &[String]) -> Options {
    let mut opts = Options {
        data_dir: None,
        network: NETWORK_TEST,
        chain_id: DEV_CHAIN_ID,
        blocks: 1,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            "--verbose" => {
                set_max_level(Level::Debug);
                i += 1;
            }
            "--no-color" => {
                set_color(false);
                i += 1;
            }
            flag @ ("--data-dir" | "--network" | "--chain-id" | "--blocks") => {
                i += 1;
                if i >= args.len() {
                    eprintln!("{} requires an argument", flag);
                    process::exit(1);
                }
                let value = &args[i];
                match flag {
                    "--data-dir" => opts.data_dir = Some(PathBuf::from(value)),
                    "--network" => {
                        opts.network = match value.as_str() {
                            "main" => NETWORK_MAIN,
                            "test" => NETWORK_TEST,
                            _ => {
                                eprintln!("Invalid network: {} (expected main or test)", value);
                                process::exit(1);
                            }
                        }
                    }
                    "--chain-id" => opts.chain_id = parse_number(flag, value),
                    _ => opts.blocks = parse_number(flag, value),
                }
                i += 1;
            }
            other => {
                eprintln!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }
    opts
}

fn parse_number(flag: &str, value: &str) -> u64 {
    value.parse().unwrap_or_else(|_| {
        eprintln!("Invalid value for {}: {}", flag, value);
        process::exit(1);
    })
}

const USAGE: &str = "\
Single-Authority Ledger

USAGE:
    {program} [OPTIONS]

OPTIONS:
    --data-dir <dir>        Database directory (defaults to ~/.ledger/<chain_id>/db)
    --network <main|test>   Network tag (defaults to test)
    --chain-id <id>         Chain identifier (defaults to 1)
    --blocks <n>            Blocks to produce before exiting (defaults to 1)
    --verbose               Print debug-level log lines
    --no-color              Plain log output
    -h, --help              Print this help message

ENVIRONMENT:
    LEDGER_PASSPHRASE    Passphrase for authority key encryption (prompted interactively if not set)
    LEDGER_LOG           Log level: debug, info, warn or error (defaults to info)

EXAMPLES:
    # Produce five blocks on the dev chain
    {program} --blocks 5

    # Use a separate database for chain 7
    {program} --chain-id 7 --data-dir /tmp/ledger-7

FILES:
    ~/.ledger/<chain_id>/authority.key
    ~/.ledger/<chain_id>/db/
";

/// Prints usage information to stderr.
fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
