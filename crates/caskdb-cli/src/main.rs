//! caskdb command-line client.
//!
//! ```bash
//! caskdb put ./data key value
//! caskdb get ./data key
//! caskdb keys ./data
//! caskdb stat ./data
//! caskdb merge ./data
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

/// caskdb - an embedded, single-writer, crash-safe key-value store.
#[derive(Parser)]
#[command(name = "caskdb")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Which keydir implementation to open the database with.
#[derive(Clone, Copy, ValueEnum)]
enum IndexArg {
    Btree,
    Art,
    Bptree,
}

impl From<IndexArg> for caskdb_engine::IndexType {
    fn from(value: IndexArg) -> Self {
        match value {
            IndexArg::Btree => caskdb_engine::IndexType::BTree,
            IndexArg::Art => caskdb_engine::IndexType::Art,
            IndexArg::Bptree => caskdb_engine::IndexType::BPlusTree,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Store a key/value pair.
    Put {
        dir: PathBuf,
        key: String,
        value: String,
        #[arg(long, value_enum, default_value_t = IndexArg::Btree)]
        index: IndexArg,
    },

    /// Fetch the value for a key.
    Get {
        dir: PathBuf,
        key: String,
        #[arg(long, value_enum, default_value_t = IndexArg::Btree)]
        index: IndexArg,
    },

    /// Remove a key.
    Delete {
        dir: PathBuf,
        key: String,
        #[arg(long, value_enum, default_value_t = IndexArg::Btree)]
        index: IndexArg,
    },

    /// List every live key in sorted order.
    Keys {
        dir: PathBuf,
        #[arg(long, value_enum, default_value_t = IndexArg::Btree)]
        index: IndexArg,
    },

    /// Print key count, segment count and reclaimable space.
    Stat {
        dir: PathBuf,
        #[arg(long, value_enum, default_value_t = IndexArg::Btree)]
        index: IndexArg,
    },

    /// Compact the database, reclaiming space held by overwritten and
    /// deleted keys.
    Merge {
        dir: PathBuf,
        #[arg(long, value_enum, default_value_t = IndexArg::Btree)]
        index: IndexArg,
    },
}

impl std::fmt::Display for IndexArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IndexArg::Btree => "btree",
            IndexArg::Art => "art",
            IndexArg::Bptree => "bptree",
        };
        write!(f, "{name}")
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Put { dir, key, value, index } => commands::put::run(&dir, index.into(), &key, &value),
        Commands::Get { dir, key, index } => commands::get::run(&dir, index.into(), &key),
        Commands::Delete { dir, key, index } => commands::delete::run(&dir, index.into(), &key),
        Commands::Keys { dir, index } => commands::keys::run(&dir, index.into()),
        Commands::Stat { dir, index } => commands::stat::run(&dir, index.into()),
        Commands::Merge { dir, index } => commands::merge::run(&dir, index.into()),
    }
}
