use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use kvblob::engine::{BlobEngine, EntryId};
use kvblob::log_store::LogStore;
use kvblob::sled::SledStore;

/// Read and write a blob store directly, without a server.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    #[arg(short, long, value_enum, default_value_t = Engine::Log)]
    engine: Engine,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Engine {
    Log,
    Sled,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "store a value and print its id")]
    Put { value: String },
    #[command(about = "print the value stored under an id")]
    Get { id: EntryId },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.engine {
        Engine::Log => run(LogStore::open(&cli.data_dir)?, cli.command),
        Engine::Sled => run(SledStore::open(&cli.data_dir)?, cli.command),
    }
}

fn run<E: BlobEngine>(engine: E, command: Commands) -> Result<()> {
    match command {
        Commands::Put { value } => println!("{}", engine.put(value)?),
        Commands::Get { id } => match engine.get(id)? {
            Some(value) => println!("{}", value),
            None => println!("Key not found"),
        },
    }
    Ok(())
}
