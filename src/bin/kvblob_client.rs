use anyhow::Result;
use clap::{Parser, Subcommand};

use kvblob::client::Client;
use kvblob::engine::EntryId;

#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[clap(long)]
    addr: String,

    #[clap(long)]
    token: Option<String>,

    #[clap(long, default_value = "")]
    route_base: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "store a value and print its id")]
    Store { data: String },
    #[command(about = "print the value stored under an id")]
    Get { id: EntryId },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut client = Client::connect(&cli.addr)
        .await?
        .with_route_base(&cli.route_base);
    if let Some(token) = cli.token {
        client = client.with_token(token);
    }

    match cli.command {
        Commands::Store { data } => println!("{}", client.put(&data).await?),
        Commands::Get { id } => match client.get(id).await? {
            Some(value) => println!("{}", value),
            None => println!("Key not found"),
        },
    }

    Ok(())
}
