use std::env::current_dir;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};

use kvblob::engine::{BlobEngine, DEFAULT_MAX_VALUE_BYTES};
use kvblob::feature::FeatureFlags;
use kvblob::guard::{AccessPolicy, AllowAll, TokenPolicy};
use kvblob::log_store::{LogStore, SEGMENT_MAX_SIZE};
use kvblob::server::Server;
use kvblob::service::KvService;
use kvblob::sled::SledStore;
use kvblob::thread_pool::rayon::RayonThreadPool;
use kvblob::thread_pool::shared_queue::SharedQueueThreadPool;
use kvblob::thread_pool::ThreadPool;

#[derive(Parser, Debug)]
#[command(version)]
struct ServerCommand {
    #[arg(short, long)]
    listen_addr: String,

    #[arg(short, long, value_enum, default_value_t = Engine::Log)]
    engine: Engine,

    /// Directory holding the store, the working directory if unset.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Feature flag to switch on; pass KV_STORE to serve the endpoint.
    #[arg(long = "feature")]
    features: Vec<String>,

    /// Bearer token granting API access.
    #[arg(long = "api-token")]
    api_tokens: Vec<String>,

    /// Grant API access to every caller.
    #[arg(long)]
    allow_anonymous: bool,

    #[arg(long, default_value = "")]
    route_base: String,

    #[arg(long, default_value_t = DEFAULT_MAX_VALUE_BYTES)]
    max_value_bytes: usize,

    #[arg(long, default_value_t = SEGMENT_MAX_SIZE)]
    segment_max_bytes: u64,

    #[arg(long, value_enum, default_value_t = Pool::SharedQueue)]
    pool: Pool,

    #[arg(long, default_value_t = 4)]
    threads: u32,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Engine {
    Log,
    Sled,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Pool {
    SharedQueue,
    Rayon,
}

#[tokio::main]
pub async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = ServerCommand::parse();
    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => current_dir().map_err(|e| anyhow!(e))?,
    };

    match cli.engine {
        Engine::Log => {
            let engine = LogStore::with_limits(&data_dir, cli.max_value_bytes, cli.segment_max_bytes)?;
            serve_with_pool(engine, cli).await
        }
        Engine::Sled => {
            let engine = SledStore::with_limit(&data_dir, cli.max_value_bytes)?;
            serve_with_pool(engine, cli).await
        }
    }
}

async fn serve_with_pool<E: BlobEngine>(engine: E, cli: ServerCommand) -> Result<()> {
    match cli.pool {
        Pool::SharedQueue => {
            let pool = SharedQueueThreadPool::new(cli.threads)?;
            serve(engine, pool, cli).await
        }
        Pool::Rayon => {
            let pool = RayonThreadPool::new(cli.threads)?;
            serve(engine, pool, cli).await
        }
    }
}

async fn serve<E: BlobEngine, P: ThreadPool>(engine: E, pool: P, cli: ServerCommand) -> Result<()> {
    let flags = FeatureFlags::from_enabled(cli.features);
    let access: Box<dyn AccessPolicy> = if cli.allow_anonymous {
        Box::new(AllowAll)
    } else {
        if cli.api_tokens.is_empty() {
            log::warn!("no api tokens configured, every request will be denied");
        }
        Box::new(TokenPolicy::new(cli.api_tokens))
    };

    let service = KvService::new(engine, pool, flags, access).with_route_base(&cli.route_base);
    Server::new(service)?.serve(cli.listen_addr).await
}
