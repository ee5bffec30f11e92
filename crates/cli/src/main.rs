use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "herald", about = "Herald — multi-provider messaging gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    // Gateway arguments (used when no subcommand is provided, or with `gateway`)
    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Custom config directory (overrides default ~/.config/herald/).
    #[arg(long, global = true, env = "HERALD_CONFIG_DIR")]
    config_dir: Option<std::path::PathBuf>,
    /// Custom data directory (overrides default data dir).
    #[arg(long, global = true, env = "HERALD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Gateway,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Channel management.
    Channels {
        #[command(subcommand)]
        action: ChannelAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML (secrets unexpanded).
    Show,
    /// Print the path the config would be loaded from.
    Path,
}

#[derive(Subcommand)]
enum ChannelAction {
    /// List channel accounts in the store.
    List,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "herald starting");

    match cli.command {
        // Default: start the gateway when no subcommand is provided.
        None | Some(Commands::Gateway) => {
            herald_gateway::start_gateway(cli.bind, cli.port, cli.config_dir, cli.data_dir).await
        },
        Some(Commands::Config { action }) => match action {
            ConfigAction::Show => {
                let config = herald_config::discover_and_load(cli.config_dir.as_deref());
                println!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            },
            ConfigAction::Path => {
                println!("{}", herald_config::find_or_default_config_path().display());
                Ok(())
            },
        },
        Some(Commands::Channels { action }) => match action {
            ChannelAction::List => {
                use herald_channels::store::ChannelStore;

                let data_dir = cli.data_dir.unwrap_or_else(herald_config::data_dir);
                let db_path = data_dir.join("herald.db");
                let pool = sqlx::SqlitePool::connect(&format!(
                    "sqlite:{}?mode=rwc",
                    db_path.display()
                ))
                .await?;
                herald_store::init_all(&pool).await?;

                let store = herald_store::SqliteChannelStore::new(pool);
                let channels = store.list().await?;
                if channels.is_empty() {
                    println!("no channels configured");
                }
                for channel in channels {
                    println!(
                        "{}  {}  {}{}",
                        channel.account_id,
                        channel.kind,
                        channel.status.as_str(),
                        if channel.is_default { "  (default)" } else { "" },
                    );
                }
                Ok(())
            },
        },
    }
}
