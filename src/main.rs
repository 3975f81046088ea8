//! aohttp - tunnel a byte stream through an HTTP/1.1 upgrade

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use aohttp::app::{Acceptor, Initiator};
use aohttp::config::{ClientConfig, Config, ServerConfig, ServerTlsSettings};
use aohttp::error::{Error, Result};

#[derive(Parser, Debug)]
#[command(name = "aohttp", version)]
#[command(about = "Tunnel a byte stream through an HTTP/1.1 upgrade", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print the default configuration and exit
    #[arg(long)]
    gen_config: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Accept one local connection and tunnel it to a server
    Client(ClientArgs),

    /// Accept tunnels and bridge them to a local backend
    Server(ServerArgs),
}

#[derive(ClapArgs, Debug)]
struct ClientArgs {
    /// Local address to bind on
    #[arg(long)]
    listen: Option<String>,

    /// Local port to bind on
    #[arg(long)]
    listen_port: Option<u16>,

    /// Remote server
    #[arg(long)]
    target: Option<String>,

    /// Remote server port
    #[arg(long)]
    port: Option<u16>,

    /// Remote path
    #[arg(long)]
    path: Option<String>,

    /// Enables ssl
    #[arg(long)]
    ssl: bool,

    /// Fake the host header (empty uses the target)
    #[arg(long)]
    host: Option<String>,

    /// Upgrade token to request
    #[arg(long)]
    upgrade: Option<String>,

    /// TLS server name (defaults to the target)
    #[arg(long)]
    sni: Option<String>,

    /// Skip certificate verification
    #[arg(long)]
    insecure: bool,
}

impl ClientArgs {
    fn apply(self, config: &mut ClientConfig) {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(port) = self.listen_port {
            config.listen_port = port;
        }
        if let Some(target) = self.target {
            config.target = target;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(path) = self.path {
            config.path = path;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(upgrade) = self.upgrade {
            config.upgrade = upgrade;
        }
        if let Some(sni) = self.sni {
            config.sni = sni;
        }
        config.ssl |= self.ssl;
        config.allow_insecure |= self.insecure;
    }
}

#[derive(ClapArgs, Debug)]
struct ServerArgs {
    /// Bind address
    #[arg(long)]
    baddr: Option<String>,

    /// Bind port
    #[arg(long)]
    bport: Option<u16>,

    /// Backend port on the loopback interface
    #[arg(long)]
    port: Option<u16>,

    /// Accepted path
    #[arg(long)]
    path: Option<String>,

    /// Accepted method
    #[arg(long)]
    method: Option<String>,

    /// Accepted upgrade token
    #[arg(long)]
    upgrade: Option<String>,

    /// Answer every rejection with 404
    #[arg(long)]
    hidden: bool,

    /// TLS certificate chain (PEM)
    #[arg(long, requires = "key")]
    cert: Option<String>,

    /// TLS private key (PEM)
    #[arg(long, requires = "cert")]
    key: Option<String>,
}

impl ServerArgs {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(addr) = self.baddr {
            config.bind_address = addr;
        }
        if let Some(port) = self.bport {
            config.bind_port = port;
        }
        if let Some(port) = self.port {
            config.target_port = port;
        }
        if let Some(path) = self.path {
            config.path = path;
        }
        if let Some(method) = self.method {
            config.method = method;
        }
        if let Some(upgrade) = self.upgrade {
            config.upgrade = upgrade;
        }
        config.hidden |= self.hidden;
        if let (Some(certificate_file), Some(key_file)) = (self.cert, self.key) {
            config.tls = Some(ServerTlsSettings {
                certificate_file,
                key_file,
            });
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("aohttp: {}", e);
            // Setup failures and tunnel failures are told apart by status
            if e.is_fatal() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(args: Args) -> Result<()> {
    if args.gen_config {
        let json = serde_json::to_string_pretty(&Config::default())
            .map_err(|e| Error::Config(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    init_logging(args.log_level.as_deref().unwrap_or(&config.log.level))?;

    let command = args
        .command
        .ok_or_else(|| Error::Config("no role given, use `client` or `server`".into()))?;

    info!("aohttp v{} starting...", env!("CARGO_PKG_VERSION"));

    let rt = tokio::runtime::Runtime::new()?;
    match command {
        Commands::Client(client) => {
            client.apply(&mut config.client);
            rt.block_on(async {
                let initiator = Initiator::new(config.client)?;
                initiator.run().await.map(|_| ())
            })?;
        }
        Commands::Server(server) => {
            server.apply(&mut config.server);
            rt.block_on(async {
                let acceptor = Acceptor::bind(&config.server).await?;
                acceptor.serve().await
            })?;
        }
    }

    info!("Goodbye!");
    Ok(())
}

fn init_logging(configured: &str) -> Result<()> {
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .or_else(|| configured.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Config(format!("Failed to set tracing subscriber: {}", e)))
}
