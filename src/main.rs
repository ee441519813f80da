use clap::{Parser, Subcommand};
use kvtree::{command, demo, errors, http, session::Session, shell};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "kvtree",
    version = VERSION,
    about = "Tiny key-value database on an in-memory B+ tree."
)]
struct Cli {
    /// Store file. The database is kept in memory only when omitted.
    #[arg(long, env = "KVTREE_DB", global = true)]
    db: Option<PathBuf>,

    /// Tree order (maximum keys per node) for a new store.
    #[arg(long, env = "KVTREE_ORDER", default_value_t = 4, global = true)]
    order: usize,

    /// Execute a command and exit.
    #[arg(short, long)]
    command: Option<String>,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Interactive shell (default).
    Shell,
    /// Walk through every feature on throwaway databases.
    Demo,
    /// Serve the HTTP API.
    Serve {
        #[arg(long, env = "KVTREE_PORT", default_value_t = 5000)]
        port: u16,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "kvtree=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<(), errors::Error> {
    if let Some(line) = cli.command {
        let mut session = Session::open(cli.db, cli.order)?;
        let result = command::run(&mut session.database, &line)?;
        println!("{}", result.render());
        return session.close();
    }

    match cli.mode.unwrap_or(Mode::Shell) {
        Mode::Shell => shell::start(Session::open(cli.db, cli.order)?),
        Mode::Demo => demo::run(&mut std::io::stdout().lock()),
        Mode::Serve { port } => {
            let session = Session::open(cli.db, cli.order)?;
            let addr = SocketAddr::from(([127, 0, 0, 1], port));
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(http::serve(addr, session.database))
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    info!(version = VERSION, "Starting kvtree");

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
