//! Demo service exposing an in-memory users API.
//!
//! ```text
//! metaroute-demo serve --addr 0.0.0.0:8080
//! metaroute-demo openapi --output api.json
//! ```

mod users;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use metaroute::dispatcher::Dispatcher;
use metaroute::logging::{init_logging, LogConfig};
use metaroute::middleware::{MetricsMiddleware, TracingMiddleware};
use metaroute::openapi::{generate, ApiDocument, Info};
use metaroute::router::{Router, RouterBuilder, RouterCell};
use metaroute::runtime_config::RuntimeConfig;
use tracing::info;

use users::UsersController;

static ROUTER: RouterCell = RouterCell::new();

#[derive(Parser)]
#[command(name = "metaroute-demo")]
#[command(about = "metaroute demo service", long_about = None)]
struct Cli {
    /// YAML runtime configuration file
    #[arg(short, long, global = true, env = "METAROUTE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the users API over HTTP
    Serve {
        /// Overrides the configured bind address
        #[arg(long)]
        addr: Option<String>,

        /// Human-readable synchronous logs
        #[arg(long, default_value_t = false)]
        dev_logs: bool,
    },
    /// Print the generated API document
    Openapi {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn router() -> Result<Arc<Router>> {
    let router = ROUTER.get_or_init(|| {
        let mut builder = RouterBuilder::new();
        builder.register_controller("/api", UsersController::default())?;
        builder.build()
    })?;
    Ok(router)
}

fn document(router: &Router) -> ApiDocument {
    generate(
        router,
        Info {
            title: "metaroute demo".to_string(),
            description: Some("In-memory users API".to_string()),
            ..Info::default()
        },
    )
}

fn serve(config: Option<PathBuf>, addr: Option<String>, dev_logs: bool) -> Result<()> {
    let log_config = if dev_logs {
        LogConfig::development()
    } else {
        LogConfig::from_env()
    };
    let _guard = init_logging(&log_config)?;

    let mut runtime = RuntimeConfig::load(config.as_deref())?;
    if let Some(addr) = addr {
        runtime.bind = addr;
    }

    let seeded = UsersController::seeded()?;
    let router = ROUTER.get_or_init(|| {
        let mut builder = RouterBuilder::new();
        builder.register_controller("/api", seeded)?;
        builder.build()
    })?;
    let document = document(&router);

    let mut dispatcher = Dispatcher::new(Arc::clone(&router));
    dispatcher.add_middleware(Arc::new(TracingMiddleware::new()));
    dispatcher.add_middleware(Arc::new(MetricsMiddleware::new()));

    let handle = metaroute::server::serve(Arc::new(dispatcher), &document, &runtime)
        .with_context(|| format!("failed to listen on {}", runtime.bind))?;
    info!(
        addr = %handle.addr(),
        routes = router.len(),
        docs_path = %runtime.docs_path,
        "metaroute demo ready"
    );
    handle
        .join()
        .map_err(|_| anyhow!("server coroutine panicked"))
}

fn print_document(output: Option<PathBuf>) -> Result<()> {
    let router = router()?;
    let json = document(&router).to_json_pretty()?;
    match output {
        Some(path) => std::fs::write(&path, json)
            .with_context(|| format!("cannot write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { addr, dev_logs } => serve(cli.config, addr, dev_logs),
        Commands::Openapi { output } => print_document(output),
    }
}
