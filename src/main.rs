//! db-lookout - query monitoring data from configured database hosts.

use std::sync::Arc;

use db_lookout::cli::{Cli, Command, QueryArgs};
use db_lookout::config::{hosts_from_env_values, Config};
use db_lookout::db::{row, HttpTransport, MockTransport, QueryTransport};
use db_lookout::error::Result;
use db_lookout::logging;
use db_lookout::response::ResponseContext;
use db_lookout::service::DataService;
use tracing::{error, info, warn};

/// Address used for the in-memory host when none is configured.
const MOCK_HOST: &str = "http://localhost:8123";

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    logging::init_stderr_logging();

    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            error!("{}: {}", e.category(), e);
            std::process::exit(1);
        }
    }
}

/// Runs the CLI. Returns `Ok(false)` when a query produced an error envelope.
async fn run() -> Result<bool> {
    let cli = Cli::parse_args();

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    config.apply_env_defaults();

    let transport: Arc<dyn QueryTransport> = if cli.mock {
        if config.hosts.is_empty() {
            config.hosts = hosts_from_env_values(MOCK_HOST, None, None, Some("mock"));
        }
        Arc::new(demo_transport())
    } else {
        Arc::new(HttpTransport::with_timeout(config.transport.timeout_secs)?)
    };

    let service = DataService::from_config(&config, transport)?;

    match &cli.command {
        Command::Hosts => {
            if service.hosts().is_empty() {
                warn!("No database hosts configured");
            }
            for host in service.hosts() {
                println!("{}\t{}\t{}", host.id, host.name, host.address);
            }
            Ok(true)
        }
        Command::Query(args) => run_query(&service, args).await,
    }
}

async fn run_query(service: &DataService, args: &QueryArgs) -> Result<bool> {
    let request = args.to_request()?;
    let ctx = ResponseContext::new("cli/query", "RUN");
    let response = service.respond(&request, ctx).await;

    let body = serde_json::to_string_pretty(&response.body.to_json())
        .unwrap_or_else(|e| format!("{{\"success\":false,\"error\":\"{e}\"}}"));
    println!("{body}");

    Ok(response.is_success())
}

/// In-memory server used by `--mock`.
fn demo_transport() -> MockTransport {
    MockTransport::new()
        .with_version("24.3.1.2672")
        .with_table("system", "backup_log")
        .with_table("system", "error_log")
        .with_rows(
            "system.disks",
            vec![row([("name", "default"), ("path", "/var/lib/clickhouse/")])],
        )
        .with_rows(
            "monitoring_dashboard_queries",
            vec![row([("query", "SELECT 1")])],
        )
        .with_rows(
            "system.processes",
            vec![row([("query_id", "demo-1"), ("user", "default")])],
        )
}
