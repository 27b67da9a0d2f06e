use clap::Parser;
use tracing::{error, info};

use creditledger_infra::store::RedisAtomicStore;
use creditledger_infra::{LedgerClient, LedgerConfig, ReconcileMode};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    creditledger_observability::tracing::init(cli.log_format.into());

    let mut config = LedgerConfig::from_env()?;
    if let Some(url) = cli.redis_url.clone() {
        config.redis_url = url;
    }

    let file_contents = match &cli.users_file {
        Some(path) => Some(std::fs::read_to_string(path)?),
        None => None,
    };
    let users = cli::collect_user_ids(&cli.users, file_contents.as_deref())?;
    if users.is_empty() {
        anyhow::bail!("no user ids given");
    }

    let mode = if cli.rebuild {
        ReconcileMode::Repair
    } else {
        ReconcileMode::VerifyOnly
    };
    info!(users = users.len(), ?mode, "starting reconciliation");

    let store = RedisAtomicStore::connect(&config.redis_url).await?;
    let client = LedgerClient::new(store, config);
    let report = client.reconcile_users(&users, mode).await;

    for (user_id, err) in &report.failures {
        error!(user_id = %user_id, error = %err, "reconciliation failed");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}
