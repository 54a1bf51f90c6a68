//! fleetpatch
//!
//! Group-by-group patch campaigns over SSH with resumable progress and
//! per-group compliance reports.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use color_eyre::Result;
use kameo::actor::Spawn;
use kameo::error::SendError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use fleetpatch_core::{
    CampaignActor, CampaignActorArgs, ExecutorFactory, FileLedgerStore, HostPipeline, LedgerStore,
    LogNotifier, Notifier, Prober, RunCampaign, Roster, pending_groups,
};

mod config;
mod factory;
mod mail;
mod recipients;
mod roster;

use config::{Config, LogConfig, NotifyMode};
use factory::DefaultExecutorFactory;
use mail::SendmailNotifier;
use recipients::RecipientsFile;
use roster::RosterFile;

#[derive(Parser)]
#[command(name = "fleetpatch")]
#[command(about = "Group-by-group fleet patching with compliance reports", long_about = None)]
struct Cli {
    /// Config file; defaults to FLEETPATCH_CONFIG or the usual locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Patch every group after the last completed one
    Run {
        /// Log reports instead of mailing them
        #[arg(long)]
        log_only: bool,
    },
    /// Show ledger progress and pending groups
    Status,
    /// Check whether a single host accepts sessions
    Probe {
        host: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    init_tracing(&config.log)?;

    match cli.command {
        Commands::Run { log_only } => run(config, log_only).await,
        Commands::Status => status(&config),
        Commands::Probe { host } => probe(&config, &host).await,
    }
}

fn init_tracing(log: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log.level))?;

    let writer = match &log.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(log.file.is_none())
        .with_writer(writer);

    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

/// Build the executor factory, loading the SSH identity only if a remote host needs it
fn executor_factory(config: &Config, hosts: &[String]) -> Result<Arc<dyn ExecutorFactory>> {
    let key = if hosts.iter().all(|h| DefaultExecutorFactory::is_local(h)) {
        None
    } else {
        Some(config.ssh.key_source().load()?)
    };
    Ok(Arc::new(DefaultExecutorFactory::new(config.ssh.clone(), key)))
}

fn all_hosts(roster: &dyn Roster) -> Result<Vec<String>> {
    let mut hosts = Vec::new();
    for group in roster.group_ids()? {
        hosts.extend(roster.hosts(&group)?);
    }
    Ok(hosts)
}

async fn run(config: Config, log_only: bool) -> Result<()> {
    let roster = Arc::new(RosterFile::load(&config.roster.path)?);
    let factory = executor_factory(&config, &all_hosts(roster.as_ref())?)?;

    let notifier: Arc<dyn Notifier> = match (config.notify.mode, log_only) {
        (NotifyMode::Sendmail, false) => Arc::new(SendmailNotifier::new(
            config.notify.sendmail_path.clone(),
            config.notify.use_sudo,
            config.notify.from.clone(),
        )),
        _ => Arc::new(LogNotifier),
    };

    let args = CampaignActorArgs {
        roster,
        ledger_store: Box::new(FileLedgerStore::new(
            &config.ledger.last_group_path,
            &config.ledger.counter_path,
        )),
        task: Arc::new(HostPipeline::new(factory, &config.patch)),
        worker_limit: config.patch.worker_limit,
        fleet_size: config.patch.fleet_size,
        notifier,
        recipients: Arc::new(RecipientsFile::new(&config.notify.recipients_path)),
    };

    let actor_ref = CampaignActor::spawn(args);
    let outcome = actor_ref.ask(RunCampaign).await;
    if let Err(e) = actor_ref.stop_gracefully().await {
        warn!(error = ?e, "campaign actor did not stop cleanly");
    }

    let summary = match outcome {
        Ok(summary) => summary,
        Err(SendError::HandlerError(e)) => eyre::bail!("campaign halted: {e}"),
        Err(e) => eyre::bail!("campaign actor failed: {e:?}"),
    };
    for report in &summary.reports {
        println!(
            "{:<24} hosts={:<5} successful={:<5} already_patched={:<5} compliance={:.2}%",
            report.group_id,
            report.host_count,
            report.successful_count,
            report.already_patched_unique_count,
            report.compliance_percent
        );
    }
    info!(groups = summary.groups_completed.len(), "done");
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    let roster = RosterFile::load(&config.roster.path)?;
    let store = FileLedgerStore::new(&config.ledger.last_group_path, &config.ledger.counter_path);
    let ledger = store.load()?;

    let groups = roster.group_ids()?;
    let pending = pending_groups(&groups, &ledger);
    let fleet_size = match config.patch.fleet_size {
        Some(size) => size,
        None => roster.fleet_size()?,
    };

    println!(
        "last completed group: {}",
        ledger.last_completed_group.as_deref().unwrap_or("-")
    );
    println!(
        "cumulative successes: {} of {fleet_size}",
        ledger.cumulative_success_count
    );
    println!("pending groups ({} of {}):", pending.len(), groups.len());
    for group in pending {
        println!("  {group}");
    }
    Ok(())
}

async fn probe(config: &Config, host: &str) -> Result<()> {
    let factory = executor_factory(config, &[host.to_string()])?;
    let executor = factory.create_executor(host).await?;
    let result = Prober::new(config.patch.probe)
        .probe_detailed(host, executor.as_ref())
        .await;
    if let Err(e) = executor.disconnect().await {
        debug!(host = %host, error = %e, "disconnect failed");
    }

    match result {
        Ok(()) => {
            println!("{host}: reachable");
            Ok(())
        }
        Err(failure) => Err(eyre::eyre!("{host}: {failure}")),
    }
}
