//! AREF CLI
//!
//! Adaptive recon orchestrator: runs passive, active, cloud, scoring and plugin
//! stages against a target and merges their output into one record.

mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use aref_core::{
    CoreError, CredentialSet, CredentialVault, Profile, ProfileSet, StageCache, Target, Workspace,
    PASSPHRASE_ENV, SHODAN_KEY_ENV,
};
use aref_net::{create_http_client, DnsResolver, HttpConfig};
use aref_runtime::{Orchestrator, ReconPlan, StatusPrinter, Verbosity};
use aref_stages::{
    builtin_plugins, ActiveRecon, CloudRecon, FileReportEmitter, HttpCrawler, MlAnalyzer,
    PassiveRecon, PluginRegistry, ShodanClient, TcpPortScanner, WhoisClient,
};

use logging::{init_logging, LogConfig};

#[derive(Parser)]
#[command(name = "aref")]
#[command(author, version, about = "AREF: Adaptive Recon and Exploitation Framework", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Working directory holding config/, data/, reports/ and logs/
    #[arg(long, global = true, env = "AREF_WORKDIR", default_value = ".")]
    workdir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run reconnaissance against a target
    Recon(ReconArgs),

    /// Encrypt config/credentials.json into config/credentials.enc
    EncryptCreds,
}

#[derive(Args)]
struct ReconArgs {
    /// Target domain or IPv4 address
    #[arg(long)]
    target: String,

    /// Run passive recon (the default when no other stage is selected)
    #[arg(long)]
    passive: bool,

    /// Run active recon (port scan and web crawl)
    #[arg(long)]
    active: bool,

    /// Run cloud inventory recon
    #[arg(long)]
    cloud: bool,

    /// Score the target from passive results
    #[arg(long)]
    ml: bool,

    /// Write a report
    #[arg(long)]
    report: bool,

    /// Config profile
    #[arg(long, default_value = "default")]
    profile: String,

    /// Run a specific plugin
    #[arg(long)]
    plugin: Option<String>,

    /// Verbose output
    #[arg(long)]
    verbose: bool,

    /// Minimal output
    #[arg(long)]
    quiet: bool,
}

impl ReconArgs {
    fn plan(&self) -> ReconPlan {
        ReconPlan {
            passive: self.passive,
            active: self.active,
            cloud: self.cloud,
            ml: self.ml,
            report: self.report,
            plugin: self.plugin.clone(),
        }
    }

    fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}

fn log_config(workspace: &Workspace, verbosity: Verbosity) -> LogConfig {
    let config = LogConfig::new().file(workspace.log_file());
    match verbosity {
        Verbosity::Verbose => config.level("debug"),
        Verbosity::Normal | Verbosity::Quiet => config,
    }
}

fn required_env(name: &'static str) -> Result<String, CoreError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or(CoreError::MissingEnv(name))
}

fn load_profiles(workspace: &Workspace) -> Result<ProfileSet> {
    let path = workspace.profiles_file();
    if !path.exists() {
        warn!("{} not found, using built-in defaults", path.display());
        return Ok(ProfileSet::default());
    }
    Ok(ProfileSet::from_file(&path)?)
}

fn load_credentials(workspace: &Workspace, passphrase: &str) -> Result<CredentialSet> {
    let vault = CredentialVault::new(workspace.credentials_encrypted());
    if !vault.path().exists() {
        warn!(
            "{} not found, running without provider credentials",
            vault.path().display()
        );
        return Ok(CredentialSet::default());
    }
    Ok(vault.decrypt(passphrase)?)
}

async fn recon(workspace: &Workspace, args: &ReconArgs, status: StatusPrinter) -> Result<ExitCode> {
    let target = Target::parse(&args.target)?;

    let profiles = load_profiles(workspace)?;
    let config = profiles.resolve(&args.profile);

    let passphrase = required_env(PASSPHRASE_ENV)?;
    let credentials = load_credentials(workspace, &passphrase)?;
    let profile = Arc::new(Profile::new(&args.profile, config, credentials)?);

    let shodan_key = required_env(SHODAN_KEY_ENV)?;

    info!(
        "Profile '{}': timeout {:?}, {} threads, cache TTL {:?}",
        profile.name, profile.timeout, profile.threads, profile.cache_ttl
    );

    let http = create_http_client(&HttpConfig::from_profile(&profile))
        .context("Failed to build HTTP client")?;
    let resolver = DnsResolver::new(profile.timeout);

    let plugins = PluginRegistry::builder()
        .register_all(builtin_plugins(http.clone(), resolver.clone()))
        .build()
        .context("Failed to load plugins")?;

    let passive = PassiveRecon::new(
        Arc::new(ShodanClient::new(http.clone(), &shodan_key, resolver.clone())),
        Arc::new(WhoisClient::new(http.clone())),
        Arc::new(resolver.clone()),
        StageCache::new(workspace.cache_dir()),
    );
    let active = ActiveRecon::new(
        Arc::new(TcpPortScanner::new(resolver)),
        Arc::new(HttpCrawler::new(http.clone())),
    );

    let orchestrator = Orchestrator::new(profile)
        .with_passive(Arc::new(passive))
        .with_active(Arc::new(active))
        .with_cloud(Arc::new(CloudRecon::with_default_clients(http.clone())))
        .with_ml(Arc::new(MlAnalyzer::with_default_feeds(http)))
        .with_plugins(plugins)
        .with_reporter(Arc::new(FileReportEmitter::new(workspace.reports_dir())))
        .with_status(status);

    let record = orchestrator.run(&target, &args.plan()).await;

    if record.is_empty() {
        status.line("Nothing to do. Use --help for options.");
        return Ok(ExitCode::FAILURE);
    }

    info!(
        "Recorded stages for {}: {}",
        target,
        record.stage_names().collect::<Vec<_>>().join(", ")
    );
    Ok(ExitCode::SUCCESS)
}

fn encrypt_creds(workspace: &Workspace, status: StatusPrinter) -> Result<ExitCode> {
    let passphrase = required_env(PASSPHRASE_ENV)?;
    let vault = CredentialVault::new(workspace.credentials_encrypted());
    vault.encrypt_file(&passphrase, workspace.credentials_plain())?;
    status.line(&format!("Credentials encrypted to {}", vault.path().display()));
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let workspace = Workspace::new(cli.workdir.clone());

    let verbosity = match &cli.command {
        Commands::Recon(args) => args.verbosity(),
        Commands::EncryptCreds => Verbosity::Normal,
    };
    let status = StatusPrinter::new(verbosity);

    let _guard = match init_logging(log_config(&workspace, verbosity)) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("[-] {e:#}");
            None
        }
    };

    let outcome = match &cli.command {
        Commands::Recon(args) => recon(&workspace, args, status).await,
        Commands::EncryptCreds => encrypt_creds(&workspace, status),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            status.fatal(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
