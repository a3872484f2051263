// ABOUTME: blessclient entry point: parse flags, wire the request flow, map errors to exit codes.
// ABOUTME: Safe to run from ssh_config; nothing but --print-cert output goes anywhere but stderr.

use anyhow::{Context, Result};
use bless_aws::{
    load_base_config, AwsIdentity, CredentialSource, Interactivity, MfaCredentialProvider,
    MfaPrompt,
};
use bless_client::{AwsRegionConnector, CertificateRequester, ClientError, Config, Outcome};
use bless_core::{CacheLock, JsonCache, RequestContext, SystemClock};
use bless_ssh::{
    check_key_type_and_client_version, print_certificate, AgentKeyManager, FileKeyManager,
    FreshnessPolicy, KeyFiles, KeyManager, SocketAgent,
};
use clap::{Parser, Subcommand};
use dialoguer::console::Term;
use dialoguer::Password;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};

/// Exit status telling wrappers to run `blessclient login` interactively.
const LOGIN_REQUIRED_EXIT: u8 = 2;

#[derive(Parser)]
#[command(name = "blessclient")]
#[command(about = "Short-lived SSH certificates from a BLESS signer")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "BLESSCLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a certificate unless a fresh one is installed
    Run {
        /// Request a new certificate even if the current one is fresh
        #[arg(long)]
        force: bool,

        /// Print the resulting certificate to stderr
        #[arg(long)]
        print_cert: bool,
    },

    /// Prompt for MFA and cache session credentials and a kmsauth token
    Login,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    bless_log::init(cli.verbose);

    let result = match cli.command {
        Commands::Run { force, print_cert } => run(cli.config, force, print_cert).await,
        Commands::Login => login(cli.config).await,
        Commands::Version => {
            println!("blessclient {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if is_login_required(&e) => {
            eprintln!("Session credentials are missing or expired.");
            eprintln!("Run 'blessclient login' from a terminal, then retry.");
            ExitCode::from(LOGIN_REQUIRED_EXIT)
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn is_login_required(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ClientError>(),
        Some(ClientError::LoginRequired)
    )
}

/// Everything a command needs once config is loaded.
struct Session {
    config: Arc<Config>,
    ctx: RequestContext,
    requester: CertificateRequester,
}

impl Session {
    async fn open(config_path: Option<PathBuf>, interactivity: Interactivity) -> Result<Self> {
        let config = Arc::new(Config::load(config_path.as_deref())?);

        let ctx = RequestContext::new().with_timeout(config.request_timeout());
        let cancel = ctx.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupted, cancelling request");
                cancel.cancel();
            }
        });

        let cache_dir = config.cache_dir()?;
        let lock = Arc::new(CacheLock::new(&cache_dir).context("could not prepare cache dir")?);

        let first_region = config.lambda.regions.first().map(|r| r.aws_region.as_str());
        let base = load_base_config(config.client.aws_user_profile.as_deref(), first_region).await;

        let credentials: Option<Arc<dyn CredentialSource>> = if config.client.use_mfa {
            let identity = Arc::new(AwsIdentity::new(&base));
            let provider = MfaCredentialProvider::new(
                JsonCache::new(config.session_cache_path()?, lock.clone()),
                identity.clone(),
                identity,
                mfa_prompt(),
                interactivity,
            )
            .with_session_secs(config.client.mfa_session_secs);
            Some(Arc::new(provider))
        } else {
            None
        };

        let connector = Arc::new(AwsRegionConnector::new(base, &config));
        let requester =
            CertificateRequester::new(config.clone(), credentials, connector, lock);

        Ok(Self {
            config,
            ctx,
            requester,
        })
    }

    async fn key_manager(&self) -> Result<Box<dyn KeyManager>> {
        if self.config.client.update_ssh_agent {
            let agent = SocketAgent::from_env().await?;
            debug!(socket = %agent.path().display(), "Using ssh-agent");
            return Ok(Box::new(AgentKeyManager::new(agent, Arc::new(SystemClock))));
        }

        let files = KeyFiles::new(&self.config.ssh_private_key_path());
        Ok(Box::new(FileKeyManager::new(
            files,
            freshness_policy(&self.config),
            Arc::new(SystemClock),
        )))
    }
}

/// Principals are only known up front when configured or the username is pinned.
fn freshness_policy(config: &Config) -> FreshnessPolicy {
    let principals = match &config.client.aws_username {
        Some(username) => config.remote_users(username),
        None => config.client.remote_users.clone(),
    };
    let validate = config.validate_principals() && !principals.is_empty();
    if !validate {
        debug!("Not checking certificate principals");
    }
    FreshnessPolicy::new(principals, &config.client.bastion_ips).validate_principals(validate)
}

fn mfa_prompt() -> MfaPrompt {
    Arc::new(|| {
        Password::new()
            .with_prompt("MFA code")
            .interact_on(&Term::stderr())
            .map(|code| code.trim().to_string())
            .map_err(std::io::Error::other)
    })
}

async fn run(config_path: Option<PathBuf>, force: bool, print_cert: bool) -> Result<()> {
    let session = Session::open(config_path, Interactivity::NonInteractive).await?;
    let mut keys = session.key_manager().await?;

    let outcome = session
        .requester
        .run(&session.ctx, keys.as_mut(), force)
        .await?;

    if !session.config.client.update_ssh_agent {
        let files = KeyFiles::new(&session.config.ssh_private_key_path());
        if let Ok(key) = files.load_key() {
            check_key_type_and_client_version(&key);
        }
    }

    let certificate = match outcome {
        Outcome::Issued {
            region,
            certificate,
        } => {
            info!(region = %region, "Certificate issued");
            Some(*certificate)
        }
        Outcome::AlreadyFresh => {
            info!("Certificate still fresh");
            if print_cert {
                keys.list_certificates().await?.into_iter().next()
            } else {
                None
            }
        }
    };

    if print_cert {
        if let Some(cert) = certificate {
            print_certificate(&cert, std::io::stderr().lock())?;
        }
    }
    Ok(())
}

async fn login(config_path: Option<PathBuf>) -> Result<()> {
    let session = Session::open(config_path, Interactivity::Interactive).await?;
    let region = session.requester.prime_token(&session.ctx).await?;
    eprintln!("Logged in; kmsauth token cached for {region}.");
    Ok(())
}
