use chrono::Local;
use clap::Parser;
use log::{error, info};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use wgprov::api::RelayApiClient;
use wgprov::config::{ClientOptions, DEFAULT_API_BASE};
use wgprov::http::UreqHttpClient;
use wgprov::identity::IdentityStore;
use wgprov::profile::ProfileWriter;
use wgprov::reconcile::{ActivationPrompt, EntitlementReconciler, ReconcileError};

const IDENTITY_FILE: &str = "wgprov-identity.json";
const PROFILE_FILE: &str = "wgprov-profile.conf";

const EXIT_FAILURE: u8 = 1;
const EXIT_TERMS_DECLINED: u8 = 2;
const EXIT_DEVICE_UNREGISTERED: u8 = 3;
const EXIT_KEY_PROVIDER: u8 = 4;

#[derive(Parser)]
#[command(
    name = "wgprov",
    about = "Registers a device with the WARP relay service and emits a WireGuard profile"
)]
struct Cli {
    /// Directory holding the identity file and the emitted profile
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Accept the relay service's terms without prompting
    #[arg(long)]
    accept_tos: bool,

    /// Override the registration service base URL
    #[arg(long, default_value = DEFAULT_API_BASE)]
    api_url: String,

    /// Disable TLS verification (allows sniffing the registration traffic)
    #[arg(long)]
    insecure: bool,
}

fn confirm(question: &str) -> bool {
    print!("{question} [y/N] ");
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes")
}

struct StdinPrompt;

impl ActivationPrompt for StdinPrompt {
    fn confirm_activation(&self) -> bool {
        confirm("This account has Warp+ but the device is inactive. Activate it?")
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{:<5}] {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    let cli = Cli::parse();

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to build tokio runtime: {e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> ExitCode {
    if let Err(e) = tokio::fs::create_dir_all(&cli.dir).await {
        error!("failed to create data directory {}: {e}", cli.dir.display());
        return ExitCode::from(EXIT_FAILURE);
    }

    let store = IdentityStore::new(cli.dir.join(IDENTITY_FILE));

    // One-time terms acceptance, only before the first registration.
    let has_identity = tokio::fs::try_exists(store.path()).await.unwrap_or(false);
    if !has_identity
        && !cli.accept_tos
        && !confirm("Registering requires accepting Cloudflare's WARP terms of service (https://www.cloudflare.com/application/terms/). Continue?")
    {
        error!("terms of service declined");
        return ExitCode::from(EXIT_TERMS_DECLINED);
    }

    let options = ClientOptions {
        api_base: cli.api_url,
        verify_tls: !cli.insecure,
    };
    let http = Arc::new(UreqHttpClient::new(&options));
    let api = RelayApiClient::new(http, options);
    let prompt = StdinPrompt;
    let reconciler = EntitlementReconciler::new(&api, &store, &prompt);

    let outcome = match reconciler.run().await {
        Ok(outcome) => outcome,
        Err(e @ ReconcileError::DeviceNotRegistered) => {
            error!("{e}");
            return ExitCode::from(EXIT_DEVICE_UNREGISTERED);
        }
        Err(ReconcileError::Key(e)) => {
            error!("key generation failed: {e}");
            return ExitCode::from(EXIT_KEY_PROVIDER);
        }
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let profile_path = cli.dir.join(PROFILE_FILE);
    if let Err(e) = ProfileWriter::new(&profile_path)
        .write(&outcome.identity, &outcome.config)
        .await
    {
        error!("{e}");
        return ExitCode::from(EXIT_FAILURE);
    }

    info!("account type: {}", outcome.config.account_type);
    info!("warp+ enabled: {}", outcome.config.warp_plus_enabled);
    info!("device active: {}", outcome.device_active);
    if outcome.activation_recommended && !outcome.device_active {
        info!("device activation was recommended but declined; re-run to activate");
    }
    info!("wrote WireGuard profile to {}", profile_path.display());
    ExitCode::SUCCESS
}
