//! claimnet-provision - one-shot identity provisioning
//!
//! `bootstrap` enrolls the registrar identity (idempotent). `register`
//! mints an operational identity under an existing registrar. Exits 0 on
//! success or when already provisioned, 1 on any failure.

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use claimnet_fabric::{
    ConnectionProfile, DEFAULT_AFFILIATION, EnrollmentRequest, HttpCertificateAuthority,
    IdentityRegistrar, InsecureTls, NewIdentity, ProvisionOutcome, Provisioner,
};
use claimnet_wallet::{FileCredentialStore, IdentityAttributes, Label, Role};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// claimnet-provision - enroll and register ledger identities
#[derive(Parser, Debug)]
#[command(name = "claimnet-provision")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Enroll the registrar identity unless it is already in the wallet
    Bootstrap {
        #[command(flatten)]
        network: NetworkArgs,

        /// Wallet label for the registrar
        #[arg(long, default_value = "admin")]
        label: String,

        /// Enrollment id known to the CA
        #[arg(long, default_value = "admin")]
        enrollment_id: String,

        /// Enrollment secret
        #[arg(long, env = "CA_ADMIN_SECRET", hide_env_values = true)]
        secret: String,
    },

    /// Register and enroll an operational identity
    Register {
        #[command(flatten)]
        network: NetworkArgs,

        /// Wallet label of the registrar identity
        #[arg(long, default_value = "admin")]
        registrar: String,

        /// Wallet label (and enrollment id) of the new identity
        #[arg(long)]
        id: String,

        /// Role attribute (patient, doctor, hospital, insurer)
        #[arg(long)]
        role: Role,

        /// Stable user id attribute
        #[arg(long)]
        user_uuid: String,

        /// CA affiliation
        #[arg(long, default_value = DEFAULT_AFFILIATION)]
        affiliation: String,
    },
}

#[derive(Args, Debug)]
struct NetworkArgs {
    /// Connection profile JSON
    #[arg(long)]
    profile: PathBuf,

    /// Organization in the connection profile
    #[arg(long, default_value = "Org1")]
    org: String,

    /// Wallet directory
    #[arg(long, default_value = "wallet")]
    wallet: PathBuf,

    /// Honour `httpOptions.verify: false` from the profile
    #[arg(long)]
    allow_insecure_tls: bool,
}

/// Loaded network context shared by both commands.
struct Network {
    store: Arc<FileCredentialStore>,
    ca: Arc<HttpCertificateAuthority>,
    msp_id: String,
}

impl NetworkArgs {
    async fn load(&self) -> Result<Network> {
        let profile = ConnectionProfile::from_path(&self.profile)
            .await
            .with_context(|| format!("loading {}", self.profile.display()))?;
        let insecure = if self.allow_insecure_tls { InsecureTls::Allow } else { InsecureTls::Deny };
        let ca = HttpCertificateAuthority::new(profile.ca_config(&self.org, insecure)?)
            .context("configuring CA client")?;
        let store = FileCredentialStore::open(&self.wallet)
            .await
            .with_context(|| format!("opening wallet {}", self.wallet.display()))?;

        Ok(Network {
            store: Arc::new(store),
            ca: Arc::new(ca),
            msp_id: profile.msp_id(&self.org)?.to_owned(),
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("provisioning failed: {e:#}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Bootstrap { network, label, enrollment_id, secret } => {
            let label = Label::new(label)?;
            let Network { store, ca, msp_id } = network.load().await?;

            let outcome = Provisioner::new(store, ca, msp_id)
                .bootstrap(&label, &EnrollmentRequest::new(enrollment_id, secret))
                .await
                .context("bootstrapping registrar")?;

            match outcome {
                ProvisionOutcome::Enrolled(_) => tracing::info!(%label, "registrar enrolled"),
                ProvisionOutcome::AlreadyProvisioned(_) => {
                    tracing::info!(%label, "registrar already provisioned, nothing to do")
                },
            }
        },
        Commands::Register { network, registrar, id, role, user_uuid, affiliation } => {
            let registrar = Label::new(registrar)?;
            let new = NewIdentity::new(Label::new(id)?, IdentityAttributes::new(role, user_uuid))
                .with_affiliation(affiliation);
            let Network { store, ca, .. } = network.load().await?;

            let identity = IdentityRegistrar::new(store, ca)
                .register_and_enroll(&registrar, &new)
                .await
                .with_context(|| format!("registering {}", new.label))?;

            tracing::info!(label = %identity.label, %role, "operational identity provisioned");
        },
    }
    Ok(())
}
