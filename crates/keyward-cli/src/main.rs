mod assets;
mod cli;
mod config;
mod output;
mod storage;
mod users;

use crate::cli::ConfigCommand;
use clap::Parser;
use color_eyre::Result;
use keyward_core::{storage::RecordStore, FieldCipher};
use keyward_storage::key_file::KeyMaterializer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        cli::Command::Version => print_version(),
        cli::Command::Health => run_health_check(&config).await?,
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
        cli::Command::AdminUser(cmd) => users::handle_admin(cmd, &config).await?,
        cli::Command::SystemUser(cmd) => users::handle_system(cmd, &config).await?,
        cli::Command::Asset(cmd) => assets::handle_asset(cmd, &config).await?,
        cli::Command::Group(cmd) => assets::handle_group(cmd, &config).await?,
        cli::Command::Cluster(cmd) => assets::handle_cluster(cmd, &config).await?,
    }

    Ok(())
}

fn init_tracing() {
    // Logs go to stderr so command output on stdout stays machine-readable.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("keyward {}", env!("CARGO_PKG_VERSION"));
}

/// Checks the cipher, the record store and the key directory.
async fn run_health_check(config: &config::Config) -> Result<()> {
    let signer = storage::signer_from_config(config).await?;
    run_cipher_health(&signer)?;
    println!("Cipher: ok (key {})", signer.key_id());

    let store = storage::store_from_config(config)?;
    run_store_health(&store).await?;
    println!("Storage: ok");

    let materializer = storage::materializer_from_config(config)?;
    run_key_dir_health(&materializer)?;
    println!("Key directory: ok ({})", materializer.dir().display());
    Ok(())
}

fn run_cipher_health(cipher: &dyn FieldCipher) -> Result<()> {
    let blob = cipher.sign("health")?;
    if cipher.unsign(&blob)? != "health" {
        color_eyre::eyre::bail!("cipher round-trip failed");
    }
    Ok(())
}

async fn run_store_health<S: RecordStore>(store: &S) -> Result<()> {
    let probe_key = "health/probe";
    let payload = b"ok";
    store.put(probe_key, payload).await?;
    let round_trip = store.get(probe_key).await?;
    store.delete(probe_key).await?;

    if round_trip != payload {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

fn run_key_dir_health(materializer: &KeyMaterializer) -> Result<()> {
    materializer.ensure_dir()?;
    let probe = tempfile::NamedTempFile::new_in(materializer.dir())?;
    probe.close()?;
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
