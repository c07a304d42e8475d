use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gaze_core::TemplateStore;
use gaze_engine::Settings;
use gaze_store::{validate_pin, SecureCredentialStore};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gaze", about = "Gaze face authentication administration")]
struct Cli {
    /// Credential store directory (default: $GAZE_DATA_DIR or ~/.local/share/gaze/secure)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show store status
    Status,
    /// List enrolled identities
    List,
    /// Remove an enrolled identity
    Remove {
        /// Identity name
        name: String,
    },
    /// Manage the fallback PIN
    Pin {
        #[command(subcommand)]
        action: PinAction,
    },
    /// Show or change authentication settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Delete all templates, the PIN and the settings
    Reset {
        /// Required; there is no undo
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum PinAction {
    /// Set or replace the PIN
    Set {
        /// PIN to store (prompted on stdin when omitted)
        #[arg(long)]
        pin: Option<String>,
    },
    /// Remove the PIN
    Remove,
    /// Check a PIN against the stored one
    Verify {
        #[arg(long)]
        pin: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings as JSON
    Show,
    /// Set one setting, e.g. `similarity_threshold 0.65`
    Set { key: String, value: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(|| Settings::from_env().data_dir);
    tracing::debug!(dir = %data_dir.display(), "opening credential store");
    let store = SecureCredentialStore::open(&data_dir)
        .with_context(|| format!("failed to open credential store at {}", data_dir.display()))?;

    let stdin = io::stdin();
    run(&store, cli.command, &mut stdin.lock(), &mut io::stdout())
}

/// Execute one command. PIN prompts read from `input`; results go to `out`.
fn run(
    store: &SecureCredentialStore,
    command: Commands,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        Commands::Status => {
            let status = store.status()?;
            let config = store.load_config();
            writeln!(out, "data dir:    {}", status.data_dir.display())?;
            writeln!(out, "identities:  {}", status.identities)?;
            writeln!(out, "pin set:     {}", status.pin_set)?;
            writeln!(out, "first run:   {}", status.first_time_setup)?;
            writeln!(out, "enabled:     {}", config.enabled)?;
            let attempts = store.load_attempts()?;
            if attempts.failed_attempts > 0 {
                writeln!(
                    out,
                    "failures:    {}/{}",
                    attempts.failed_attempts, config.max_attempts
                )?;
            }
        }
        Commands::List => {
            let identities = store.load_templates()?;
            if identities.is_empty() {
                writeln!(out, "No identities enrolled")?;
            }
            for identity in identities {
                writeln!(
                    out,
                    "{}\t{} samples\tenrolled {}",
                    identity.name,
                    identity.sample_count,
                    identity.enrolled_at.format("%Y-%m-%d %H:%M UTC")
                )?;
            }
        }
        Commands::Remove { name } => {
            let mut templates = TemplateStore::from_identities(store.load_templates()?);
            if !templates.delete(&name) {
                bail!("no identity named '{name}'");
            }
            store.save_templates(templates.identities())?;
            tracing::info!(name = %name, "identity removed");
            writeln!(out, "Removed {name}")?;
        }
        Commands::Pin { action } => run_pin(store, action, input, out)?,
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                writeln!(out, "{}", serde_json::to_string_pretty(&store.load_config())?)?;
            }
            ConfigAction::Set { key, value } => {
                let updated = store.load_config().with_override(&key, &value)?;
                store.save_config(&updated)?;
                tracing::info!(key = %key, value = %value, "setting updated");
                writeln!(out, "{key} updated")?;
            }
        },
        Commands::Reset { yes } => {
            if !yes {
                bail!("refusing to delete all data without --yes");
            }
            store.delete_all()?;
            tracing::warn!(dir = %store.dir().display(), "all face authentication data deleted");
            writeln!(out, "All face authentication data deleted")?;
        }
    }

    Ok(())
}

fn run_pin(
    store: &SecureCredentialStore,
    action: PinAction,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    match action {
        PinAction::Set { pin } => {
            let pin = match pin {
                Some(pin) => pin,
                None => {
                    let first = prompt(input, "New PIN: ")?;
                    validate_pin(&first)?;
                    if prompt(input, "Confirm PIN: ")? != first {
                        bail!("PINs do not match");
                    }
                    first
                }
            };
            store.save_pin(&pin)?;
            writeln!(out, "PIN saved")?;
        }
        PinAction::Remove => {
            if store.remove_pin()? {
                writeln!(out, "PIN removed")?;
            } else {
                writeln!(out, "No PIN set")?;
            }
        }
        PinAction::Verify { pin } => {
            let pin = match pin {
                Some(pin) => pin,
                None => prompt(input, "PIN: ")?,
            };
            if !store.verify_pin(&pin)? {
                tracing::info!("PIN verification failed");
                bail!("PIN rejected");
            }
            writeln!(out, "PIN accepted")?;
        }
    }
    Ok(())
}

fn prompt(input: &mut impl BufRead, label: &str) -> Result<String> {
    eprint!("{label}");
    io::stderr().flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
