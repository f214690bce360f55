//! VaultKeep command-line host
//!
//! Drives the encrypted vault from a terminal. Each invocation opens the
//! vault, performs one operation and locks it again; nothing decrypted
//! outlives the process.
//!
//! # Passphrases
//!
//! The vault passphrase is read from `VAULTKEEP_PASSPHRASE` when set,
//! otherwise prompted for without echo. Export and import passphrases for
//! protected files are always prompted for unless `VAULTKEEP_TRANSFER_PASSPHRASE`
//! is set.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};

use vaultkeep_app_lib::security::generate;
use vaultkeep_app_lib::vault::{IdentityDraft, SecretString, DEFAULT_BLOCK_ID};
use vaultkeep_app_lib::{
    AppState, ExportFormat, FileStore, GeneratorOptions, ImportMode, Passphrase, SystemClock,
    VaultStatus,
};

const PASSPHRASE_ENV: &str = "VAULTKEEP_PASSPHRASE";
const TRANSFER_PASSPHRASE_ENV: &str = "VAULTKEEP_TRANSFER_PASSPHRASE";

/// VaultKeep encrypted vault
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory holding the vault and settings
    #[arg(long, env = "VAULTKEEP_DATA_DIR", default_value = "vaultkeep-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new vault
    Init,
    /// Show whether a vault exists and whether a session is active
    Status,
    /// List blocks, credentials and notes
    List {
        /// Print secret values instead of masking them
        #[arg(long)]
        show_secrets: bool,
        /// Print the vault as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a block
    AddBlock { name: String },
    /// Delete a block and everything in it
    DeleteBlock { id: String },
    /// Add a credential
    AddCredential {
        #[arg(long, default_value = DEFAULT_BLOCK_ID)]
        block: String,
        #[arg(long)]
        site: String,
        #[arg(long)]
        username: String,
        /// Secret value; generated when omitted
        #[arg(long)]
        secret: Option<String>,
    },
    DeleteCredential { id: String },
    /// Add a note
    AddNote {
        #[arg(long, default_value = DEFAULT_BLOCK_ID)]
        block: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    /// Replace the title and content of a note
    UpdateNote {
        id: String,
        #[arg(long, default_value = DEFAULT_BLOCK_ID)]
        block: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    DeleteNote { id: String },
    /// Save an identity preset
    AddIdentity {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        tax_id: String,
        #[arg(long, default_value = "")]
        birthdate: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        profile_link: String,
        #[arg(long, default_value = "")]
        address: String,
    },
    DeleteIdentity { id: String },
    /// Export the vault to a file
    Export {
        #[arg(long, value_enum, default_value = "protected")]
        format: FormatArg,
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Import a JSON, CSV or KDBX file
    Import {
        file: PathBuf,
        /// Discard the current contents instead of merging
        #[arg(long)]
        replace: bool,
        /// Confirm a destructive replace
        #[arg(long)]
        yes: bool,
    },
    /// Generate a random password
    Generate {
        #[arg(long, default_value = "16")]
        length: usize,
        #[arg(long)]
        no_symbols: bool,
        #[arg(long)]
        no_digits: bool,
    },
    /// Delete the vault permanently
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Plain,
    Protected,
    Csv,
    Kdbx,
}

/// Read a passphrase from `env_var`, or prompt for it.
fn read_passphrase(env_var: &str, prompt: &str) -> Result<Passphrase> {
    if let Ok(value) = std::env::var(env_var) {
        debug!("Using passphrase from {}", env_var);
        return Ok(Passphrase::new(value));
    }
    let value = rpassword::prompt_password(prompt).context("Failed to read passphrase")?;
    Ok(Passphrase::new(value))
}

/// Read a new passphrase. When prompting, it must be typed twice.
fn read_new_passphrase(env_var: &str) -> Result<Passphrase> {
    if let Ok(value) = std::env::var(env_var) {
        debug!("Using passphrase from {}", env_var);
        return Ok(Passphrase::new(value));
    }
    let first = rpassword::prompt_password("New vault passphrase: ")
        .context("Failed to read passphrase")?;
    let second = rpassword::prompt_password("Confirm passphrase: ")
        .context("Failed to read passphrase")?;
    confirm_passphrase(Passphrase::new(first), Passphrase::new(second))
}

fn confirm_passphrase(first: Passphrase, second: Passphrase) -> Result<Passphrase> {
    if first.as_str() != second.as_str() {
        bail!("Passphrases do not match");
    }
    Ok(first)
}

fn mask(secret: &SecretString, show: bool) -> String {
    if show {
        secret.expose().to_string()
    } else {
        "********".to_string()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vaultkeep=info".parse()?)
                .add_directive("vaultkeep_app_lib=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Password generation needs no vault
    if let Command::Generate {
        length,
        no_symbols,
        no_digits,
    } = args.command
    {
        let options = GeneratorOptions {
            length,
            symbols: !no_symbols,
            digits: !no_digits,
            ..Default::default()
        };
        let password = generate(&options)?;
        println!("{}", password.expose());
        return Ok(());
    }

    let store = FileStore::new(&args.data_dir)
        .with_context(|| format!("Failed to open data directory {:?}", args.data_dir))?;
    let state = AppState::initialize(Arc::new(store), Arc::new(SystemClock))
        .context("Failed to initialize vault")?;
    debug!("Data directory: {:?}", args.data_dir);

    match args.command {
        Command::Init => {
            let passphrase = read_new_passphrase(PASSPHRASE_ENV)?;
            state.create_vault(passphrase, false).await?;
            info!("Vault created in {:?}", args.data_dir);
            println!("Vault created");
        }
        Command::Status => {
            let status = state.status().await?;
            let session = state.with_vault(|v| v.has_valid_session()).await?;
            println!("{}", status);
            if status != VaultStatus::NotSetup {
                println!("recent session: {}", if session { "yes" } else { "no" });
            }
        }
        Command::Reset { yes } => {
            if !yes {
                bail!("Refusing to delete the vault without --yes");
            }
            state.with_vault(|v| v.destroy()).await?;
            println!("Vault deleted");
        }
        command => {
            let passphrase = read_passphrase(PASSPHRASE_ENV, "Vault passphrase: ")?;
            state.open_vault(passphrase, false).await?;
            let result = run(&state, command).await;
            state.lock_vault().await?;
            result?;
        }
    }

    Ok(())
}

/// Run a command that needs the unlocked vault.
async fn run(state: &AppState, command: Command) -> Result<()> {
    match command {
        Command::List { show_secrets, json } => {
            let vault = state.vault.lock().await;
            let vault = vault.vault()?;
            if json {
                println!("{}", serde_json::to_string_pretty(vault)?);
                return Ok(());
            }
            for block in &vault.blocks {
                println!("[{}] {}", block.id, block.name);
                for c in vault.credentials.iter().filter(|c| c.block_id == block.id) {
                    println!(
                        "  credential {}  {}  {}  {}",
                        c.id,
                        c.site,
                        c.username,
                        mask(&c.secret_value, show_secrets)
                    );
                }
                for n in vault.notes.iter().filter(|n| n.block_id == block.id) {
                    println!("  note {}  {}", n.id, n.title);
                }
            }
            for p in &vault.identity_presets {
                println!("identity {}  {}  {}", p.id, p.name, p.email);
            }
        }
        Command::AddBlock { name } => {
            let block = state.with_vault(|v| v.add_block(&name)).await?;
            println!("{}", block.id);
        }
        Command::DeleteBlock { id } => {
            state.with_vault(|v| v.delete_block(&id)).await?;
        }
        Command::AddCredential {
            block,
            site,
            username,
            secret,
        } => {
            let secret = match secret {
                Some(value) => SecretString::new(value),
                None => generate(&GeneratorOptions::default())?,
            };
            let credential = state
                .with_vault(|v| v.add_credential(&block, &site, &username, secret))
                .await?;
            println!("{}", credential.id);
        }
        Command::DeleteCredential { id } => {
            state.with_vault(|v| v.delete_credential(&id)).await?;
        }
        Command::AddNote {
            block,
            title,
            content,
        } => {
            let note = state
                .with_vault(|v| v.add_note(&block, &title, &content))
                .await?;
            println!("{}", note.id);
        }
        Command::UpdateNote {
            id,
            block,
            title,
            content,
        } => {
            state
                .with_vault(|v| v.update_note(&id, &block, &title, &content))
                .await?;
        }
        Command::DeleteNote { id } => {
            state.with_vault(|v| v.delete_note(&id)).await?;
        }
        Command::AddIdentity {
            name,
            tax_id,
            birthdate,
            email,
            profile_link,
            address,
        } => {
            let draft = IdentityDraft {
                name,
                tax_id,
                birthdate,
                email,
                profile_link,
                address,
            };
            let preset = state.with_vault(|v| v.add_identity_preset(draft)).await?;
            println!("{}", preset.id);
        }
        Command::DeleteIdentity { id } => {
            state.with_vault(|v| v.delete_identity_preset(&id)).await?;
        }
        Command::Export { format, out } => {
            let format = match format {
                FormatArg::Plain => ExportFormat::PlainJson,
                FormatArg::Csv => ExportFormat::Csv,
                FormatArg::Protected => ExportFormat::ProtectedJson {
                    passphrase: read_passphrase(TRANSFER_PASSPHRASE_ENV, "Export passphrase: ")?,
                },
                FormatArg::Kdbx => ExportFormat::Kdbx {
                    passphrase: read_passphrase(TRANSFER_PASSPHRASE_ENV, "Export passphrase: ")?,
                },
            };
            let file = state.vault.lock().await.export(format).await?;
            let path = out.join(&file.file_name);
            std::fs::write(&path, &file.bytes)
                .with_context(|| format!("Failed to write export to {:?}", path))?;
            println!("{}", path.display());
        }
        Command::Import { file, replace, yes } => {
            let bytes =
                std::fs::read(&file).with_context(|| format!("Failed to read {:?}", file))?;
            let file_name = file.to_string_lossy().to_string();
            let mode = if replace {
                ImportMode::Replace { confirmed: yes }
            } else {
                ImportMode::Merge
            };

            let mut vault = state.vault.lock().await;
            let summary = match vault.import(&file_name, &bytes, None, mode).await {
                Err(vaultkeep_app_lib::VaultError::PasswordRequired) => {
                    let passphrase =
                        read_passphrase(TRANSFER_PASSPHRASE_ENV, "Import passphrase: ")?;
                    vault
                        .import(&file_name, &bytes, Some(passphrase), mode)
                        .await?
                }
                other => other?,
            };
            println!(
                "Imported {} blocks, {} credentials, {} notes, {} identities ({} skipped)",
                summary.blocks,
                summary.credentials,
                summary.notes,
                summary.identity_presets,
                summary.skipped
            );
        }
        Command::Init | Command::Status | Command::Reset { .. } | Command::Generate { .. } => {
            unreachable!("handled before the vault is opened")
        }
    }

    Ok(())
}
