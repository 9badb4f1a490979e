//! SavePass CLI
//!
//! Save service logins on this device and find them again.

use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use savepass_core::{
    default_vault_dir, load_config, CredentialEntry, FileStorage, Vault, VaultConfig,
    VaultSnapshot,
};

#[derive(Parser)]
#[command(name = "savepass")]
#[command(version)]
#[command(about = "SavePass - your logins, stored on this device")]
#[command(after_help = "EXAMPLES:
  savepass init                         Create a new vault
  savepass add -s GitHub -l me@mail.com Add a login (prompts for the password)
  savepass list                         List all saved logins
  savepass search git                   Find logins by service or email

The vault lives in ~/.savepass unless SAVEPASS_DIR is set.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new vault
    Init {
        /// Encrypt the vault with a passphrase
        #[arg(long)]
        sealed: bool,
    },

    /// Save a new login
    Add {
        /// Service name (e.g., GitHub)
        #[arg(short, long)]
        service: String,
        /// Email or username
        #[arg(short, long)]
        login: String,
        /// Read the password from this environment variable instead of prompting
        #[arg(long)]
        secret_env: Option<String>,
    },

    /// List all saved logins, newest first
    List,

    /// Find logins whose service or email contains the query
    Search {
        /// Text to look for (case-insensitive)
        query: String,
    },

    /// Show one login
    Show {
        /// Entry id
        id: String,
        /// Print the password in full
        #[arg(long)]
        reveal: bool,
    },

    /// Change a saved login
    Update {
        /// Entry id
        id: String,
        /// New service name
        #[arg(short, long)]
        service: Option<String>,
        /// New email or username
        #[arg(short, long)]
        login: Option<String>,
        /// Prompt for a new password
        #[arg(long)]
        new_secret: bool,
    },

    /// Remove a saved login
    Delete {
        /// Entry id
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Initialize logging
fn init_logging() {
    let filter = EnvFilter::try_from_env("SAVEPASS_LOG")
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .compact(),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        None => {
            println!("SavePass - your logins, stored on this device");
            println!();
            println!("Run 'savepass --help' for usage information.");
            println!("Run 'savepass init' to create a new vault.");
        }
        Some(cmd) => {
            if let Err(e) = handle_command(cmd).await {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn vault_dir() -> PathBuf {
    std::env::var("SAVEPASS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_vault_dir())
}

async fn handle_command(cmd: Commands) -> Result<(), Box<dyn std::error::Error>> {
    let vault_dir = vault_dir();
    debug!("using vault directory {}", vault_dir.display());

    match cmd {
        Commands::Init { sealed } => handle_init(&vault_dir, sealed).await?,
        Commands::Add { service, login, secret_env } => {
            handle_add(&vault_dir, &service, &login, secret_env).await?;
        }
        Commands::List => handle_list(&vault_dir).await?,
        Commands::Search { query } => handle_search(&vault_dir, &query).await?,
        Commands::Show { id, reveal } => handle_show(&vault_dir, &id, reveal).await?,
        Commands::Update { id, service, login, new_secret } => {
            handle_update(&vault_dir, &id, service, login, new_secret).await?;
        }
        Commands::Delete { id, yes } => handle_delete(&vault_dir, &id, yes).await?,
    }

    Ok(())
}

// === Command Handlers ===

async fn handle_init(vault_dir: &Path, sealed: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = VaultConfig {
        sealed,
        ..VaultConfig::default()
    };

    let passphrase = if sealed {
        Some(SecretString::new(prompt_new_passphrase()?))
    } else {
        None
    };

    Vault::init(vault_dir, &config, passphrase).await?;

    println!("Vault created at {}", vault_dir.display());
    if sealed {
        println!("Entries are encrypted; you will be asked for this passphrase on every use.");
        println!("The passphrase is never stored. If you lose it, the vault cannot be opened.");
    }
    println!();
    println!("Next steps:");
    println!("  savepass add -s <service> -l <email>   Save your first login");

    Ok(())
}

async fn handle_add(
    vault_dir: &Path,
    service: &str,
    login: &str,
    secret_env: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let secret = if let Some(env_var) = secret_env {
        std::env::var(&env_var)
            .map_err(|_| format!("Environment variable '{}' not found", env_var))?
    } else {
        prompt_new_secret(service)?
    };

    validate_entry(service, login, &secret)?;

    let vault = open_vault(vault_dir).await?;
    let entry = vault.add_entry(service, login, &secret).await?;

    println!("Saved login for '{}' ({})", entry.service_name, entry.id);

    Ok(())
}

async fn handle_list(vault_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let vault = open_vault(vault_dir).await?;
    let entries = vault.list_entries().await?;

    print_entries(&entries);

    if entries.is_empty() {
        println!();
        println!("Add your first login with: savepass add -s <service> -l <email>");
    }

    Ok(())
}

async fn handle_search(vault_dir: &Path, query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let vault = open_vault(vault_dir).await?;
    let entries = vault.list_entries().await?;
    let found = vault.search(&entries, query);

    print_entries(&found);

    Ok(())
}

async fn handle_show(
    vault_dir: &Path,
    id: &str,
    reveal: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // Full passwords only go to a terminal, never to a pipe
    if reveal && !atty::is(atty::Stream::Stdout) {
        return Err("'--reveal' requires direct terminal access.".into());
    }

    let vault = open_vault(vault_dir).await?;
    let entries = vault.list_entries().await?;
    let entry = entries
        .find_by_id(id)
        .ok_or_else(|| format!("No login with id '{}'", id))?;

    println!("Service:  {}", entry.service_name);
    println!("Login:    {}", entry.login);
    if reveal {
        println!("Password: {}", entry.secret);
    } else {
        println!("Password: {}", mask_value(&entry.secret));
        println!();
        println!("Use --reveal to see the full password.");
    }

    Ok(())
}

async fn handle_update(
    vault_dir: &Path,
    id: &str,
    service: Option<String>,
    login: Option<String>,
    new_secret: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if service.is_none() && login.is_none() && !new_secret {
        return Err("Nothing to change. Pass --service, --login or --new-secret.".into());
    }

    let vault = open_vault(vault_dir).await?;
    let entries = vault.list_entries().await?;
    let current = entries
        .find_by_id(id)
        .ok_or_else(|| format!("No login with id '{}'", id))?;

    let service = service.unwrap_or_else(|| current.service_name.clone());
    let login = login.unwrap_or_else(|| current.login.clone());
    let secret = if new_secret {
        prompt_new_secret(&service)?
    } else {
        current.secret.clone()
    };

    validate_entry(&service, &login, &secret)?;

    let entry = vault.update_entry(id, &service, &login, &secret).await?;
    println!("Updated login for '{}'", entry.service_name);

    Ok(())
}

async fn handle_delete(
    vault_dir: &Path,
    id: &str,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let vault = open_vault(vault_dir).await?;

    if !yes {
        let entries = vault.list_entries().await?;
        let entry = entries
            .find_by_id(id)
            .ok_or_else(|| format!("No login with id '{}'", id))?;

        print!("Delete login for '{}' ({})? [y/N]: ", entry.service_name, entry.login);
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    if vault.delete_entry(id).await? {
        println!("Login '{}' removed", id);
    } else {
        return Err(format!("No login with id '{}'", id).into());
    }

    Ok(())
}

// === Helpers ===

async fn open_vault(vault_dir: &Path) -> Result<Vault<FileStorage>, Box<dyn std::error::Error>> {
    let config = load_config(vault_dir).await?;

    let passphrase = if config.sealed {
        Some(SecretString::new(prompt_password("Vault passphrase: ")?))
    } else {
        None
    };

    Ok(Vault::open(vault_dir, passphrase).await?)
}

fn print_entries(entries: &VaultSnapshot) {
    for entry in entries {
        print_entry(entry);
    }
    if !entries.is_empty() {
        println!();
    }
    println!("{}", count_line(entries.len()));
}

fn print_entry(entry: &CredentialEntry) {
    println!("{}", listing_line(entry));
    println!("    id: {}", entry.id);
}

/// Stands in for every password in list and search output
const LISTING_MASK: &str = "********";

/// One row of a listing. Only `show` derives anything from the password.
fn listing_line(entry: &CredentialEntry) -> String {
    format!("  * {}  {}  {}", entry.service_name, entry.login, LISTING_MASK)
}

/// Footer under a listing, e.g. "03 total"
fn count_line(count: usize) -> String {
    if count == 0 {
        "Nothing to display".to_string()
    } else {
        format!("{:02} total", count)
    }
}

fn prompt_password(prompt: &str) -> Result<String, Box<dyn std::error::Error>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let password = rpassword::read_password()?;
    Ok(password)
}

/// Ask for a password twice and insist they agree
fn prompt_new_secret(service: &str) -> Result<String, Box<dyn std::error::Error>> {
    let entered = prompt_password(&format!("Password for '{}': ", service))?;
    let confirm = prompt_password("Confirm password: ")?;

    if entered != confirm {
        return Err("Passwords do not match".into());
    }

    Ok(entered)
}

/// Choose the passphrase a sealed vault is created with
fn prompt_new_passphrase() -> Result<String, Box<dyn std::error::Error>> {
    let entered = prompt_password("Vault passphrase: ")?;
    let confirm = prompt_password("Confirm passphrase: ")?;

    if entered != confirm {
        return Err("Passphrases do not match".into());
    }
    check_passphrase(&entered)?;

    Ok(entered)
}

fn check_passphrase(passphrase: &str) -> Result<(), String> {
    if passphrase.chars().count() < 8 {
        return Err("Passphrase must be at least 8 characters".to_string());
    }
    Ok(())
}

/// The checks the vault expects callers to have made
fn validate_entry(service: &str, login: &str, secret: &str) -> Result<(), String> {
    if service.trim().is_empty() {
        return Err("Service name is required".to_string());
    }
    if login.trim().is_empty() {
        return Err("Email is required".to_string());
    }
    if !is_email_shaped(login) {
        return Err(format!("'{}' is not a valid email", login));
    }
    if secret.is_empty() {
        return Err("Password is required".to_string());
    }
    Ok(())
}

fn is_email_shaped(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

/// Mask a secret value for `show`
/// Shows first few and last few characters with ... in between
fn mask_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();
    if len <= 6 {
        // Very short values: show first char and asterisks
        if len <= 1 {
            "*".to_string()
        } else {
            let first: String = chars[..1].iter().collect();
            format!("{}{}", first, "*".repeat(len - 1))
        }
    } else if len <= 12 {
        let first: String = chars[..2].iter().collect();
        let last: String = chars[len - 2..].iter().collect();
        format!("{}...{}", first, last)
    } else {
        let first: String = chars[..3].iter().collect();
        let last: String = chars[len - 3..].iter().collect();
        format!("{}...{}", first, last)
    }
}
