//! sealvault CLI - Command line interface for encrypted, shareable file storage.
//!
//! Every invocation logs in, runs one operation and exits. Accounts and
//! files live in a local store directory standing in for the Datastore and
//! Keystore services; invitations are printed as tokens to pass on out of
//! band.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use sealvault_client::{Client, ClientConfig, Invitation, User};
use sealvault_crypto::KdfParams;
use sealvault_storage::{LocalDatastore, LocalKeystore};

const CONFIG_FILENAME: &str = "config.json";

#[derive(Parser)]
#[command(name = "sealvault")]
#[command(about = "sealvault - Encrypted file storage and sharing")]
#[command(version)]
struct Cli {
    /// Directory holding the datastore, keystore and configuration.
    #[arg(short, long, default_value = ".sealvault")]
    store: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new account.
    Init {
        /// Account name.
        #[arg(short, long)]
        user: String,

        /// KDF strength for a new store: "interactive", "moderate", or "sensitive".
        #[arg(long)]
        strength: Option<String>,
    },

    /// Check a password and show account information.
    Login {
        /// Account name.
        #[arg(short, long)]
        user: String,
    },

    /// Create or overwrite a file from a local source file.
    Store {
        /// Account name.
        #[arg(short, long)]
        user: String,

        /// Name of the file in the account.
        #[arg(short, long)]
        name: String,

        /// Local file to read.
        #[arg(long)]
        source: PathBuf,
    },

    /// Append the contents of a local file.
    Append {
        /// Account name.
        #[arg(short, long)]
        user: String,

        /// Name of the file in the account.
        #[arg(short, long)]
        name: String,

        /// Local file to read.
        #[arg(long)]
        source: PathBuf,
    },

    /// Read a file.
    Load {
        /// Account name.
        #[arg(short, long)]
        user: String,

        /// Name of the file in the account.
        #[arg(short, long)]
        name: String,

        /// Local file to write (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Share a file and print the invitation token.
    Share {
        /// Account name.
        #[arg(short, long)]
        user: String,

        /// Name of the file in the account.
        #[arg(short, long)]
        name: String,

        /// Account to share with.
        #[arg(short, long)]
        recipient: String,
    },

    /// Accept an invitation token.
    Receive {
        /// Account name.
        #[arg(short, long)]
        user: String,

        /// Name to give the received file.
        #[arg(short, long)]
        name: String,

        /// Account that sent the invitation.
        #[arg(long)]
        sender: String,

        /// Invitation token printed by `share`.
        #[arg(short, long)]
        token: String,
    },

    /// Revoke access to an owned file.
    Revoke {
        /// Account name.
        #[arg(short, long)]
        user: String,

        /// Name of the file in the account.
        #[arg(short, long)]
        name: String,

        /// Revoke only this recipient (default: everyone).
        #[arg(short, long)]
        recipient: Option<String>,
    },

    /// List the local names of files received from other accounts.
    Files {
        /// Account name.
        #[arg(short, long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = cli.store;
    match cli.command {
        Commands::Init { user, strength } => cmd_init(&store, &user, strength.as_deref()).await,

        Commands::Login { user } => cmd_login(&store, &user).await,

        Commands::Store { user, name, source } => cmd_store(&store, &user, &name, &source).await,

        Commands::Append { user, name, source } => {
            cmd_append(&store, &user, &name, &source).await
        }

        Commands::Load { user, name, output } => {
            cmd_load(&store, &user, &name, output.as_deref()).await
        }

        Commands::Share {
            user,
            name,
            recipient,
        } => cmd_share(&store, &user, &name, &recipient).await,

        Commands::Receive {
            user,
            name,
            sender,
            token,
        } => cmd_receive(&store, &user, &name, &sender, &token).await,

        Commands::Revoke {
            user,
            name,
            recipient,
        } => cmd_revoke(&store, &user, &name, recipient.as_deref()).await,

        Commands::Files { user } => cmd_files(&store, &user).await,
    }
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(password))
}

fn kdf_params(strength: &str) -> Result<KdfParams> {
    match strength {
        "interactive" => Ok(KdfParams::interactive()),
        "moderate" => Ok(KdfParams::moderate()),
        "sensitive" => Ok(KdfParams::sensitive()),
        _ => anyhow::bail!("Invalid strength. Use: interactive, moderate, or sensitive"),
    }
}

/// Load the store's configuration, writing one on first use.
async fn load_config(store: &Path, strength: Option<&str>) -> Result<ClientConfig> {
    let path = store.join(CONFIG_FILENAME);

    if tokio::fs::try_exists(&path).await? {
        let bytes = tokio::fs::read(&path)
            .await
            .context("Failed to read store configuration")?;
        let config =
            ClientConfig::from_bytes(&bytes).context("Failed to parse store configuration")?;
        if let Some(strength) = strength {
            if config.kdf_params != kdf_params(strength)? {
                warn!("Store already configured, ignoring --strength {}", strength);
            }
        }
        return Ok(config);
    }

    let config = match strength {
        Some(strength) => ClientConfig::new(kdf_params(strength)?),
        None => ClientConfig::default(),
    };
    tokio::fs::create_dir_all(store)
        .await
        .context("Failed to create store directory")?;
    tokio::fs::write(&path, config.to_bytes()?)
        .await
        .context("Failed to write store configuration")?;
    info!("Initialized store at {}", store.display());

    Ok(config)
}

/// Build a client over the local store.
async fn open_client(store: &Path, strength: Option<&str>) -> Result<Client> {
    let config = load_config(store, strength).await?;
    let datastore = LocalDatastore::new(store).context("Failed to open datastore")?;
    let keystore = LocalKeystore::new(store).context("Failed to open keystore")?;
    Ok(Client::new(Arc::new(datastore), Arc::new(keystore), config))
}

/// Prompt for a password and log in.
async fn login(store: &Path, user: &str) -> Result<User> {
    let client = open_client(store, None).await?;
    let password = prompt_password(&format!("Password for {}: ", user))?;
    client
        .get_user(user, &password)
        .await
        .context("Failed to log in")
}

/// Create a new account.
async fn cmd_init(store: &Path, user: &str, strength: Option<&str>) -> Result<()> {
    info!("Creating account: {}", user);

    let client = open_client(store, strength).await?;

    let password = prompt_password("Enter password: ")?;
    let confirm = prompt_password("Confirm password: ")?;
    if *password != *confirm {
        anyhow::bail!("Passwords do not match");
    }

    let account = client
        .init_user(user, &password)
        .await
        .context("Failed to create account")?;

    println!("Account created successfully!");
    println!("  User: {}", account.username());
    println!("  Store: {}", store.display());

    Ok(())
}

/// Verify credentials and show account information.
async fn cmd_login(store: &Path, user: &str) -> Result<()> {
    let account = login(store, user).await?;
    print!("{}", account_summary(&account));

    Ok(())
}

/// Account information shown after login, public keys hex-encoded.
fn account_summary(account: &User) -> String {
    format!(
        "Account Information:\n  User: {}\n  Encryption key: {}\n  Signature key: {}\n  Received files: {}\n",
        account.username(),
        hex::encode(account.encryption_public_key().to_bytes()),
        hex::encode(account.signature_public_key().to_bytes()),
        account.shared_files().len()
    )
}

/// Create or overwrite a file.
async fn cmd_store(store: &Path, user: &str, name: &str, source: &Path) -> Result<()> {
    info!("Storing {} as {}", source.display(), name);

    let content = tokio::fs::read(source)
        .await
        .context("Failed to read source file")?;

    let account = login(store, user).await?;
    account
        .store_file(name, &content)
        .await
        .context("Failed to store file")?;

    println!("File stored successfully: {} ({} bytes)", name, content.len());

    Ok(())
}

/// Append to a file.
async fn cmd_append(store: &Path, user: &str, name: &str, source: &Path) -> Result<()> {
    info!("Appending {} to {}", source.display(), name);

    let content = tokio::fs::read(source)
        .await
        .context("Failed to read source file")?;

    let account = login(store, user).await?;
    account
        .append_file(name, &content)
        .await
        .context("Failed to append to file")?;

    println!("Appended {} bytes to {}", content.len(), name);

    Ok(())
}

/// Read a file to a local path or stdout.
async fn cmd_load(store: &Path, user: &str, name: &str, output: Option<&Path>) -> Result<()> {
    let account = login(store, user).await?;
    let content = account
        .load_file(name)
        .await
        .context("Failed to load file")?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &content)
                .await
                .context("Failed to write output file")?;
            println!(
                "File loaded successfully: {} ({} bytes)",
                path.display(),
                content.len()
            );
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&content).await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}

/// Share a file and print the invitation token.
async fn cmd_share(store: &Path, user: &str, name: &str, recipient: &str) -> Result<()> {
    info!("Sharing {} with {}", name, recipient);

    let account = login(store, user).await?;
    let invitation = account
        .share_file(name, recipient)
        .await
        .context("Failed to share file")?;

    println!("Send this invitation to {}:", recipient);
    println!("{}", invitation.to_token()?);

    Ok(())
}

/// Accept an invitation.
async fn cmd_receive(store: &Path, user: &str, name: &str, sender: &str, token: &str) -> Result<()> {
    info!("Receiving {} from {}", name, sender);

    let invitation = Invitation::from_token(token).context("Invalid invitation token")?;

    let mut account = login(store, user).await?;
    account
        .receive_file(name, sender, &invitation)
        .await
        .context("Failed to receive file")?;

    println!("File received from {}: {}", sender, name);

    Ok(())
}

/// Revoke access to an owned file.
async fn cmd_revoke(store: &Path, user: &str, name: &str, recipient: Option<&str>) -> Result<()> {
    let account = login(store, user).await?;

    match recipient {
        Some(recipient) => {
            info!("Revoking {}'s access to {}", recipient, name);
            account
                .revoke_user(name, recipient)
                .await
                .context("Failed to revoke access")?;
            println!("Access revoked: {} can no longer read {}", recipient, name);
        }
        None => {
            info!("Revoking all access to {}", name);
            account
                .revoke_file(name)
                .await
                .context("Failed to revoke access")?;
            println!("Access revoked: {} is private again", name);
        }
    }

    Ok(())
}

/// List the names under which received files were accepted.
async fn cmd_files(store: &Path, user: &str) -> Result<()> {
    let account = login(store, user).await?;
    let files = account.shared_files();

    if files.is_empty() {
        println!("No received files.");
    } else {
        println!("Received files:");
        for name in files {
            println!("  {}", name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealvault_storage::{MemoryDatastore, MemoryKeystore};

    #[tokio::test]
    async fn test_account_summary_shows_hex_keys() {
        let config = ClientConfig::new(KdfParams {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        });
        let client = Client::new(
            Arc::new(MemoryDatastore::new()),
            Arc::new(MemoryKeystore::new()),
            config,
        );
        let account = client.init_user("alice", "password").await.unwrap();

        let summary = account_summary(&account);
        let encryption = hex::encode(account.encryption_public_key().to_bytes());
        let signature = hex::encode(account.signature_public_key().to_bytes());

        assert_eq!(encryption.len(), 64);
        assert!(summary.contains(&format!("Encryption key: {}", encryption)));
        assert!(summary.contains(&format!("Signature key: {}", signature)));
        assert!(summary.contains("Received files: 0"));
    }
}
