//! Tasklane CLI - Command-line administration
//!
//! Usage:
//!   tasklane user create <username> --password <password>
//!   tasklane user list [--json]
//!   tasklane user disable <username>
//!   tasklane user set-roles <username> ROLE_ADMIN ROLE_USER
//!   tasklane gen-secret
//!   tasklane config check

use anyhow::{bail, Context};
use base64::Engine;
use clap::{Parser, Subcommand};
use rand::RngCore;
use std::io::BufRead;
use std::sync::Arc;
use tasklane_core::password::hash_password;
use tasklane_core::{
    AppConfig, CredentialStore, DocumentStore, RefreshTokenStore, StoreBackend, TaskStore, User,
};

#[derive(Parser)]
#[command(name = "tasklane")]
#[command(about = "Tasklane administration CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Print a random signing secret suitable for JWT_SECRET
    GenSecret {
        /// Secret length in bytes before encoding
        #[arg(long, default_value_t = 48)]
        bytes: usize,
    },
    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create an active account
    Create {
        username: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
        /// Extra roles; none means ROLE_USER
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// List accounts
    List {
        #[arg(long)]
        json: bool,
    },
    /// Block every authentication path for an account
    Disable { username: String },
    /// Re-enable an account
    Enable { username: String },
    /// Replace an account's roles
    SetRoles { username: String, roles: Vec<String> },
    /// Delete an account with its tasks and refresh tokens
    Delete { username: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Load and validate, then report problems
    Check,
    /// Print the effective configuration as TOML (secrets omitted)
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tasklane=info,warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::GenSecret { bytes } => {
            println!("{}", generate_secret(bytes)?);
        }
        Commands::Config { action } => match action {
            ConfigAction::Check => {
                AppConfig::load().context("configuration is invalid")?;
                println!("Configuration OK");
            }
            ConfigAction::Show => {
                let config = AppConfig::load().context("configuration is invalid")?;
                println!("{}", toml::to_string_pretty(&config)?);
            }
        },
        Commands::User { action } => {
            let config = AppConfig::load().context("configuration is invalid")?;
            if config.database.backend == StoreBackend::Memory {
                tracing::warn!("STORE_BACKEND is memory; changes are lost when this command exits");
            }
            let store = tasklane_store::connect(&config)
                .await
                .context("failed to open document store")?;
            run_user_action(&config, store, action).await?;
        }
    }

    Ok(())
}

async fn run_user_action(
    config: &AppConfig,
    store: Arc<dyn DocumentStore>,
    action: UserAction,
) -> anyhow::Result<()> {
    match action {
        UserAction::Create {
            username,
            password,
            roles,
        } => {
            let password = match password {
                Some(password) => password,
                None => read_password()?,
            };
            if password.len() < 6 {
                bail!("password must be at least 6 characters");
            }

            let mut user = User::new(username, hash_password(&password, &config.password)?);
            user.roles = roles;
            store.insert_user(&user).await?;
            println!("Created user {} ({})", user.username, user.id);
        }
        UserAction::List { json } => {
            let mut users = store.list_users().await?;
            users.sort_by(|a, b| a.username.cmp(&b.username));

            if json {
                let rows: Vec<_> = users
                    .iter()
                    .map(|u| {
                        serde_json::json!({
                            "id": u.id,
                            "username": u.username,
                            "roles": u.effective_roles(),
                            "active": u.active,
                            "createdAt": u.created_at,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for u in &users {
                    println!(
                        "{:<24} {:<8} {:<25} {}",
                        u.username,
                        if u.active { "active" } else { "disabled" },
                        u.effective_roles().join(","),
                        u.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
                println!("{} user(s)", users.len());
            }
        }
        UserAction::Disable { username } => {
            set_active(store.as_ref(), &username, false).await?;
            // Outstanding refresh tokens would be refused anyway; drop them now.
            let deleted = store.delete_by_username(&username).await?;
            println!("Disabled {username}, removed {deleted} refresh token(s)");
        }
        UserAction::Enable { username } => {
            set_active(store.as_ref(), &username, true).await?;
            println!("Enabled {username}");
        }
        UserAction::SetRoles { username, roles } => {
            let mut user = find_user(store.as_ref(), &username).await?;
            user.roles = roles;
            user.updated_at = chrono::Utc::now();
            store.update_user(&user).await?;
            println!("Roles of {username}: {}", user.effective_roles().join(","));
        }
        UserAction::Delete { username } => {
            let user = find_user(store.as_ref(), &username).await?;
            let tokens = store.delete_by_username(&username).await?;
            let tasks = store.delete_tasks_by_owner(user.id).await?;
            store.delete_user(&username).await?;
            println!("Deleted {username} with {tasks} task(s) and {tokens} refresh token(s)");
        }
    }

    Ok(())
}

async fn find_user(store: &dyn DocumentStore, username: &str) -> anyhow::Result<User> {
    store
        .find_by_username(username)
        .await?
        .with_context(|| format!("no such user: {username}"))
}

async fn set_active(store: &dyn DocumentStore, username: &str, active: bool) -> anyhow::Result<()> {
    let mut user = find_user(store, username).await?;
    user.active = active;
    user.updated_at = chrono::Utc::now();
    if !store.update_user(&user).await? {
        bail!("user {username} disappeared during update");
    }
    Ok(())
}

fn read_password() -> anyhow::Result<String> {
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn generate_secret(bytes: usize) -> anyhow::Result<String> {
    if bytes < 32 {
        bail!("a signing secret needs at least 32 bytes");
    }
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    Ok(base64::engine::general_purpose::STANDARD.encode(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_create() {
        let cli = Cli::try_parse_from([
            "tasklane", "user", "create", "alice", "--password", "secret", "--role", "ROLE_ADMIN",
        ])
        .unwrap();

        match cli.command {
            Commands::User {
                action: UserAction::Create { username, password, roles },
            } => {
                assert_eq!(username, "alice");
                assert_eq!(password.as_deref(), Some("secret"));
                assert_eq!(roles, vec!["ROLE_ADMIN"]);
            }
            _ => panic!("expected user create"),
        }
    }

    #[test]
    fn test_generate_secret() {
        let secret = generate_secret(48).unwrap();
        assert_eq!(secret.len(), 64);
        assert!(generate_secret(16).is_err());
    }

    #[tokio::test]
    async fn test_disable_and_delete_user() {
        let mut config = AppConfig::default();
        config.password.memory_cost = 1024;
        config.password.time_cost = 1;
        config.password.parallelism = 1;
        let store: Arc<dyn DocumentStore> = Arc::new(tasklane_store::MemoryStore::new());

        run_user_action(
            &config,
            Arc::clone(&store),
            UserAction::Create {
                username: "alice".to_string(),
                password: Some("secret".to_string()),
                roles: vec![],
            },
        )
        .await
        .unwrap();

        run_user_action(
            &config,
            Arc::clone(&store),
            UserAction::Disable {
                username: "alice".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(!store.find_by_username("alice").await.unwrap().unwrap().active);

        run_user_action(
            &config,
            Arc::clone(&store),
            UserAction::Delete {
                username: "alice".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(store.find_by_username("alice").await.unwrap().is_none());
    }
}
