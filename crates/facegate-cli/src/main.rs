use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use facegate_core::password::hash_password;
use facegate_core::types::User;
use facegate_core::validate::NewUser;
use facegate_store::catalog::ADMIN_ROLE_ID;
use facegate_store::Store;
use std::path::{Path, PathBuf};

mod client;

use client::ApiClient;

#[derive(Parser)]
#[command(name = "facegate", about = "Facegate access control CLI", version)]
struct Cli {
    /// SQLite database used by the maintenance commands
    #[arg(long, env = "FACEGATE_DB_PATH", global = true)]
    db: Option<PathBuf>,

    /// Base URL of facegated
    #[arg(long, env = "FACEGATE_URL", default_value = "http://127.0.0.1:3000", global = true)]
    url: String,

    /// Session token for authenticated calls
    #[arg(long, env = "FACEGATE_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalogs and, optionally, a first administrator
    Seed {
        #[arg(long, requires = "admin_password")]
        admin_email: Option<String>,
        #[arg(long, env = "FACEGATE_ADMIN_PASSWORD", hide_env_values = true)]
        admin_password: Option<String>,
    },
    /// Create a console administrator
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long, env = "FACEGATE_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "Admin")]
        first_name: String,
        #[arg(long, default_value = "Sistema")]
        last_name: String,
        /// Identity document; defaults to the e-mail address
        #[arg(long)]
        document: Option<String>,
    },
    /// Delete people who have no enrolled face (operators are kept)
    PurgeFacelessUsers {
        /// Only list who would be deleted
        #[arg(long)]
        dry_run: bool,
    },
    /// Show daemon and face service status
    Status,
    /// Log in and print a session token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "FACEGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Enroll a face image for a user
    Enroll {
        #[arg(long)]
        user: i64,
        image: PathBuf,
    },
    /// Run an access check with an image at a control point
    Verify {
        #[arg(long)]
        point: i64,
        image: PathBuf,
        /// Ask the face service for a liveness check
        #[arg(long)]
        liveness: bool,
    },
}

/// `$XDG_DATA_HOME/facegate/facegate.db`, the daemon's default.
fn default_db_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate")
        .join("facegate.db")
}

async fn open_store(db: Option<PathBuf>) -> Result<Store> {
    let path = db.unwrap_or_else(default_db_path);
    Store::open(&path)
        .await
        .with_context(|| format!("failed to open database {}", path.display()))
}

struct AdminForm {
    email: String,
    password: String,
    first_name: String,
    last_name: String,
    document: Option<String>,
}

async fn create_admin(store: &Store, form: AdminForm) -> Result<User> {
    let document = form.document.unwrap_or_else(|| form.email.clone());
    let new = NewUser {
        first_name: form.first_name,
        last_name: form.last_name,
        document,
        email: Some(form.email),
        phone: None,
        role_id: ADMIN_ROLE_ID,
        password: Some(form.password),
    }
    .normalize();
    new.validate()?;
    let Some(password) = new.password.as_deref() else {
        bail!("password must not be empty");
    };
    let hash = hash_password(password)?;
    Ok(store.create_user(&new, Some(hash), None).await?)
}

fn read_image(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(STANDARD.encode(bytes))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Seed {
            admin_email,
            admin_password,
        } => {
            let store = open_store(cli.db).await?;
            store.seed_catalogs().await?;
            println!("Catalogs seeded");
            if let (Some(email), Some(password)) = (admin_email, admin_password) {
                let email = email.trim().to_lowercase();
                if store.find_login_by_email(&email).await?.is_some() {
                    println!("Administrator {email} already exists");
                } else {
                    let admin = create_admin(
                        &store,
                        AdminForm {
                            email,
                            password,
                            first_name: "Admin".into(),
                            last_name: "Sistema".into(),
                            document: None,
                        },
                    )
                    .await?;
                    println!("Administrator created (id {})", admin.id);
                }
            }
        }
        Commands::CreateAdmin {
            email,
            password,
            first_name,
            last_name,
            document,
        } => {
            let store = open_store(cli.db).await?;
            store.seed_catalogs().await?;
            let admin = create_admin(
                &store,
                AdminForm {
                    email,
                    password,
                    first_name,
                    last_name,
                    document,
                },
            )
            .await?;
            println!("Administrator {} created (id {})", admin.display_name(), admin.id);
        }
        Commands::PurgeFacelessUsers { dry_run } => {
            let store = open_store(cli.db).await?;
            let users = store.purge_users_without_faces(dry_run, None).await?;
            if users.is_empty() {
                println!("No users without faces");
            }
            for user in &users {
                println!(
                    "{:>6}  {:<30}  {}",
                    user.id,
                    user.display_name(),
                    user.document.as_deref().unwrap_or("-")
                );
            }
            if dry_run {
                println!("{} users would be deleted", users.len());
            } else {
                println!("{} users deleted", users.len());
            }
        }
        Commands::Status => {
            let client = ApiClient::new(&cli.url, cli.token)?;
            match client.health().await {
                Ok(health) => {
                    println!("facegated:    running ({})", cli.url);
                    println!("version:      {}", health["version"].as_str().unwrap_or("unknown"));
                    println!("face service: {}", health["face_service"].as_str().unwrap_or("unknown"));
                }
                Err(e) => {
                    println!("facegated:    not reachable ({e:#})");
                    std::process::exit(1);
                }
            }
        }
        Commands::Login { email, password } => {
            let client = ApiClient::new(&cli.url, None)?;
            let token = client.login(&email, &password).await?;
            println!("{token}");
        }
        Commands::Enroll { user, image } => {
            let client = ApiClient::new(&cli.url, cli.token)?;
            let face = client.enroll(user, &read_image(&image)?).await?;
            print_json(&face)?;
        }
        Commands::Verify {
            point,
            image,
            liveness,
        } => {
            let client = ApiClient::new(&cli.url, cli.token)?;
            let outcome = client.verify(point, &read_image(&image)?, liveness).await?;
            println!(
                "{}: {}",
                outcome["decision"].as_str().unwrap_or("unknown").to_uppercase(),
                outcome["message"].as_str().unwrap_or("")
            );
            print_json(&outcome)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_verify() {
        let cli = Cli::try_parse_from(["facegate", "verify", "--point", "3", "probe.jpg", "--token", "t"]).unwrap();
        assert_eq!(cli.token.as_deref(), Some("t"));
        match cli.command {
            Commands::Verify { point, image, liveness } => {
                assert_eq!(point, 3);
                assert_eq!(image, PathBuf::from("probe.jpg"));
                assert!(!liveness);
            }
            _ => panic!("expected verify"),
        }
    }

    #[test]
    fn test_parse_purge_dry_run() {
        let cli = Cli::try_parse_from(["facegate", "purge-faceless-users", "--dry-run"]).unwrap();
        assert!(matches!(cli.command, Commands::PurgeFacelessUsers { dry_run: true }));
    }

    #[tokio::test]
    async fn test_create_admin_hashes_password() {
        let store = Store::open_in_memory().await.unwrap();
        store.seed_catalogs().await.unwrap();
        let admin = create_admin(
            &store,
            AdminForm {
                email: " Root@Example.com ".into(),
                password: "long enough".into(),
                first_name: "Root".into(),
                last_name: "Admin".into(),
                document: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(admin.role.id, ADMIN_ROLE_ID);

        let creds = store.find_login_by_email("root@example.com").await.unwrap().unwrap();
        let hash = creds.password_hash.unwrap();
        assert!(facegate_core::password::verify_password("long enough", &hash));
    }

    #[tokio::test]
    async fn test_create_admin_rejects_short_password() {
        let store = Store::open_in_memory().await.unwrap();
        store.seed_catalogs().await.unwrap();
        let res = create_admin(
            &store,
            AdminForm {
                email: "root@example.com".into(),
                password: "short".into(),
                first_name: "Root".into(),
                last_name: "Admin".into(),
                document: None,
            },
        )
        .await;
        assert!(res.is_err());
    }
}
