//! StudyAI CLI
//!
//! Command-line client for the StudyAI API.
//!
//! # Usage
//!
//! ```bash
//! # Log in and remember the session across runs
//! studyai login ada@example.com
//!
//! # Who is logged in (no network call)
//! studyai whoami
//!
//! # Call the API; expired tokens are refreshed transparently
//! studyai request GET /history
//! studyai request POST /notes --data '{"text": "..."}'
//!
//! # Forget the session
//! studyai logout
//! ```

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use studyai_core::{ClientConfig, Method, Secret, SessionManager};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the password for non-interactive use.
const PASSWORD_ENV: &str = "STUDYAI_PASSWORD";

#[derive(Parser)]
#[command(name = "studyai")]
#[command(about = "Command-line client for the StudyAI API")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config.toml (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session
    Login {
        /// Account email
        email: String,

        /// Keep the session only for this process
        #[arg(long)]
        no_remember: bool,
    },

    /// Create an account (does not log in)
    Register {
        /// Account email
        email: String,
    },

    /// Forget the stored session
    Logout,

    /// Show the logged-in account
    Whoami,

    /// Send an authenticated request
    Request {
        /// HTTP method (GET, POST, PUT, DELETE, ...)
        method: String,

        /// Path relative to the API base URL
        path: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ClientConfig::load_from_path(path),
        None => ClientConfig::load(),
    }
    .context("Failed to load configuration")?;

    init_logging(cli.verbose, &config.log_level);
    debug!("Using API at {}", config.base_url);

    let session = SessionManager::from_config(&config).context("Failed to set up session")?;

    match cli.command {
        Commands::Login { email, no_remember } => login(&session, &email, !no_remember).await,
        Commands::Register { email } => register(&session, &email).await,
        Commands::Logout => {
            session.logout().await;
            println!("Logged out");
            Ok(())
        }
        Commands::Whoami => whoami(&session).await,
        Commands::Request { method, path, data } => {
            request(&session, &method, &path, data.as_deref()).await
        }
    }
}

fn init_logging(verbose: bool, default_level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Password from `STUDYAI_PASSWORD`, or an echo-free terminal prompt.
fn read_password() -> Result<Secret> {
    password_from(std::env::var(PASSWORD_ENV).ok(), || {
        rpassword::prompt_password("Password: ")
    })
}

fn password_from(
    env: Option<String>,
    prompt: impl FnOnce() -> io::Result<String>,
) -> Result<Secret> {
    let password = match env {
        Some(password) => password,
        None => prompt().context("Failed to read password")?,
    };
    if password.is_empty() {
        bail!("Empty password");
    }
    Ok(Secret::new(password))
}

async fn login(session: &SessionManager, email: &str, remember: bool) -> Result<()> {
    let password = read_password()?;
    let info = session
        .login(email, &password, remember)
        .await
        .context("Login failed")?;

    println!("Logged in as {} ({} session)", info.account_id, info.persistence);
    Ok(())
}

async fn register(session: &SessionManager, email: &str) -> Result<()> {
    let password = read_password()?;
    session
        .register(email, &password)
        .await
        .context("Registration failed")?;

    println!("Registered {}. Run `studyai login {}` to sign in.", email, email);
    Ok(())
}

async fn whoami(session: &SessionManager) -> Result<()> {
    match session.current_user().await {
        Some(account) => println!("{}", account),
        None => println!("Not logged in"),
    }
    Ok(())
}

fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method {:?}", method))
}

fn parse_body(data: Option<&str>) -> Result<Option<serde_json::Value>> {
    data.map(|d| serde_json::from_str(d).context("--data is not valid JSON"))
        .transpose()
}

async fn request(
    session: &SessionManager,
    method: &str,
    path: &str,
    data: Option<&str>,
) -> Result<()> {
    let method = parse_method(method)?;
    let body = parse_body(data)?;

    let response = match session.api().request(method, path, body).await {
        Ok(response) => response,
        Err(e) if e.is_session_expired() => {
            bail!("Your session has expired. Run `studyai login` again. ({})", e)
        }
        Err(e) => return Err(e).context("Request failed"),
    };

    let status = response.status();
    let text = response.text().await.context("Failed to read response body")?;
    println!("{}", status);

    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if !text.is_empty() => println!("{}", text),
        Err(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_login_flags() {
        let cli = Cli::try_parse_from(["studyai", "login", "ada@example.com", "--no-remember"])
            .unwrap();
        match cli.command {
            Commands::Login { email, no_remember } => {
                assert_eq!(email, "ada@example.com");
                assert!(no_remember);
            }
            _ => panic!("expected login"),
        }
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("get").unwrap(), Method::GET);
        assert_eq!(parse_method("PATCH").unwrap(), Method::PATCH);
        assert!(parse_method("BAD METHOD").is_err());
    }

    #[test]
    fn test_parse_body() {
        assert!(parse_body(None).unwrap().is_none());
        assert_eq!(
            parse_body(Some(r#"{"a": 1}"#)).unwrap().unwrap()["a"],
            1
        );
        assert!(parse_body(Some("{oops")).is_err());
    }

    #[test]
    fn test_password_env_skips_prompt() {
        let password = password_from(Some("hunter2".to_string()), || {
            panic!("prompted despite {}", PASSWORD_ENV)
        })
        .unwrap();
        assert_eq!(password.expose(), "hunter2");
    }

    #[test]
    fn test_password_prompt_used_without_env() {
        let password = password_from(None, || Ok("hunter2".to_string())).unwrap();
        assert_eq!(password.expose(), "hunter2");

        assert!(password_from(None, || Ok(String::new())).is_err());
        assert!(password_from(None, || Err(io::Error::other("no tty"))).is_err());
    }
}
