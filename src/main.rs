use anyhow::{Context, Result};
use apns_token::config::{self, Config};
use apns_token::{verify, TokenProvider};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::header::HeaderMap;
use std::path::{Path, PathBuf};
use tracing::info;

// ─── CLI ─────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "apns-token",
    version,
    about = "Issue APNs provider authentication tokens"
)]
struct Cli {
    /// Output format.
    #[arg(long, default_value = "text", global = true)]
    format: Format,

    /// Override data directory (default: ./apns-token or ~/.apns-token).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Clone, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create a new data directory with a template config.
    Init {
        /// Create in ~/.apns-token instead of ./apns-token.
        #[arg(long)]
        global: bool,
    },

    /// Sign and print a fresh provider token.
    Token,

    /// Print the request headers APNs expects.
    Headers {
        /// Reuse this token instead of signing a new one.
        #[arg(long)]
        token: Option<String>,
    },

    /// Print the public half of the configured key as PEM.
    PublicKey,

    /// Check a token's signature and show its header and claims.
    Verify {
        token: String,
        /// PEM public key to verify with (default: derived from the configured key).
        #[arg(long)]
        public_key: Option<PathBuf>,
    },
}

// ─── Entry ───────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apns_token=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.cmd {
        Cmd::Init { global } => cmd_init(*global),
        Cmd::Token => cmd_token(&load_config(&cli)?, &cli.format),
        Cmd::Headers { token } => cmd_headers(&load_config(&cli)?, token.as_deref(), &cli.format),
        Cmd::PublicKey => cmd_public_key(&load_config(&cli)?, &cli.format),
        Cmd::Verify { token, public_key } => {
            cmd_verify(&cli, token, public_key.as_deref(), &cli.format)
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let data_dir = config::resolve_data_dir(cli.data_dir.as_deref())?;
    if !data_dir.join("config.toml").exists() {
        anyhow::bail!(
            "No config found. Run `apns-token init` first.\n\
             Looked in: {}",
            data_dir.display()
        );
    }
    Config::load(&data_dir)
}

// ─── init ────────────────────────────────────────────────────────────────────

fn cmd_init(global: bool) -> Result<()> {
    let dir = config::init_data_dir(global)?;
    std::fs::create_dir_all(&dir)?;

    let cfg_path = dir.join("config.toml");
    if cfg_path.exists() {
        eprintln!("Config already exists: {}", cfg_path.display());
    } else {
        std::fs::write(&cfg_path, config::CONFIG_TEMPLATE)?;
        eprintln!("Created {}", cfg_path.display());
    }

    eprintln!("Initialized in {}", dir.display());
    eprintln!();
    eprintln!("Next steps:");
    eprintln!("  1. Copy your AuthKey_XXXXXXXXXX.p8 into {}", dir.display());
    eprintln!("  2. Edit {} with your key, team and bundle IDs", cfg_path.display());
    eprintln!("  3. Run `apns-token token` to sign a token");
    Ok(())
}

// ─── token ───────────────────────────────────────────────────────────────────

fn cmd_token(cfg: &Config, fmt: &Format) -> Result<()> {
    let provider = TokenProvider::create(cfg.provider_config()).context("could not issue token")?;

    match fmt {
        Format::Json => {
            let out = serde_json::json!({
                "token": provider.get(),
                "key_id": provider.config().key_id(),
                "team_id": provider.config().team_id(),
                "issued_at": provider.issued_at().map(|t| t.to_rfc3339()),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Format::Text => println!("{}", provider.get()),
    }
    Ok(())
}

// ─── headers ─────────────────────────────────────────────────────────────────

fn cmd_headers(cfg: &Config, existing: Option<&str>, fmt: &Format) -> Result<()> {
    let provider_cfg = cfg.provider_config();
    let provider = match existing {
        Some(token) => TokenProvider::use_existing(token, provider_cfg)?,
        None => TokenProvider::create(provider_cfg).context("could not issue token")?,
    };

    let mut headers = HeaderMap::new();
    provider.authenticate_client(&mut headers);

    match fmt {
        Format::Json => {
            let out: serde_json::Map<String, serde_json::Value> = headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        serde_json::Value::String(value.to_str().unwrap_or_default().to_string()),
                    )
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Format::Text => {
            for (name, value) in &headers {
                println!("{}: {}", name, value.to_str().unwrap_or_default());
            }
        }
    }
    Ok(())
}

// ─── public-key ──────────────────────────────────────────────────────────────

fn cmd_public_key(cfg: &Config, fmt: &Format) -> Result<()> {
    let key = cfg.provider_config().load_key()?;
    let pem = key.public_key_pem()?;

    match fmt {
        Format::Json => {
            let out = serde_json::json!({
                "key_id": key.key_id(),
                "algorithm": key.algorithm().name(),
                "curve": key.algorithm().curve(),
                "public_key": pem,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Format::Text => print!("{pem}"),
    }
    Ok(())
}

// ─── verify ──────────────────────────────────────────────────────────────────

fn cmd_verify(cli: &Cli, token: &str, public_key: Option<&Path>, fmt: &Format) -> Result<()> {
    let verifying_key = match public_key {
        Some(path) => {
            let pem = std::fs::read_to_string(path)
                .with_context(|| format!("could not read {}", path.display()))?;
            verify::public_key_from_pem(&pem)?
        }
        None => load_config(cli)?.provider_config().load_key()?.verifying_key(),
    };

    let verified = verify::verify(token.trim(), &verifying_key)?;
    let age = Utc::now().timestamp() - verified.claims.iat;
    info!(kid = %verified.header.kid, iat = verified.claims.iat, "signature verified");

    match fmt {
        Format::Json => {
            let out = serde_json::json!({
                "valid": true,
                "header": verified.header,
                "claims": verified.claims,
                "age_seconds": age,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Format::Text => {
            println!("Signature OK");
            println!("  alg: {}", verified.header.alg);
            println!("  kid: {}", verified.header.kid);
            println!("  iss: {}", verified.claims.iss);
            println!("  iat: {} ({age}s ago)", verified.claims.iat);
        }
    }
    Ok(())
}
