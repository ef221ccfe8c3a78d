use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::{json, Value};

use outbound_proxy::config::{load_config, load_from_env, ProxyConfig};
use outbound_proxy::observability::init_logging;
use outbound_proxy::security::{apply_auth, Auth, RawHeaders};
use outbound_proxy::{ExecuteOptions, ExecuteRequest, Executor};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Run outbound requests through the SSRF-safe executor", long_about = None)]
struct Cli {
    /// TOML config file (defaults and OUTBOUND_PROXY_* env otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one request and print the normalized result
    Send {
        method: String,
        url: String,

        /// Request header, `name: value` (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body
        #[arg(short = 'd', long = "data")]
        data: Option<String>,

        /// Parse the body as JSON
        #[arg(long)]
        json: bool,

        /// Bearer token
        #[arg(long)]
        bearer: Option<String>,

        /// Basic credentials, `user:pass`
        #[arg(long)]
        basic: Option<String>,

        /// Skip address validation (trusted targets only)
        #[arg(long)]
        skip_safety_check: bool,
    },
    /// Print the safety verdict for a URL
    Check { url: String },
}

fn load(path: Option<&PathBuf>) -> Result<ProxyConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    })
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("header '{raw}' is not `name: value`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header '{raw}' has an empty name"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn auth_from_flags(bearer: Option<String>, basic: Option<String>) -> Auth {
    if let Some(token) = bearer {
        return Auth::Bearer { token };
    }
    match basic {
        Some(pair) => {
            let (username, password) = pair.split_once(':').unwrap_or((pair.as_str(), ""));
            Auth::Basic {
                username: username.to_string(),
                password: password.to_string(),
            }
        }
        None => Auth::None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(cli.config.as_ref())?;
    init_logging(&config.observability);
    let executor = Executor::from_config(&config)?;

    match cli.command {
        Commands::Send {
            method,
            url,
            headers,
            data,
            json,
            bearer,
            basic,
            skip_safety_check,
        } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;

            let mut raw = RawHeaders::new();
            for header in &headers {
                let (name, value) = parse_header(header)?;
                raw.insert(name, Value::String(value));
            }
            let applied = apply_auth(&auth_from_flags(bearer, basic), raw, BTreeMap::new());

            let mut request = ExecuteRequest::new(method, url).with_headers(applied.headers);
            if let Some(data) = data {
                request = if json {
                    request.with_body(serde_json::from_str::<Value>(&data)?)
                } else {
                    request.with_body(data)
                };
            }

            let execution = executor
                .execute(request, ExecuteOptions { skip_safety_check })
                .await;
            let output = json!({
                "result": execution.result,
                "timing": execution.timing,
                "latencyMs": execution.timing.canonical_latency(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Check { url } => {
            let verdict = executor.validator().validate(&url).await;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
    }

    Ok(())
}
