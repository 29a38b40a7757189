use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use bearer_gate::{Outcome, load_config_from_file, normalize_discovery_uri};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bearer-gate", about = "Bearer token gate: inspect configuration and try requests")]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the discovery document URI for a provider URL
    DiscoveryUri { provider_url: String },
    /// Run one request through an engine built from a config file
    Check {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value = "/")]
        path: String,
        /// Request header, "Name: value". Repeatable.
        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
        /// Role to probe on success. Repeatable.
        #[arg(long = "role")]
        roles: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::DiscoveryUri { provider_url } => {
            let uri = normalize_discovery_uri(&provider_url);
            pout(cli.json, json!({ "discovery_uri": uri }), &uri)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check {
            config,
            path,
            headers,
            roles,
        } => check(cli.json, &config, &path, &headers, &roles).await,
    }
}

async fn check(
    json_mode: bool,
    config: &Path,
    path: &str,
    headers: &[(String, String)],
    roles: &[String],
) -> anyhow::Result<ExitCode> {
    let engine = load_config_from_file(config)?
        .build_engine()
        .with_context(|| format!("building engine from {}", config.display()))?;

    let mut request = http::Request::builder().uri(path);
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    let request = request.body(()).context("invalid request")?;
    debug!(%path, headers = headers.len(), "checking request");

    match engine.authenticate(request).await {
        Outcome::Excluded(_) => {
            pout(json_mode, json!({ "outcome": "excluded" }), "excluded: path bypasses authentication")?;
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Authenticated(auth) => {
            let probes: serde_json::Map<String, serde_json::Value> = roles
                .iter()
                .map(|r| (r.clone(), json!(auth.is_user_in_role(r))))
                .collect();
            let mut text = format!(
                "authenticated: user={}",
                auth.remote_user().unwrap_or("<none>")
            );
            for (role, member) in &probes {
                text.push_str(&format!("\n  role {role}: {member}"));
            }
            pout(
                json_mode,
                json!({
                    "outcome": "authenticated",
                    "remote_user": auth.remote_user(),
                    "roles": probes,
                    "claims": auth.verified_token().claims(),
                }),
                &text,
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Challenge(rejection) => {
            pout(
                json_mode,
                json!({
                    "outcome": "challenge",
                    "status": rejection.challenge.status_code(),
                    "www_authenticate": rejection.www_authenticate,
                    "reason": rejection.error.to_string(),
                }),
                &format!(
                    "{} {}\nWWW-Authenticate: {}\nreason: {}",
                    rejection.challenge.status_code(),
                    rejection.challenge.error_code(),
                    rejection.www_authenticate,
                    rejection.error
                ),
            )?;
            Ok(ExitCode::FAILURE)
        }
        Outcome::Error(failure) => {
            pout(
                json_mode,
                json!({ "outcome": "error", "status": 500, "reason": failure.error.to_string() }),
                &format!("500 internal error: {}", failure.error),
            )?;
            Ok(ExitCode::FAILURE)
        }
    }
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    let pos = s.find(':').ok_or_else(|| "must be \"Name: value\"".to_string())?;
    Ok((s[..pos].trim().to_string(), s[pos + 1..].trim().to_string()))
}

fn pout(json_mode: bool, value: serde_json::Value, text: &str) -> anyhow::Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_split_on_first_colon() {
        assert_eq!(
            parse_header("Authorization: Bearer a:b").unwrap(),
            ("Authorization".to_string(), "Bearer a:b".to_string())
        );
        assert!(parse_header("no colon").is_err());
    }

    #[test]
    fn cli_parses_check() {
        let cli = Cli::parse_from([
            "bearer-gate", "check", "--config", "gate.toml", "--path", "/x",
            "-H", "X-Token: t", "--role", "admin",
        ]);
        let Commands::Check { headers, roles, .. } = cli.command else {
            panic!("expected check");
        };
        assert_eq!(headers, vec![("X-Token".to_string(), "t".to_string())]);
        assert_eq!(roles, vec!["admin".to_string()]);
    }
}
