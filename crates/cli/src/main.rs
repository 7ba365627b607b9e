use std::path::{Path, PathBuf};
use std::time::Instant;

use ami_api::{AmiClient, SessionResult};
use ami_types::{ExecFailure, ExecOutcome, ExecutionOptions, Payload};
use ami_util::{AmiConfig, redact_diagnostic_url};
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use tracing::{Level, debug};

/// Command-line client for an AMI front end.
#[derive(Debug, Parser)]
#[command(name = "ami", version, about)]
struct Cli {
    /// AMI endpoint URL; overrides AMI_ENDPOINT and the config file.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Per-call timeout in milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a command template.
    Exec(ExecArgs),
    /// Sign in with a user name and password.
    SignIn {
        #[arg(long = "user")]
        username: String,
        #[arg(long, env = "AMI_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in with the client certificate.
    SignInCert,
    /// Sign in with a one-time code.
    SignInCode { code: String },
    /// Sign in with a token.
    SignInToken {
        #[arg(env = "AMI_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Sign out of the current session.
    SignOut,
    /// Evaluate a path query against a JSON document read from a file or stdin.
    Query {
        path: String,
        /// JSON file to query; stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Print the configured endpoint.
    Endpoint,
}

#[derive(Debug, Args)]
struct ExecArgs {
    /// Command template, e.g. `GetSessionInfo -AMIUser=? -AMIPass=?`.
    template: String,

    /// Positional parameter; repeat once per placeholder. Values that parse
    /// as JSON are sent as JSON, anything else as a string.
    #[arg(short = 'p', long = "param")]
    params: Vec<String>,

    /// Converter name; an empty value requests the raw server output.
    #[arg(long, conflicts_with = "raw")]
    converter: Option<String>,

    /// Request the raw server output.
    #[arg(long)]
    raw: bool,

    /// Extra form field as KEY or KEY=VALUE.
    #[arg(long = "extra", value_parser = parse_extra)]
    extras: Vec<(String, Option<String>)>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run(cli).await
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::DEBUG)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AmiConfig::load().context("failed to load AMI configuration")?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = Some(endpoint);
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }

    if let Command::Query { path, file } = &cli.command {
        return run_query(path, file.as_deref());
    }

    let client = AmiClient::from_config(&config).context("failed to create AMI client")?;
    debug!(client = ?client, "AMI client ready");
    let options = ExecutionOptions::new();

    match cli.command {
        Command::Exec(args) => run_exec(&client, args).await,
        Command::SignIn { username, password } => print_session(client.sign_in_by_password(&username, &password, options).await),
        Command::SignInCert => print_session(client.sign_in_by_certificate(options).await),
        Command::SignInCode { code } => print_session(client.sign_in_by_code(&code, options).await),
        Command::SignInToken { token } => print_session(client.sign_in_by_token(&token, options).await),
        Command::SignOut => print_session(client.sign_out(options).await),
        Command::Endpoint => {
            println!("{}", client.endpoint());
            Ok(())
        }
        Command::Query { .. } => Ok(()),
    }
}

async fn run_exec(client: &AmiClient, args: ExecArgs) -> Result<()> {
    let mut options = ExecutionOptions::new().with_params(args.params.iter().map(|raw| parse_param(raw)));
    if args.raw {
        options = options.with_converter("");
    } else if let Some(converter) = args.converter {
        options = options.with_converter(converter);
    }
    for (key, value) in args.extras {
        options = options.with_extra(key, value);
    }

    let started = Instant::now();
    let result = client.execute(&args.template, options).await;
    debug!(duration_ms = started.elapsed().as_millis(), "exec finished");
    print_exec(result)
}

fn run_query(path: &str, file: Option<&Path>) -> Result<()> {
    let text = match file {
        Some(file) => std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?,
        None => std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?,
    };
    let document: Value = serde_json::from_str(&text).context("input is not JSON")?;
    let matches = ami_util::query(path, &document)?;
    print_json(&Value::Array(matches.into_iter().cloned().collect()))
}

fn print_exec(result: Result<ExecOutcome, ExecFailure>) -> Result<()> {
    match result {
        Ok(outcome) => {
            debug!(diagnostic_url = %redact_diagnostic_url(&outcome.diagnostic_url), "exec succeeded");
            match outcome.payload.as_text() {
                Some(text) => println!("{}", text),
                None => {
                    if !outcome.message.is_empty() {
                        eprintln!("{}", outcome.message);
                    }
                    if let Payload::Json(document) = &outcome.payload {
                        print_json(document)?;
                    }
                }
            }
            Ok(())
        }
        Err(failure) => {
            debug!(diagnostic_url = %redact_diagnostic_url(&failure.diagnostic_url), "exec failed");
            bail!("{} ({})", failure.message, failure.kind)
        }
    }
}

fn print_session(result: SessionResult) -> Result<()> {
    match result {
        Ok(outcome) => print_json(&json!({
            "message": outcome.message(),
            "session": outcome.session(),
        })),
        Err(failure) => {
            print_json(&json!({
                "message": failure.message(),
                "session": failure.session(),
            }))?;
            bail!("{} ({})", failure.message(), failure.failure.kind)
        }
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// JSON scalars and structures pass through; anything else is a string.
fn parse_param(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_extra(raw: &str) -> Result<(String, Option<String>), String> {
    let (key, value) = match raw.split_once('=') {
        Some((key, value)) => (key, Some(value.to_string())),
        None => (raw, None),
    };
    if key.trim().is_empty() {
        return Err(format!("extra field '{}' has no name", raw));
    }
    Ok((key.trim().to_string(), value))
}
