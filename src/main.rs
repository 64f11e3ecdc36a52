use anyhow::{Context, Result, ensure};
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env, Target};
use log::{error, info, warn};
use pratilogin::{
    config::{AppConfig, ForcePolicy},
    http_client::SonicWallTransport,
    services::{
        connectivity::{ConnectivityCheck, ConnectivityProbe},
        portal::PortalAuthenticator,
        session::SessionOrchestrator,
        sleeper::ThreadSleeper,
    },
    store::{ConfigStore, keychain::KeyringCredentialStore, settings::IniConfigStore},
    types::{Outcome, username_hint},
};
use serde::Serialize;
use std::{
    fs::OpenOptions,
    io::{BufRead, IsTerminal, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

/// Exit status of a command that ran fine but did not get the host online
const EXIT_NOT_CONNECTED: u8 = 2;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Directory holding config.ini and autologin.log
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Log in unless the internet is already reachable (default)
    Login,
    /// Force a login on the last used gateway, retrying on failure
    Force {
        /// Maximum number of attempts
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        attempts: Option<u32>,
        /// Pause between attempts in milliseconds
        #[arg(long, value_name = "MS")]
        delay_ms: Option<u64>,
    },
    /// Check whether the internet is reachable
    Status,
    /// Manage the stored portal credentials
    #[command(subcommand)]
    Credentials(CredentialsCommand),
    /// List the configured gateways
    Locations,
}

#[derive(Subcommand)]
enum CredentialsCommand {
    /// Store a username, the password is read from stdin
    Set {
        #[arg(long)]
        username: String,
    },
    /// Remove the stored username and password
    Delete,
}

#[derive(Serialize)]
struct StatusView {
    connected: bool,
}

#[derive(Serialize)]
struct LocationView<'a> {
    name: &'a str,
    base_url: &'a str,
    last_used: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            error!("application error: {e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config_dir).context("failed to load configuration")?;

    initialize(&config.paths.log_file);

    let settings = IniConfigStore::open(&config.paths.config_file)
        .context("failed to open settings")?;
    let keyring = KeyringCredentialStore::new(config.keyring_service.as_str());

    let transport =
        SonicWallTransport::new(config.timeouts).context("failed to create portal client")?;
    let probe = ConnectivityProbe::new(&transport);
    let authenticator =
        PortalAuthenticator::new(&probe, &transport, ThreadSleeper, config.timeouts.settle);
    let session = SessionOrchestrator::new(&settings, &keyring, &authenticator, ThreadSleeper);

    match cli.command.unwrap_or(Command::Login) {
        Command::Login => {
            let credentials = session.credentials(settings.username()?.as_deref())?;

            let report = if settings.is_first_run() {
                info!("first run, forcing login");
                let report = session.bootstrap(&credentials)?;
                if credentials.is_complete() {
                    settings.mark_first_run_completed()?;
                }
                report
            } else {
                session.connect(&credentials)?
            };

            emit(cli.json, &report, || describe(report.outcome, report.endpoint.as_deref()))?;
            Ok(exit_code(report.outcome.is_connected()))
        }
        Command::Force { attempts, delay_ms } => {
            let policy = ForcePolicy {
                max_attempts: attempts.unwrap_or(config.force.max_attempts),
                delay: delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(config.force.delay),
            };

            let credentials = session.credentials(settings.username()?.as_deref())?;
            let report = session.force(&credentials, policy)?;

            emit(cli.json, &report, || {
                format!(
                    "{} after {} attempt(s)",
                    describe(report.outcome, report.endpoint.as_deref()),
                    report.attempts
                )
            })?;
            Ok(exit_code(report.success))
        }
        Command::Status => {
            let connected = probe.is_connected();

            emit(cli.json, &StatusView { connected }, || {
                if connected {
                    "internet reachable".to_string()
                } else {
                    "internet not reachable".to_string()
                }
            })?;
            Ok(exit_code(connected))
        }
        Command::Credentials(CredentialsCommand::Set { username }) => {
            let password = read_password()?;

            if let Some(previous) = settings.username()?.filter(|name| *name != username) {
                info!("username changed, removing password of previous user");
                if let Err(e) = keyring.delete(&previous) {
                    warn!("failed to remove previous password: {e:#}");
                }
            }

            keyring.save(&username, &password)?;
            settings.set_username(&username)?;

            println!("credentials saved for {}", username_hint(&username));
            Ok(ExitCode::SUCCESS)
        }
        Command::Credentials(CredentialsCommand::Delete) => {
            match settings.username()? {
                Some(username) => {
                    keyring.delete(&username)?;
                    settings.clear_username()?;
                    println!("credentials deleted for {}", username_hint(&username));
                }
                None => println!("no credentials stored"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Locations => {
            let endpoints = settings.endpoints()?;
            let last = settings.last_endpoint()?;

            let views: Vec<LocationView> = endpoints
                .iter()
                .map(|endpoint| LocationView {
                    name: &endpoint.name,
                    base_url: &endpoint.base_url,
                    last_used: last.as_deref() == Some(endpoint.name.as_str()),
                })
                .collect();

            emit(cli.json, &views, || {
                views
                    .iter()
                    .map(|view| {
                        let marker = if view.last_used { "*" } else { " " };
                        format!("{marker} {:<10} {}", view.name, view.base_url)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn initialize(log_file: &Path) {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| {
        writeln!(
            f,
            "{} - {} - {} - {}",
            f.timestamp_millis(),
            record.level(),
            record.module_path().unwrap_or_default(),
            record.args()
        )
    });

    match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(file) => {
            builder.target(Target::Pipe(Box::new(file)));
        }
        Err(e) => {
            eprintln!("failed to open log file {log_file:?}, logging to stderr: {e}");
            builder.target(Target::Stderr);
        }
    }

    builder.init();

    info!("pratilogin version: {}", env!("CARGO_PKG_VERSION"));
}

/// Password for `credentials set`, typed without echo on a terminal
fn read_password() -> Result<String> {
    let stdin = std::io::stdin();

    if stdin.is_terminal() {
        let password = rpassword::prompt_password("password: ")
            .context("failed to read password from terminal")?;
        ensure!(!password.is_empty(), "password must not be empty");
        return Ok(password);
    }

    password_from_line(&mut stdin.lock())
}

fn password_from_line(reader: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .context("failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    ensure!(!password.is_empty(), "password must not be empty");

    Ok(password)
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        let output = serde_json::to_string_pretty(value).context("failed to serialize output")?;
        println!("{output}");
    } else {
        println!("{}", text());
    }

    Ok(())
}

fn describe(outcome: Outcome, endpoint: Option<&str>) -> String {
    match endpoint {
        Some(name) => format!("{outcome} ({name})"),
        None => outcome.to_string(),
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_NOT_CONNECTED)
    }
}
