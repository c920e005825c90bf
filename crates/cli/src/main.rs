//! `cprov-sign` entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: load the optional TOML file into
//!    [`SignerConfig`] and validate it.
//! 2. **Wire observability**: JSON `tracing` output on stderr, plus an OTLP
//!    exporter when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//! 3. **Construct infrastructure**: [`TokioProcessRunner`] and
//!    [`TempWorkspaceProvider`] injected into [`DocumentSigner`];
//!    [`CertificateManager`] for the `certs` commands.
//! 4. **Cancel on Ctrl-C**: a shared [`CancellationToken`] kills any running
//!    tool and removes its workspace.

mod telemetry;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use base64::Engine;
use clap::{Parser, Subcommand, ValueEnum};
use cryptcp::{CertificateManager, TempWorkspaceProvider, TokioProcessRunner};
use logging::LogFacadeLogger;
use orchestrator::DocumentSigner;
use serde::Serialize;
use signing::{
    AttachMode, ErrorCategory, Logger, Payload, Pin, SignatureProfile, SignerConfig,
    SigningError, SigningRequest, Thumbprint, TracingLogger,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "cprov-sign")]
#[command(version, about = "CAdES signing through CryptoPro CSP command-line tools")]
struct Cli {
    /// Signer configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long, env = "CPROV_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the certificate store from the configuration.
    #[arg(long, value_name = "STORE")]
    store: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Debug-level logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Where signer progress messages are sent.
    #[arg(long, value_enum, default_value = "tracing", global = true)]
    log_backend: LogBackend,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign a document.
    Sign(SignArgs),

    /// Manage certificates in the configured store.
    #[command(subcommand)]
    Certs(CertsCommand),
}

#[derive(clap::Args, Debug)]
struct SignArgs {
    /// SHA-1 thumbprint of the signer certificate.
    #[arg(short, long)]
    thumbprint: String,

    /// Key container PIN.
    #[arg(long, env = "CPROV_PIN", hide_env_values = true)]
    pin: String,

    /// Document to sign; `-` reads stdin.
    #[arg(short, long, default_value = "-", value_name = "FILE")]
    input: PathBuf,

    /// Where to write the signature. Without it the signature is printed
    /// as base64.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Embed the document in the signature.
    #[arg(long)]
    attached: bool,

    /// Signature profile (`basic`/`cades-bes` or `timestamped`/`cades-t`).
    #[arg(long, value_name = "PROFILE")]
    profile: Option<SignatureProfile>,

    /// The input is base64 text; the signature is printed as base64.
    #[arg(long, conflicts_with = "output")]
    base64: bool,
}

#[derive(Subcommand, Debug)]
enum CertsCommand {
    /// Print the store listing.
    List,

    /// Exit 0 if the certificate is installed, 1 otherwise.
    Check {
        #[arg(short, long)]
        thumbprint: String,
    },

    /// Install a PFX container.
    Install {
        /// PFX file (binary, or base64 text with `--base64`).
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,

        /// Container PIN.
        #[arg(long, env = "CPROV_PIN", hide_env_values = true)]
        pin: String,

        /// The file holds base64 text.
        #[arg(long)]
        base64: bool,
    },

    /// Delete a certificate.
    Delete {
        #[arg(short, long)]
        thumbprint: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogBackend {
    /// `tracing` events under the `signing` target.
    Tracing,
    /// The `log` facade (bridged into the same JSON output).
    Log,
}

#[derive(Serialize)]
struct SignOutput {
    signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tsp_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _telemetry = match telemetry::init(cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    match run(cli, &cancel).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            eprintln!("error: {e:#}");
            ExitCode::from(exit_status_for(&e))
        }
    }
}

async fn run(cli: Cli, cancel: &CancellationToken) -> anyhow::Result<ExitCode> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        config.store = store;
    }
    let settings = config.validate()?;

    match cli.command {
        Command::Sign(args) => {
            let logger: Arc<dyn Logger> = match cli.log_backend {
                LogBackend::Tracing => Arc::new(TracingLogger),
                LogBackend::Log => Arc::new(LogFacadeLogger::new()),
            };
            let workspaces = Arc::new(TempWorkspaceProvider::new(settings.work_dir.clone()));
            let signer = DocumentSigner::new(settings, Arc::new(TokioProcessRunner::new()), workspaces)
                .with_logger(logger);
            sign(&signer, args, cli.json, cancel).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Certs(command) => {
            let manager = CertificateManager::from_settings(&settings);
            certs(&manager, command, cli.json, cancel).await
        }
    }
}

async fn sign(
    signer: &DocumentSigner,
    args: SignArgs,
    json: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let input = read_input(&args.input)?;

    if args.base64 {
        let text = String::from_utf8(input).context("base64 input is not UTF-8")?;
        let signature = signer
            .sign_base64(
                &args.thumbprint,
                &args.pin,
                text.trim(),
                Some(args.attached),
                args.profile,
                cancel,
            )
            .await?;
        return print_signature(
            SignOutput {
                signature,
                attempts: None,
                tsp_url: None,
                signed_at: None,
                output: None,
            },
            json,
        );
    }

    let thumbprint = parse_thumbprint(&args.thumbprint)?;
    let mut request = SigningRequest::new(thumbprint, Pin::new(args.pin), Payload::new(input))
        .with_attach_mode(AttachMode::from_attach_flag(Some(args.attached)));
    if let Some(profile) = args.profile {
        request = request.with_profile(profile);
    }

    let artifact = signer.sign(&request, cancel).await?;
    if let Some(path) = &args.output {
        std::fs::write(path, &artifact.der)
            .with_context(|| format!("writing signature to {}", path.display()))?;
    }

    print_signature(
        SignOutput {
            signature: artifact.to_base64(),
            attempts: Some(artifact.attempts),
            tsp_url: artifact.tsp_url.as_ref().map(ToString::to_string),
            signed_at: Some(artifact.signed_at.to_string()),
            output: args.output,
        },
        json,
    )
}

async fn certs(
    manager: &CertificateManager,
    command: CertsCommand,
    json: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<ExitCode> {
    match command {
        CertsCommand::List => {
            let listing = manager.list(cancel).await?;
            if json {
                println!("{}", serde_json::json!({ "listing": listing }));
            } else {
                print!("{listing}");
            }
            Ok(ExitCode::SUCCESS)
        }
        CertsCommand::Check { thumbprint } => {
            let thumbprint = parse_thumbprint(&thumbprint)?;
            let installed = manager.is_installed(&thumbprint, cancel).await;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "thumbprint": thumbprint.as_str(), "installed": installed })
                );
            } else {
                println!("{}", if installed { "installed" } else { "not installed" });
            }
            Ok(if installed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        CertsCommand::Install { file, pin, base64 } => {
            let contents = std::fs::read(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let encoded = if base64 {
                String::from_utf8(contents).context("certificate file is not UTF-8")?
            } else {
                base64::engine::general_purpose::STANDARD.encode(contents)
            };
            manager.install(&encoded, &Pin::new(pin), cancel).await?;
            report(json, "installed")
        }
        CertsCommand::Delete { thumbprint } => {
            let thumbprint = parse_thumbprint(&thumbprint)?;
            manager.delete(&thumbprint, cancel).await?;
            report(json, "deleted")
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SignerConfig> {
    let Some(path) = path else {
        return Ok(SignerConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("reading stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn parse_thumbprint(raw: &str) -> Result<Thumbprint, SigningError> {
    Thumbprint::new(raw.trim()).ok_or_else(|| SigningError::InvalidInput {
        message: "thumbprint must not be empty".to_string(),
    })
}

fn print_signature(output: SignOutput, json: bool) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    if json {
        serde_json::to_writer(&mut stdout, &output)?;
        writeln!(stdout)?;
    } else if output.output.is_none() {
        writeln!(stdout, "{}", output.signature)?;
    }
    Ok(())
}

fn report(json: bool, status: &str) -> anyhow::Result<ExitCode> {
    if json {
        println!("{}", serde_json::json!({ "status": status }));
    } else {
        println!("{status}");
    }
    Ok(ExitCode::SUCCESS)
}

/// 2 for caller mistakes, 130 for cancellation, 1 otherwise.
fn exit_status_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<SigningError>().map(SigningError::category) {
        Some(ErrorCategory::Input | ErrorCategory::Configuration) => 2,
        Some(ErrorCategory::Cancelled) => 130,
        _ => 1,
    }
}
