use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use notary_artifact::{ArtifactSet, Checksums, CollectOptions, Manifest};
use notary_core::store::write_atomic;
use notary_core::{verify_dir, ConfigError, NotaryConfig, NotaryError, NotaryJob, RunOutcome};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

fn cli() -> Command {
    Command::new("evidence-notary")
        .version(notary_core::VERSION)
        .about("Merkle-root notarization of generated artifact sets")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines on stderr"),
        )
        .subcommand(
            Command::new("run")
                .about("Hash, anchor, pin and persist a proof bundle")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .short('c')
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration file"),
                )
                .arg(
                    Arg::new("input")
                        .long("input")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory of artifacts to notarize (overrides config)"),
                )
                .arg(
                    Arg::new("store")
                        .long("store")
                        .value_parser(value_parser!(PathBuf))
                        .help("Evidence store directory (overrides config)"),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Persist a new bundle even if the manifest is unchanged"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Check files against a manifest")
                .arg(
                    Arg::new("manifest")
                        .long("manifest")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Manifest file"),
                )
                .arg(
                    Arg::new("dir")
                        .long("dir")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory the manifest names are relative to"),
                ),
        )
        .subcommand(
            Command::new("checksums")
                .about("Write the checksums file for a directory")
                .arg(
                    Arg::new("dir")
                        .long("dir")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory to checksum"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .value_parser(value_parser!(PathBuf))
                        .help("Output file (stdout if omitted)"),
                ),
        )
        .subcommand(
            Command::new("root")
                .about("Print the Merkle root of the given files")
                .arg(
                    Arg::new("files")
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(PathBuf))
                        .help("Files to include, named relative to --base"),
                )
                .arg(
                    Arg::new("base")
                        .long("base")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Base directory for artifact names"),
                )
                .arg(
                    Arg::new("manifest")
                        .long("manifest")
                        .action(ArgAction::SetTrue)
                        .help("Print the full manifest instead of only the root"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(args: &ArgMatches) -> Result<ExitCode> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => NotaryConfig::load(path)?,
        None => NotaryConfig::default(),
    };
    if let Some(input) = args.get_one::<PathBuf>("input") {
        config = config.with_input_dir(input);
    }
    if let Some(store) = args.get_one::<PathBuf>("store") {
        config = config.with_store_dir(store);
    }

    let job = NotaryJob::new(config).with_force(args.get_flag("force"));
    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::warn!("interrupt received; stopping before persist"),
            Err(e) => {
                tracing::warn!("cannot listen for interrupts: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    let report = job.execute_until(shutdown).await?;

    println!("root      {}", report.run.root);
    println!("artifacts {}", report.run.artifacts);
    match &report.run.outcome {
        RunOutcome::Persisted { bundle, status } => {
            println!("bundle    {} (generation {})", bundle.name, bundle.generation);
            for item in &status.missing {
                println!("missing   {item}");
            }
        }
        RunOutcome::Unchanged { bundle } => {
            println!("unchanged since {}", bundle.name);
        }
    }
    println!(
        "checksums {} ({} files)",
        report.checksums_path.display(),
        report.checksummed
    );
    Ok(ExitCode::SUCCESS)
}

fn verify(args: &ArgMatches) -> Result<ExitCode> {
    let manifest_path = args
        .get_one::<PathBuf>("manifest")
        .context("--manifest is required")?;
    let dir = args.get_one::<PathBuf>("dir").context("--dir is required")?;

    let text = std::fs::read_to_string(manifest_path)
        .with_context(|| format!("cannot read manifest {}", manifest_path.display()))?;
    let manifest = Manifest::parse(&text)
        .with_context(|| format!("invalid manifest {}", manifest_path.display()))?;

    let report = verify_dir(&manifest, dir);
    for discrepancy in &report.discrepancies {
        println!("FAILED  {discrepancy}");
    }
    println!(
        "{} of {} entries verified, root {}",
        report.verified,
        manifest.len(),
        manifest.root()
    );
    Ok(if report.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILURE)
    })
}

fn checksums(args: &ArgMatches) -> Result<ExitCode> {
    let dir = args.get_one::<PathBuf>("dir").context("--dir is required")?;
    let out = args.get_one::<PathBuf>("out");

    let mut options = CollectOptions::default().include_hidden();
    if let Some(out) = out {
        options = options.exclude(out.clone());
    }
    let sums = Checksums::compute(dir, &options)
        .with_context(|| format!("cannot checksum {}", dir.display()))?;

    match out {
        Some(out) => {
            write_atomic(out, sums.to_text().as_bytes())?;
            tracing::info!("wrote {} checksums to {}", sums.len(), out.display());
        }
        None => print!("{}", sums.to_text()),
    }
    Ok(ExitCode::SUCCESS)
}

fn root(args: &ArgMatches) -> Result<ExitCode> {
    let base = args.get_one::<PathBuf>("base").context("--base is required")?;
    let files: Vec<&PathBuf> = args
        .get_many::<PathBuf>("files")
        .context("no files given")?
        .collect();

    let set = ArtifactSet::collect_paths(base, &files)?;
    let manifest = Manifest::from_hashed(&set.hash_all())?;
    if args.get_flag("manifest") {
        print!("{}", manifest.to_text());
    } else {
        println!("{}", manifest.root());
    }
    Ok(ExitCode::SUCCESS)
}

fn exit_status(err: &anyhow::Error) -> u8 {
    if let Some(notary) = err.downcast_ref::<NotaryError>() {
        return match notary {
            NotaryError::Cancelled { .. } => EXIT_CANCELLED,
            NotaryError::Config(_) => EXIT_CONFIG,
            _ => EXIT_FAILURE,
        };
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_CONFIG;
    }
    EXIT_FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let result = match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("verify", args)) => verify(args),
        Some(("checksums", args)) => checksums(args),
        Some(("root", args)) => root(args),
        _ => Ok(ExitCode::from(EXIT_CONFIG)),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}
