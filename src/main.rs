use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use refguard::config::{Backend, Config};
use refguard::extract::extract_tag;
use refguard::gate::{check_commit, check_tag, Gate, Rejection};
use refguard::hook::read_updates;
use refguard::store::{GitCliStore, GitRepoStore, ObjectStore};
use refguard::trust::{AuthorizedKeySet, TrustResolver};
use refguard_protocol::{PublicKey, SshSig};

/// Exit code for a rejected push or signature.
const EXIT_REJECTED: u8 = 1;
/// Exit code for unusable input or configuration.
const EXIT_ERROR: u8 = 2;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as a pre-receive hook: read ref updates on stdin, accept only
    /// signed ones
    PreReceive {
        /// Repository to read from (defaults to GIT_DIR and the push
        /// quarantine environment)
        #[arg(long, value_name = "PATH")]
        git_dir: Option<PathBuf>,
    },
    /// Verify the signature of a raw commit object read from stdin
    CheckCommit {
        #[command(flatten)]
        check: CheckArgs,
    },
    /// Verify the signatures of a raw tag object read from stdin
    CheckTag {
        #[command(flatten)]
        check: CheckArgs,
    },
    /// Print the signatures trailing a tag object read from stdin
    Inspect,
    /// Print the keys authorized to sign updates to a ref
    Keys {
        #[arg(value_name = "REF")]
        refname: String,

        #[arg(long, value_name = "PATH")]
        git_dir: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct CheckArgs {
    /// authorized_keys file; every key is accepted when omitted
    #[arg(long, value_name = "FILE")]
    authorized_keys: Option<PathBuf>,

    /// Required signature namespace (defaults to the configured one)
    #[arg(long)]
    namespace: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("refguard: {e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    match args.command {
        Commands::PreReceive { git_dir } => {
            let config = load_config(git_dir.as_deref())?;
            init_tracing(&config.log_level);
            pre_receive(&config, git_dir.as_deref())
        }
        Commands::CheckCommit { check } => {
            let config = load_config(None)?;
            init_tracing(&config.log_level);
            check_object(&config, &check, check_commit)
        }
        Commands::CheckTag { check } => {
            let config = load_config(None)?;
            init_tracing(&config.log_level);
            check_object(&config, &check, check_tag)
        }
        Commands::Inspect => {
            let config = load_config(None)?;
            init_tracing(&config.log_level);
            inspect()
        }
        Commands::Keys { refname, git_dir } => {
            let config = load_config(git_dir.as_deref())?;
            init_tracing(&config.log_level);
            list_keys(&config, git_dir.as_deref(), &refname)
        }
    }
}

/// `RUST_LOG` wins over the configured level. Diagnostics go to stderr,
/// which git relays to the pushing client.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}

/// Repository config lives in the git dir: the explicit one, or the
/// `GIT_DIR` git exports to hooks.
fn load_config(git_dir: Option<&Path>) -> Result<Config> {
    let env_dir = std::env::var_os("GIT_DIR").map(PathBuf::from);
    Config::load(git_dir.or(env_dir.as_deref())).context("Failed to load config")
}

fn open_store(config: &Config, git_dir: Option<&Path>) -> Result<Box<dyn ObjectStore>> {
    let store: Box<dyn ObjectStore> = match config.backend {
        Backend::Libgit2 => {
            let store = match git_dir {
                Some(dir) => GitRepoStore::open(dir),
                None => GitRepoStore::open_from_env(),
            };
            Box::new(store.context("Failed to open repository")?)
        }
        Backend::Cli => Box::new(GitCliStore::new(git_dir.map(Path::to_path_buf))),
    };
    Ok(store)
}

fn pre_receive(config: &Config, git_dir: Option<&Path>) -> Result<ExitCode> {
    // the whole batch is parsed before anything is verified
    let updates = read_updates(BufReader::new(io::stdin().lock()))?;
    let store = open_store(config, git_dir)?;

    let report = match Gate::new(&*store, config).evaluate(&updates) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("refguard: push rejected: {e}");
            return Ok(ExitCode::from(EXIT_REJECTED));
        }
    };
    if report.accepted() {
        return Ok(ExitCode::SUCCESS);
    }

    for outcome in report.rejected() {
        eprintln!("refguard: {}: {}", outcome.update.refname, outcome.verdict);
    }
    eprintln!("refguard: push rejected, no refs were updated");
    Ok(ExitCode::from(EXIT_REJECTED))
}

fn check_object(
    config: &Config,
    args: &CheckArgs,
    check: fn(&[u8], &str, &dyn Fn(&PublicKey) -> bool) -> Result<(), Rejection>,
) -> Result<ExitCode> {
    let keys = match &args.authorized_keys {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Some(AuthorizedKeySet::from_authorized_keys(
                &text,
                &path.display().to_string(),
            ))
        }
        None => None,
    };
    let namespace = args.namespace.as_deref().unwrap_or(&config.namespace);
    let object = read_stdin()?;

    let is_allowed = |key: &PublicKey| keys.as_ref().map_or(true, |keys| keys.contains(key));
    match check(&object, namespace, &is_allowed) {
        Ok(()) => {
            println!("Good signature");
            Ok(ExitCode::SUCCESS)
        }
        Err(rejection) => {
            println!("Bad signature: {rejection}");
            Ok(ExitCode::from(EXIT_REJECTED))
        }
    }
}

fn inspect() -> Result<ExitCode> {
    let object = read_stdin()?;
    let Some(signatures) = extract_tag(&object) else {
        println!("no signatures");
        return Ok(ExitCode::SUCCESS);
    };

    for (i, segment) in signatures.enumerate() {
        println!("signature {}:", i + 1);
        let message = match segment {
            Ok(message) => message,
            Err(e) => {
                println!("  error: {e}");
                continue;
            }
        };
        println!("  signed text: {} bytes", message.signed.len());
        match SshSig::from_armored(&message.armored) {
            Ok(sig) => {
                println!("  namespace:   {}", sig.namespace);
                println!("  hash:        {}", sig.hash_algorithm);
                println!("  key:         {}", sig.public_key.algorithm());
                println!("  fingerprint: {}", sig.public_key.fingerprint());
                println!("  format:      {}", sig.signature.format);
            }
            Err(e) => println!("  error: {e}"),
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn list_keys(config: &Config, git_dir: Option<&Path>, refname: &str) -> Result<ExitCode> {
    let store = open_store(config, git_dir)?;
    let resolver = TrustResolver::new(&*store, config.metadata_layout(), config.trust_policy);
    let keys = resolver
        .resolve(refname)
        .with_context(|| format!("Failed to resolve keys for {refname}"))?;

    if keys.is_empty() {
        eprintln!("no keys authorized for {refname}");
    }
    for key in keys.iter() {
        println!("{} {}", key.fingerprint(), key.to_openssh());
    }
    Ok(ExitCode::SUCCESS)
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    io::stdin()
        .lock()
        .read_to_end(&mut buf)
        .context("Failed to read stdin")?;
    Ok(buf)
}
