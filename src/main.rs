// src/main.rs

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use deplint::packages::rpm::RpmPackage;
use deplint::packages::{PackageFormat, PackageRecord};
use deplint::repository::cache::{CacheConfig, MetadataCache};
use deplint::repository::{RepoSpec, Repository, RepositoryClient, RepositoryLoader};
use deplint::resolver::{arch, engine, CheckKind, Pool, EXIT_OK, EXIT_SETUP_ERROR};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::SystemTime;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "deplint")]
#[command(author, version, long_about = None)]
#[command(about = "Dependency consistency checks for RPM packages")]
struct Cli {
    /// Show debug logging on stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every check against the repositories
    Check(CheckArgs),
    /// Check that the packages under test have all requirements satisfied
    CheckSat(CheckArgs),
    /// Check that repository packages still resolve with the packages under test
    CheckRepoclosure(CheckArgs),
    /// Check for undeclared file conflicts
    CheckConflicts(CheckArgs),
    /// Check that no repository package would upgrade the packages under test
    CheckUpgrade(CheckArgs),
    /// List the packages providing each requirement of the packages under test
    ListDeps(CheckArgs),
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// Repository to test against (repeatable)
    #[arg(long = "repo", value_name = "NAME,URL", required = true)]
    repos: Vec<RepoSpec>,

    /// Target architecture (guessed from the packages if omitted)
    #[arg(long)]
    arch: Option<String>,

    /// Package files under test
    #[arg(required = true)]
    packages: Vec<PathBuf>,
}

/// Reject anything that is not an RPM, by extension or lead magic
fn ensure_rpm(path: &Path) -> Result<()> {
    if path.extension().is_some_and(|ext| ext == "rpm") {
        return Ok(());
    }

    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    // RPM lead magic: 0xED 0xAB 0xEE 0xDB
    if magic == [0xED, 0xAB, 0xEE, 0xDB] {
        return Ok(());
    }

    Err(anyhow::anyhow!("Not an RPM package: {}", path.display()))
}

fn read_package(path: &Path) -> Result<PackageRecord> {
    ensure_rpm(path)?;
    let rpm = RpmPackage::parse(&path.to_string_lossy())?;
    debug!("Read {} ({})", rpm.name(), rpm.architecture());
    Ok(rpm.to_record())
}

fn read_packages(paths: &[PathBuf]) -> Result<Vec<PackageRecord>> {
    paths.iter().map(|path| read_package(path)).collect()
}

/// Everything a check needs, assembled from the command line
struct Universe {
    under_test: Vec<PackageRecord>,
    repos: Vec<Repository>,
    target_arch: String,
}

fn assemble(args: &CheckArgs, kind: CheckKind) -> Result<Universe> {
    let under_test = read_packages(&args.packages)?;
    let target_arch = arch::resolve_target_arch(args.arch.as_deref(), &under_test)?;
    info!("Testing {} packages for {}", under_test.len(), target_arch);

    let cache = MetadataCache::new(CacheConfig::from_env());
    let swept = cache.sweep_expired(SystemTime::now());
    debug!(
        "Removed {} expired cache entries from {}",
        swept,
        cache.config().root.display()
    );

    let client = RepositoryClient::new()?;
    let loader = RepositoryLoader::new(&client, &cache);
    let mut repos = loader.load_all(&args.repos)?;

    if kind.needs_file_digests() {
        loader
            .resolve_file_digests(&mut repos, &under_test, |pkg| {
                arch::is_compatible(&target_arch, &pkg.arch)
            })
            .context("Failed to read file digests of repository packages")?;
    }

    Ok(Universe {
        under_test,
        repos,
        target_arch,
    })
}

/// Text a command produced and the exit code it maps to
#[derive(Debug, Default)]
struct Outcome {
    stdout: String,
    stderr: String,
    code: u8,
}

fn run_check(kind: CheckKind, args: &CheckArgs) -> Result<Outcome> {
    let universe = assemble(args, kind)?;
    let pool = Pool::build(&universe.repos, &universe.under_test);
    let pool = arch::filter_compatible(&pool, &universe.target_arch);

    let report = engine::run(kind, &pool);
    Ok(Outcome {
        stderr: report.render(),
        code: kind.exit_code(&report),
        ..Default::default()
    })
}

fn list_deps(args: &CheckArgs) -> Result<Outcome> {
    let universe = assemble(args, CheckKind::Sat)?;
    let pool = Pool::build(&universe.repos, &universe.under_test);
    let pool = arch::filter_compatible(&pool, &universe.target_arch);

    let mut stdout = String::new();
    for (pkg, deps) in engine::list_deps(&pool) {
        writeln!(stdout, "{} has {} dependencies:", pkg, deps.len())?;
        for dep in deps {
            writeln!(stdout, "\t{}", dep)?;
        }
    }
    Ok(Outcome {
        stdout,
        code: EXIT_OK,
        ..Default::default()
    })
}

fn completions(shell: Shell) -> Outcome {
    let mut script = Vec::new();
    clap_complete::generate(shell, &mut Cli::command(), "deplint", &mut script);
    Outcome {
        stdout: String::from_utf8_lossy(&script).into_owned(),
        code: EXIT_OK,
        ..Default::default()
    }
}

/// Run one command; setup failures become exit code 2 with no report
fn execute(command: &Commands) -> Outcome {
    let result = match command {
        Commands::Check(args) => run_check(CheckKind::Full, args),
        Commands::CheckSat(args) => run_check(CheckKind::Sat, args),
        Commands::CheckRepoclosure(args) => run_check(CheckKind::Repoclosure, args),
        Commands::CheckConflicts(args) => run_check(CheckKind::Conflicts, args),
        Commands::CheckUpgrade(args) => run_check(CheckKind::Upgrade, args),
        Commands::ListDeps(args) => list_deps(args),
        Commands::Completions { shell } => Ok(completions(*shell)),
    };

    result.unwrap_or_else(|e| Outcome {
        stderr: format!("{:#}\n", e),
        code: EXIT_SETUP_ERROR,
        ..Default::default()
    })
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let outcome = execute(&cli.command);
    print!("{}", outcome.stdout);
    eprint!("{}", outcome.stderr);
    ExitCode::from(outcome.code)
}
