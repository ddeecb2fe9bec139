use std::path::PathBuf;

use clap::Parser;
use produce::{BuildOptions, Engine};

#[derive(Parser)]
#[command(name = "produce")]
#[command(about = "A pattern-rule, dependency-directed build driver")]
#[command(version)]
struct Cli {
    /// Force-rebuild every target reached
    #[arg(short = 'B', long = "always-build")]
    always_build: bool,

    /// Verbose debug logging
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Rule file
    #[arg(short = 'f', long = "file", default_value = "produce.ini")]
    file: PathBuf,

    /// Number of recipes to run concurrently
    #[arg(short = 'j', long = "jobs", default_value_t = 1)]
    jobs: usize,

    /// Print recipes without executing them
    #[arg(short = 'n', long = "dry-run")]
    dry_run: bool,

    /// Do not echo recipes
    #[arg(short = 's', long = "silent")]
    silent: bool,

    /// Treat PATH as up to date this run (repeatable)
    #[arg(short = 'u', long = "pretend-up-to-date", value_name = "PATH")]
    pretend_up_to_date: Vec<String>,

    /// Targets to produce (default: the 'default' global)
    #[arg()]
    targets: Vec<String>,
}

fn init_logging(debug: bool) {
    use tracing_subscriber::EnvFilter;
    let filter = if debug {
        EnvFilter::new("produce=debug")
    } else {
        EnvFilter::try_from_env("PRODUCE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(err: impl std::fmt::Display) -> ! {
    eprintln!("produce: {}", err);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let options = BuildOptions {
        file: cli.file,
        jobs: cli.jobs,
        always_build: cli.always_build,
        dry_run: cli.dry_run,
        silent: cli.silent,
        pretend_up_to_date: cli.pretend_up_to_date,
    };

    let engine = match Engine::load(options) {
        Ok(engine) => engine,
        Err(err) => fail(err),
    };
    let targets = match engine.requested_targets(&cli.targets) {
        Ok(targets) => targets,
        Err(err) => fail(err),
    };

    if let Err(err) = engine.run(&targets).await {
        fail(err);
    }
}
