//! translit-check - conformance runner entry point
//!
//! Loads the harness configuration and the YAML corpus, drives the live page
//! through Playwright and reports a verdict per case.
//!
//! Exit status: 0 when every case passed, 1 when any case failed, 2 when the
//! run was aborted or could not be set up.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use translit_harness::config::{BrowserEngine, StrategyKind};
use translit_harness::driver::PlaywrightLauncher;
use translit_harness::{Bucket, Corpus, HarnessConfig, Preflight, Selection, Suite, SuiteReport};

mod output;

use output::{LogFormat, OutputFormat};

/// Conformance checks for the Singlish to Sinhala transliteration page
#[derive(Parser)]
#[command(name = "translit-check")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Harness configuration file
    #[arg(short, long, default_value = "harness.toml", env = "TRANSLIT_CONFIG", global = true)]
    config: PathBuf,

    /// Corpus directory (overrides run.corpus_dir)
    #[arg(long, env = "TRANSLIT_CORPUS_DIR", global = true)]
    corpus_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Log line format
    #[arg(long, default_value = "text", env = "TRANSLIT_LOG_FORMAT", global = true)]
    log_format: LogFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the corpus against the live page
    Run(RunArgs),

    /// Load and validate the configuration and corpus
    Validate,

    /// List corpus cases
    List(FilterArgs),
}

#[derive(Args, Default)]
struct FilterArgs {
    /// Only the case with this id
    #[arg(long = "case")]
    case_id: Option<String>,

    /// Only cases of this bucket
    #[arg(long)]
    bucket: Option<Bucket>,

    /// Only cases of this category
    #[arg(long)]
    category: Option<String>,
}

impl FilterArgs {
    fn selection(&self) -> Selection {
        Selection {
            case_id: self.case_id.clone(),
            bucket: self.bucket,
            category: self.category.clone(),
        }
    }
}

#[derive(Args, Default)]
struct RunArgs {
    #[command(flatten)]
    filter: FilterArgs,

    /// Target page URL
    #[arg(long, env = "TRANSLIT_URL")]
    url: Option<String>,

    /// Quiescence strategy: fixed or rearming
    #[arg(long, env = "TRANSLIT_SYNC_STRATEGY")]
    strategy: Option<StrategyKind>,

    /// Browser engine: chromium, firefox or webkit
    #[arg(long, env = "TRANSLIT_BROWSER")]
    browser: Option<BrowserEngine>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Run each bucket on its own browser session
    #[arg(long)]
    parallel: bool,

    /// Skip the HTTP reachability probe
    #[arg(long)]
    no_preflight: bool,

    /// Do not require an empty output after each reset
    #[arg(long)]
    no_verify_reset: bool,

    /// Skip the one-shot re-submission of interactive cases
    #[arg(long)]
    no_convergence: bool,

    /// Directory for the JSON report (overrides run.output_dir)
    #[arg(long, env = "TRANSLIT_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    let result = match cli.command.as_ref().unwrap_or(&Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run(&cli, args).await,
        Commands::Validate => validate(&cli).map(|_| ExitCode::SUCCESS),
        Commands::List(filter) => list(&cli, filter).map(|_| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<HarnessConfig> {
    let mut config = HarnessConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(dir) = &cli.corpus_dir {
        config.run.corpus_dir = dir.clone();
    }
    Ok(config)
}

fn load_corpus(config: &HarnessConfig) -> anyhow::Result<Corpus> {
    Corpus::load_dir(&config.run.corpus_dir)
        .with_context(|| format!("loading corpus from {}", config.run.corpus_dir.display()))
}

fn apply_overrides(config: &mut HarnessConfig, args: &RunArgs) {
    if let Some(url) = &args.url {
        config.target.url = url.clone();
    }
    if let Some(strategy) = args.strategy {
        config.sync.strategy = strategy;
    }
    if let Some(engine) = args.browser {
        config.browser.engine = engine;
    }
    if args.headed {
        config.browser.headless = false;
    }
    if args.no_preflight {
        config.run.preflight = false;
    }
    if args.no_verify_reset {
        config.run.verify_reset = false;
    }
    if args.no_convergence {
        config.run.check_convergence = false;
    }
    if let Some(dir) = &args.output_dir {
        config.run.output_dir = dir.clone();
    }
}

async fn run(cli: &Cli, args: &RunArgs) -> anyhow::Result<ExitCode> {
    let mut config = load_config(cli)?;
    apply_overrides(&mut config, args);
    config.validate()?;

    let corpus = load_corpus(&config)?.select(&args.filter.selection());
    if corpus.is_empty() {
        anyhow::bail!("no cases match the given filters");
    }
    info!("Loaded {} case(s) (digest {})", corpus.len(), corpus.digest());

    let suite = Suite::from_config(&config);

    let report = if config.run.preflight {
        match Preflight::default().check(&config.target.url).await {
            Ok(()) => None,
            Err(e) => {
                error!("Preflight failed: {}", e);
                let cases: Vec<_> = corpus.iter().collect();
                let mut report = SuiteReport::new(corpus.digest(), suite.strategy_name());
                report.abort(&e, &cases);
                Some(report)
            }
        }
    } else {
        None
    };

    let report = match report {
        Some(report) => report,
        None => {
            let launcher = PlaywrightLauncher::new(config.clone());
            if args.parallel {
                suite.run_parallel(&launcher, &corpus).await
            } else {
                suite.run(&launcher, &corpus).await
            }
        }
    };

    output::print_report(&report, cli.format);
    report.write_json(&config.run.output_dir)?;

    Ok(if report.fatal.is_some() {
        ExitCode::from(2)
    } else if report.failed > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn validate(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    config.validate()?;
    let corpus = load_corpus(&config)?;

    for bucket in Bucket::ALL {
        output::print_info(&format!("{:<12} {} case(s)", bucket, corpus.bucket(bucket).len()));
    }
    output::print_success(&format!(
        "{} case(s) valid, digest {}",
        corpus.len(),
        corpus.digest()
    ));
    Ok(())
}

fn list(cli: &Cli, filter: &FilterArgs) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let corpus = load_corpus(&config)?.select(&filter.selection());

    let rows: Vec<_> = corpus.iter().collect();
    output::print_list(&rows, cli.format);
    Ok(())
}
