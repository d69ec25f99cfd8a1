use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wp2strapi_core::config::{DEFAULT_CONFIG_FILENAME, ResolvedSettings, load_config};
use wp2strapi_core::migrate::{MigrationReport, PhaseReport, run_migration};

#[derive(Debug, Parser)]
#[command(
    name = "wp2strapi",
    version,
    about = "Migrate WordPress categories, posts and pages into Strapi"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved settings before running")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run every migration phase: categories, posts, pages")]
    Run(RunArgs),
    #[command(about = "Print the resolved settings")]
    Config,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run(args)) => run(cli.config.as_deref(), cli.diagnostics, args),
        Some(Commands::Config) => run_config(cli.config.as_deref()),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run(config: Option<&Path>, diagnostics: bool, args: RunArgs) -> Result<()> {
    init_tracing("info")?;
    let settings = resolve_settings(config)?;
    if diagnostics {
        println!("[diagnostics]\n{}\n", settings.diagnostics());
    }

    let report = run_migration(&settings)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn run_config(config: Option<&Path>) -> Result<()> {
    let settings = resolve_settings(config)?;
    println!("{}", settings.diagnostics());
    Ok(())
}

fn resolve_settings(config: Option<&Path>) -> Result<ResolvedSettings> {
    dotenvy::dotenv().ok();

    let config_path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
    let parsed = load_config(&config_path)?;
    ResolvedSettings::from_process(&parsed)
        .with_context(|| format!("config: {}", normalize_path(&config_path)))
}

fn init_tracing(default_filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing: {error}"))
}

fn print_report(report: &MigrationReport) {
    println!("migration report");
    print_phase("categories", &report.categories);
    print_phase("posts", &report.posts);
    print_phase("pages", &report.pages);
    println!("pages.tours: {}", report.pages.tours);
    println!("images.uploaded: {}", report.images.uploaded);
    println!("images.cache_hits: {}", report.images.cache_hits);
    println!("images.failed: {}", report.images.failed);
    println!("requests.source: {}", report.source_requests);
    println!("requests.destination: {}", report.destination_requests);
    println!("success: {}", format_flag(report.success));
}

fn print_phase(prefix: &str, phase: &PhaseReport) {
    println!("{prefix}.fetched: {}", phase.fetched);
    println!("{prefix}.created: {}", phase.created);
    println!("{prefix}.failed: {}", phase.failed);
    for error in &phase.errors {
        println!("{prefix}.error: {error}");
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
