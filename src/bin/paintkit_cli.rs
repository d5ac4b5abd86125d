//! PaintKit CLI - Hosts one generation session
//!
//! Commands: constraints, validate, generate
//! Outputs JSON to stdout
//! Returns 2 on validation or generation failure

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use paintkit_core::{
    config::API_BASE_URL_ENV, export_result, validate_file, validate_form, AppConfig, CandidateFile,
    ConstraintTable, FormValues, HttpEngine, Outcome, Session, SessionView,
};

#[derive(Parser)]
#[command(name = "paintkit-cli")]
#[command(about = "PaintKit CLI - Paint-by-number kit generation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the generation engine
    #[arg(long, global = true, env = API_BASE_URL_ENV)]
    engine_url: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(clap::Args)]
struct InputArgs {
    /// PNG or JPEG image
    #[arg(short, long)]
    file: PathBuf,

    /// Number of paint colors
    #[arg(long, default_value = "10")]
    colors: String,

    /// Resize width cap in pixels
    #[arg(long, default_value = "2550")]
    max_width: String,

    /// Minimum region size in pixels
    #[arg(long, default_value = "300")]
    min_region: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the accepted input ranges
    Constraints,

    /// Check inputs locally without contacting the engine
    Validate {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Generate a kit and optionally download its assets
    Generate {
        #[command(flatten)]
        input: InputArgs,

        /// Directory to write the outline, preview, legend and manifest into
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!(r#"{{"error": "Failed to serialize output: {}"}}"#, e),
    }
}

fn load_candidate(path: &Path) -> Result<CandidateFile, ExitCode> {
    CandidateFile::from_path(path).map_err(|e| {
        print_json(&serde_json::json!({
            "error": format!("Failed to read {}: {}", path.display(), e),
        }));
        ExitCode::FAILURE
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = match AppConfig::load(cli.config.as_deref()).and_then(|c| c.with_base_url(cli.engine_url.clone())) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(r#"{{"error": "{}"}}"#, e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Constraints => {
            print_json(&serde_json::json!(ConstraintTable::standard()));
            ExitCode::SUCCESS
        }

        Commands::Validate { input } => {
            let candidate = match load_candidate(&input.file) {
                Ok(c) => c,
                Err(code) => return code,
            };
            let table = ConstraintTable::standard();
            let values = FormValues::parse(&input.colors, &input.max_width, &input.min_region);
            let issue = validate_file(Some(&candidate), &table).or_else(|| validate_form(&values, &table));

            print_json(&serde_json::json!({
                "valid": issue.is_none(),
                "issue": issue,
            }));
            if issue.is_none() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }

        Commands::Generate { input, out } => {
            let candidate = match load_candidate(&input.file) {
                Ok(c) => c,
                Err(code) => return code,
            };
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!(r#"{{"error": "Failed to start runtime: {}"}}"#, e);
                    return ExitCode::FAILURE;
                }
            };
            runtime.block_on(generate(config, candidate, &input, out.as_deref()))
        }
    }
}

async fn generate(config: AppConfig, candidate: CandidateFile, input: &InputArgs, out: Option<&Path>) -> ExitCode {
    let engine = match HttpEngine::new(&config.engine) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            print_json(&serde_json::json!({ "error": e.to_string() }));
            return ExitCode::FAILURE;
        }
    };
    let mut session = Session::new(engine, config.session.clone());

    if let Err(issue) = session.select_file(Some(candidate)) {
        print_json(&serde_json::json!({ "success": false, "issue": issue }));
        return ExitCode::from(2);
    }
    session.set_form(FormValues::parse(&input.colors, &input.max_width, &input.min_region));

    if let Err(issue) = session.submit() {
        print_json(&serde_json::json!({ "success": false, "issue": issue }));
        return ExitCode::from(2);
    }
    session.settle().await;

    let view = SessionView::project(&session);
    let succeeded = session.last_outcome() == Some(Outcome::Succeeded);

    let manifest = match (out, session.result()) {
        (Some(dir), Some(result)) => match export_result(result, session.resources(), dir) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                print_json(&serde_json::json!({ "success": false, "error": e.to_string() }));
                return ExitCode::FAILURE;
            }
        },
        _ => None,
    };

    print_json(&serde_json::json!({
        "success": succeeded,
        "session": view,
        "export": manifest,
    }));
    session.shutdown();

    if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}
