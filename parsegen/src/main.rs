//! Command-line entry point for parsegen.
//!
//! `parsegen run --target <id>` generates `custom_parsers/<id>_parser.<ext>`
//! from `data/<id>/<id>_sample.pdf`, iterating until its output matches
//! `data/<id>/<id>_sample.csv` or the attempt budget is spent.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use parsegen::controller::{AttemptReport, Controller};
use parsegen::exit_codes;
use parsegen::harness::ParserHarness;
use parsegen::io::attempt_log::{AttemptLog, AttemptRecord, claim_run_dir, new_run_id};
use parsegen::io::config::{
    AgentConfig, CONFIG_FILE_NAME, GeneratorBackend, load_config, write_config,
};
use parsegen::io::document::DocumentExtractor;
use parsegen::io::gemini::GeminiGenerator;
use parsegen::io::generator::build_generator;
use parsegen::io::loader::ProcessLoader;
use parsegen::io::paths::WorkspacePaths;
use parsegen::io::prompt::PromptBuilder;
use parsegen::logging;
use parsegen::prepare::ContextPreparer;

#[derive(Parser)]
#[command(
    name = "parsegen",
    version,
    about = "Generate and verify bank-statement parsers with an LLM in the loop"
)]
struct Cli {
    /// Workspace root holding `data/` and `custom_parsers/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Config file (defaults to `<root>/parsegen.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `parsegen.toml` and create the workspace directories.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Plan, generate and test a parser until it matches the reference.
    Run {
        /// Target bank identifier (e.g. `icici`).
        #[arg(short, long)]
        target: String,
        /// Override `max_attempts` from the config.
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Test the existing parser for a target without generating anything.
    Check {
        #[arg(short, long)]
        target: String,
    },
    /// List Gemini models that support content generation.
    Models,
}

fn main() {
    logging::init();
    let code = match dispatch(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            exit_codes::ERROR
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> Result<i32> {
    let root = fs::canonicalize(&cli.root)
        .with_context(|| format!("resolve workspace root {}", cli.root.display()))?;
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| root.join(CONFIG_FILE_NAME));

    match cli.command {
        Command::Init { force } => cmd_init(&root, &config_path, force),
        Command::Run {
            target,
            max_attempts,
        } => cmd_run(&root, &load_config(&config_path)?, &target, max_attempts),
        Command::Check { target } => cmd_check(&root, &load_config(&config_path)?, &target),
        Command::Models => cmd_models(&load_config(&config_path)?),
    }
}

fn cmd_init(root: &Path, config_path: &Path, force: bool) -> Result<i32> {
    let cfg = if force || !config_path.exists() {
        let cfg = AgentConfig::default();
        write_config(config_path, &cfg)?;
        println!("wrote {}", config_path.display());
        cfg
    } else {
        println!("kept existing {}", config_path.display());
        load_config(config_path)?
    };

    let paths = WorkspacePaths::new(root, &cfg);
    for dir in [&paths.data_dir, &paths.parsers_dir] {
        fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    }
    println!(
        "put statements in {}/<target>/<target>_sample.pdf with a matching _sample.csv",
        paths.display(&paths.data_dir)
    );
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path, cfg: &AgentConfig, target: &str, max_attempts: Option<u32>) -> Result<i32> {
    let paths = WorkspacePaths::new(root, cfg);
    let run = paths.run_context(target)?;
    let budget = max_attempts.unwrap_or(cfg.max_attempts);

    let controller = Controller::new(
        ContextPreparer::new(DocumentExtractor::from_config(cfg, root)),
        build_generator(cfg, root)?,
        ParserHarness::new(ProcessLoader::from_config(cfg, root)),
        PromptBuilder::from_config(cfg),
        cfg.runtime.comment_prefix.as_str(),
    );

    let (run_id, run_dir) = match claim_run_dir(&paths.attempts_dir, &new_run_id(Utc::now())) {
        Ok(claimed) => claimed,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "could not create run log directory");
            let run_id = new_run_id(Utc::now());
            let run_dir = paths.run_log_dir(&run_id);
            (run_id, run_dir)
        }
    };
    let attempt_log = AttemptLog::new(run_dir, cfg.runtime.extension.trim_start_matches('.'));
    info!(%run_id, target, budget, "starting run");
    println!("--- Starting agent for target: {target} ---");

    let outcome = controller.run(run, budget, |report: &AttemptReport<'_>| {
        let record = AttemptRecord {
            run_id: &run_id,
            target,
            attempt: report.attempt,
            attempts_left: report.attempts_left,
            prompt: &report.code.prompt,
            source: &report.code.source,
            diagnostic: report.code.diagnostic.as_deref(),
            verdict: report.verdict,
            started_at: report.started_at,
            ended_at: report.ended_at,
        };
        if let Err(err) = attempt_log.write(&record) {
            warn!(err = %format!("{err:#}"), attempt = report.attempt, "could not write attempt log");
        }
        let result = if report.verdict.is_success() { "passed" } else { "failed" };
        println!(
            "attempt {}: {result} ({} left)",
            report.attempt, report.attempts_left
        );
    })?;

    println!("\n--- Agent run finished ---");
    println!("\n--- Final plan ---");
    println!("{}", outcome.plan);
    if outcome.attempts_made > 0 {
        println!("\nattempt logs: {}", paths.display(attempt_log.run_dir()));
    }

    if outcome.succeeded() {
        println!("\nParser generated and tested successfully!");
        println!(
            "Final parser located at: {}",
            paths.display(&outcome.artifact_path)
        );
        Ok(exit_codes::OK)
    } else {
        println!("\nAgent failed to generate a working parser.");
        println!("Final error:");
        println!("{}", outcome.final_error().unwrap_or("No errors logged."));
        Ok(exit_codes::FAILED)
    }
}

fn cmd_check(root: &Path, cfg: &AgentConfig, target: &str) -> Result<i32> {
    let paths = WorkspacePaths::new(root, cfg);
    let run = paths.run_context(target)?;
    let harness = ParserHarness::new(ProcessLoader::from_config(cfg, root));

    let verdict = harness.check(&run);
    match verdict.description() {
        None => {
            println!(
                "{} matches {}",
                paths.display(&run.artifact_path),
                paths.display(&run.reference_path)
            );
            Ok(exit_codes::OK)
        }
        Some(description) => {
            println!("{description}");
            Ok(exit_codes::FAILED)
        }
    }
}

fn cmd_models(cfg: &AgentConfig) -> Result<i32> {
    if cfg.generator.backend != GeneratorBackend::Gemini {
        bail!("`models` requires generator.backend = \"gemini\"");
    }
    let generator = GeminiGenerator::from_config(&cfg.generator)?;
    for name in generator.list_models()? {
        println!("{name}");
    }
    Ok(exit_codes::OK)
}
