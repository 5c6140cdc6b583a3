use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use elicit_core::{
    ConversationController, FallbackBank, GoalCatalog, InterviewSession, Priority, QuestionSource, SessionMeta,
    TemplateQuestionSource, builtin_validators,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

mod config;
mod llm;
mod logging;
mod runner;
mod state;

/// Name recorded in sessions started from the embedded catalog.
const BUILTIN_CATALOG: &str = "project_grant";

#[derive(Parser, Debug)]
#[command(name = "elicit", version, about = "Adaptive interview runner")]
struct Cli {
    /// Debug logging (overrides the configured level, not RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new interview
    Run {
        /// Goal catalog TOML (default: built-in project grant catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Session file (default: ~/.elicit/sessions/<id>.json)
        #[arg(long)]
        session: Option<PathBuf>,

        /// Seconds to wait for each answer before moving on
        #[arg(long)]
        answer_timeout: Option<u64>,
    },

    /// Continue a saved interview
    Resume {
        #[arg(long)]
        session: PathBuf,

        /// Catalog to re-bind validators from (default: the one recorded in the session)
        #[arg(long)]
        catalog: Option<PathBuf>,

        #[arg(long)]
        answer_timeout: Option<u64>,
    },

    /// Show completion of a saved interview
    Progress {
        #[arg(long)]
        session: PathBuf,

        /// Print the progress record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a goal catalog and print its tiers
    CheckCatalog { file: PathBuf },

    /// Write ~/.elicit/config.toml with defaults
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config()?;
    logging::init(&cfg.logging, cli.verbose)?;

    match cli.command {
        Command::Run {
            catalog,
            session,
            answer_timeout,
        } => {
            let (catalog_name, catalog) = load_catalog(catalog.as_deref())?;
            let registry = catalog
                .to_registry(builtin_validators())
                .context("build goal registry")?;
            let meta = SessionMeta::new(catalog_name);
            let session_path = match session {
                Some(p) => p,
                None => state::default_session_path(&meta.id)?,
            };

            let controller = ConversationController::with_settings(
                registry,
                cfg.interview,
                question_source(&cfg)?,
                FallbackBank::builtin(),
            )
            .context("build interview")?;
            info!(session = %meta.id, path = %session_path.display(), "starting interview");
            println!("Session: {}", session_path.display());

            let opts = run_options(&cfg, session_path, answer_timeout, &catalog);
            run_interview(meta, controller, opts).await?;
        }

        Command::Resume {
            session,
            catalog,
            answer_timeout,
        } => {
            let saved = state::load_session(&session)?;
            if saved.context.finalized {
                println!("Interview already finished. Answers: {}", state::answers_path(&session).display());
                return Ok(());
            }
            let catalog_ref = catalog.or_else(|| catalog_path_for(&saved.meta.catalog));
            let (_, catalog) = load_catalog(catalog_ref.as_deref())?;

            let (meta, controller) =
                saved.into_controller(builtin_validators(), question_source(&cfg)?, FallbackBank::builtin());
            info!(session = %meta.id, asked = controller.context().questions_asked, "resuming interview");

            let opts = run_options(&cfg, session, answer_timeout, &catalog);
            run_interview(meta, controller, opts).await?;
        }

        Command::Progress { session, json } => {
            let saved = state::load_session(&session)?;
            print_progress(&saved, json)?;
        }

        Command::CheckCatalog { file } => {
            let (_, catalog) = load_catalog(Some(&file))?;
            check_catalog(&catalog);
        }

        Command::InitConfig => {
            config::init_config()?;
        }
    }

    Ok(())
}

type Controller = ConversationController<Box<dyn QuestionSource + Send>, FallbackBank>;

/// One task per session; stdin/stdout carry the interview.
async fn run_interview(meta: SessionMeta, controller: Controller, opts: runner::RunOptions) -> Result<()> {
    let task = tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut stdout = std::io::stdout();
        runner::drive(meta, controller, stdin, &mut stdout, &opts).await
    });

    match task.await.context("interview task failed")?? {
        runner::Outcome::Finalized { reason, .. } => info!(?reason, "interview complete"),
        runner::Outcome::Suspended => info!("interview suspended"),
    }
    Ok(())
}

fn question_source(cfg: &config::Config) -> Result<Box<dyn QuestionSource + Send>> {
    match llm::LlmConfig::from_section(&cfg.llm)? {
        Some(llm_cfg) => {
            info!(provider = ?llm_cfg.provider, model = %llm_cfg.model, "using model-phrased questions");
            Ok(Box::new(llm::LlmQuestionSource::new(llm_cfg)?))
        }
        None => Ok(Box::new(TemplateQuestionSource::new())),
    }
}

fn run_options(
    cfg: &config::Config,
    session_path: PathBuf,
    answer_timeout: Option<u64>,
    catalog: &GoalCatalog,
) -> runner::RunOptions {
    runner::RunOptions {
        answers_path: state::answers_path(&session_path),
        session_path,
        answer_timeout: answer_timeout
            .or(cfg.runner.answer_timeout_secs)
            .filter(|s| *s > 0)
            .map(Duration::from_secs),
        show_progress: cfg.runner.show_progress,
        mapping: catalog.answer_fields.clone(),
    }
}

/// `None` selects the built-in catalog.
fn load_catalog(path: Option<&Path>) -> Result<(String, GoalCatalog)> {
    match path {
        None => Ok((BUILTIN_CATALOG.to_string(), GoalCatalog::project_grant()?)),
        Some(p) => {
            let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
            let catalog = GoalCatalog::from_toml(&s).with_context(|| format!("load catalog {}", p.display()))?;
            Ok((p.display().to_string(), catalog))
        }
    }
}

fn catalog_path_for(recorded: &str) -> Option<PathBuf> {
    (recorded != BUILTIN_CATALOG).then(|| PathBuf::from(recorded))
}

fn print_progress(session: &InterviewSession, json: bool) -> Result<()> {
    let p = session.progress();
    if json {
        println!("{}", serde_json::to_string_pretty(&p)?);
        return Ok(());
    }

    println!("Session {} ({})", session.meta.id, session.meta.catalog);
    println!("Updated: {}", session.meta.updated_at.format("%Y-%m-%d %H:%M UTC"));
    println!(
        "Questions asked: {} | state: {:?}{}",
        session.context.questions_asked,
        session.context.current_state,
        if session.context.finalized { " (finished)" } else { "" }
    );
    println!(
        "Goals: {}/{} complete, {} in progress, {} not started ({:.0}%)",
        p.completed_goals,
        p.total_goals,
        p.in_progress_goals,
        p.not_started_goals,
        p.overall_completion * 100.0
    );
    println!(
        "Critical tier complete: {} | important tier complete: {}",
        p.critical_completed, p.important_completed
    );

    for tier in [Priority::P0Critical, Priority::P1Important] {
        let open = session.registry.incomplete_by_priority(tier);
        if !open.is_empty() {
            let names: Vec<&str> = open.iter().map(|g| g.name.as_str()).collect();
            println!("Open {}: {}", tier.label(), names.join(", "));
        }
    }
    Ok(())
}

fn check_catalog(catalog: &GoalCatalog) {
    println!("Catalog OK: {} goals", catalog.goals.len());
    for (tier, ids) in catalog.tier_breakdown() {
        println!("  {} ({}): {}", tier.label(), ids.len(), ids.join(", "));
    }

    let validators = builtin_validators();
    for goal in &catalog.goals {
        if let Some(name) = goal.criteria.validator.as_deref() {
            if !validators.contains(name) {
                println!("  warning: {} uses unknown validator {name:?}; it can never complete on its own", goal.id);
            }
        }
    }
    if !catalog.hardcoded.is_empty() {
        println!("  {} hardcoded answer(s)", catalog.hardcoded.len());
    }
}
