#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # gradewise
//!
//! Command line front end: grade a file against a rubric, or check that a
//! rubric file is valid before using it.
//!
//! Credentials are read from the environment (or a `.env` file):
//! `AZURE_OPENAI_*` is required; `AZURE_VISION_*`, `AZURE_DOCUMENT_*`,
//! `AZURE_LANGUAGE_*` and `SUPABASE_*` enable the optional capabilities.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bpaf::*;
use dotenvy::dotenv;
use gradewise::{
    GraderConfig, GradingPipeline, PipelineOutcome, Submission,
    extraction::ContentDescriptor,
    request::DEFAULT_RUBRIC_TYPE,
    rubric::{AssignmentRequirements, GradingCriterion, Rubric},
};
use serde::de::DeserializeOwned;
use tabled::{
    Table,
    settings::{Panel, Style},
};
use tokio_util::sync::CancellationToken;
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Arguments of the `grade` command.
#[derive(Debug, Clone)]
struct GradeArgs {
    /// Subject of the work
    subject:      Option<String>,
    /// Academic level
    level:        Option<String>,
    /// Rubric file
    rubric:       Option<PathBuf>,
    /// Assignment requirements file
    requirements: Option<PathBuf>,
    /// Default rubric to fall back on
    rubric_type:  String,
    /// User to store the result for
    owner:        Option<String>,
    /// Print JSON instead of a table
    json:         bool,
    /// File to grade
    file:         PathBuf,
}

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade a file
    Grade(GradeArgs),
    /// Validate a rubric file
    CheckRubric(PathBuf),
}

/// Parsed command line.
#[derive(Debug, Clone)]
struct Cli {
    /// Show debug logs
    verbose: bool,
    /// What to do
    cmd:     Cmd,
}

/// Parse the command line arguments
fn options() -> Cli {
    let verbose = short('v').long("verbose").help("Show debug logs").switch();

    let subject = long("subject")
        .help("Subject the work belongs to")
        .argument::<String>("SUBJECT")
        .optional();
    let level = long("level")
        .help("Academic level to grade at")
        .argument::<String>("LEVEL")
        .optional();
    let rubric = long("rubric")
        .help("JSON file with a list of grading criteria")
        .argument::<PathBuf>("JSON")
        .optional();
    let requirements = long("requirements")
        .help("JSON file with assignment requirements")
        .argument::<PathBuf>("JSON")
        .optional();
    let rubric_type = long("rubric-type")
        .help("Default rubric used when --rubric is not given")
        .argument::<String>("TYPE")
        .fallback(DEFAULT_RUBRIC_TYPE.to_string());
    let owner = long("owner")
        .help("Store the result on behalf of this user")
        .argument::<String>("USER")
        .optional();
    let json = long("json").help("Print the result as JSON").switch();
    let file = positional::<PathBuf>("FILE").help("Text, image, PDF or Word file to grade");

    let grade = construct!(GradeArgs {
        subject,
        level,
        rubric,
        requirements,
        rubric_type,
        owner,
        json,
        file
    })
    .to_options()
    .command("grade")
    .help("Grade a submission against a rubric")
    .map(Cmd::Grade);

    let check_rubric = positional::<PathBuf>("JSON")
        .help("Rubric file to validate")
        .to_options()
        .command("check-rubric")
        .help("Validate a rubric and print it")
        .map(Cmd::CheckRubric);

    let cmd = construct!([grade, check_rubric]);

    construct!(Cli { verbose, cmd })
        .to_options()
        .descr("Rubric-driven grading of academic writing")
        .run()
}

/// Reads and deserializes a JSON file.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Could not read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Grades one file and prints the result.
async fn grade(args: GradeArgs) -> Result<()> {
    let pipeline = GradingPipeline::from_config(GraderConfig::from_env()?)?;

    let content = ContentDescriptor::from_path(&args.file).await?;
    let criteria: Vec<GradingCriterion> = match &args.rubric {
        Some(path) => read_json(path).await?,
        None => Vec::new(),
    };
    let requirements: Option<AssignmentRequirements> = match &args.requirements {
        Some(path) => Some(read_json(path).await?),
        None => None,
    };

    let submission = Submission {
        content,
        subject: args.subject,
        level: args.level,
        criteria,
        requirements,
        rubric_type: args.rubric_type,
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match pipeline.run(submission, args.owner.as_deref(), &cancel).await {
        PipelineOutcome::Finished(run) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&run.document_response())?);
            } else {
                println!("{}", run.result.render());
            }

            if !run.unmatched_criteria.is_empty() {
                eprintln!("Not scored by the grader: {}", run.unmatched_criteria.join(", "));
            }
            if let Some(id) = run.persisted_id {
                eprintln!("Stored as {id}");
            }
            if let Some(err) = run.persistence_error {
                eprintln!("{err}");
            }
        }
        PipelineOutcome::Cancelled { stage } => eprintln!("Cancelled while {stage}"),
    }

    Ok(())
}

/// Validates a rubric file and prints it as a table.
async fn check_rubric(path: &Path) -> Result<()> {
    let criteria: Vec<GradingCriterion> = read_json(path).await?;
    let rubric = Rubric::new(criteria).with_context(|| format!("{} is not a valid rubric", path.display()))?;

    println!(
        "{}",
        Table::new(rubric.criteria())
            .with(Panel::header(format!("{} criteria", rubric.len())))
            .with(Style::modern())
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let opts = options();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);
    let filter_layer = LevelFilter::from_level(if opts.verbose { Level::DEBUG } else { Level::INFO });
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    match opts.cmd {
        Cmd::Grade(args) => grade(args).await?,
        Cmd::CheckRubric(path) => check_rubric(&path).await?,
    };

    Ok(())
}
