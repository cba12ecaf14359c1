//! textflow - run text analytics plans from the command line

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use textflow::data::Tuple;
use textflow::index::{Index, IndexCatalog, MemoryIndex};
use textflow::plan::{self, ExecutionContext, LogicalPlan, PlanBuilder};

/// textflow - a pull-based text analytics engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a JSON plan
    Run {
        /// Plan description
        #[arg(short, long)]
        plan: PathBuf,

        /// Index to register, as NAME=PATH (JSON documents or a snapshot)
        #[arg(short, long = "index", value_parser = parse_index)]
        indexes: Vec<(String, PathBuf)>,

        /// Where results kept by the sink are written (default stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the options of one operator type, or list the operator types
    Describe {
        operator_type: Option<String>,
    },
}

fn parse_index(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got '{}'", value)),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match args.command {
        Command::Run {
            plan,
            indexes,
            output,
        } => run(&plan, &indexes, output.as_deref()),
        Command::Describe { operator_type } => describe(operator_type.as_deref()),
    }
}

fn run(plan_path: &Path, indexes: &[(String, PathBuf)], output: Option<&Path>) -> Result<()> {
    let catalog = Arc::new(IndexCatalog::new());
    for (name, path) in indexes {
        let index = load_index(name, path)?;
        log::info!("loaded index '{}' with {} rows", name, index.len());
        catalog.register(Arc::new(index));
    }

    let json = std::fs::read_to_string(plan_path)
        .with_context(|| format!("Failed to read plan {}", plan_path.display()))?;
    let description = LogicalPlan::from_json(&json).context("Failed to parse plan")?;

    let context = ExecutionContext::new(catalog);
    let mut plan = PlanBuilder::new(&context)
        .build(&description)
        .context("Failed to build plan")?;

    let summary = plan::evaluate(&mut plan).context("Plan evaluation failed")?;

    let results = plan.take_results();
    if !results.is_empty() {
        match output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                write_results(BufWriter::new(file), &results)?;
            }
            None => write_results(std::io::stdout().lock(), &results)?,
        }
    }
    log::info!("{} tuples in {:?}", summary.tuples, summary.elapsed);
    Ok(())
}

fn load_index(name: &str, path: &Path) -> Result<MemoryIndex> {
    let is_json = path.extension().is_some_and(|e| e == "json");
    if is_json {
        return MemoryIndex::from_json_documents(name, path)
            .with_context(|| format!("Failed to load documents for index '{}'", name));
    }

    let index = MemoryIndex::load(path)
        .with_context(|| format!("Failed to load snapshot for index '{}'", name))?;
    if index.name() != name {
        bail!(
            "snapshot {} holds index '{}', not '{}'",
            path.display(),
            index.name(),
            name
        );
    }
    Ok(index)
}

fn write_results(mut writer: impl Write, results: &[Tuple]) -> Result<()> {
    for tuple in results {
        serde_json::to_writer(&mut writer, &tuple.to_json_object())?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

fn describe(operator_type: Option<&str>) -> Result<()> {
    let Some(operator_type) = operator_type else {
        for name in plan::OPERATOR_TYPES {
            println!("{}", name);
        }
        return Ok(());
    };

    let options = plan::describe(operator_type)?;
    println!("{}", serde_json::to_string_pretty(options)?);
    Ok(())
}
