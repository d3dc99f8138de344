//! bpmn-run - execute one process instance from the command line.
//!
//! Loads a JSON process definition, creates an instance with the given
//! variables, runs it and prints the instance snapshot as JSON. With
//! `--auto-complete` every service task is completed by a built-in handler,
//! otherwise tasks park and the instance stays ACTIVE.

use std::path::PathBuf;

use bpmn_engine::{BpmnEngine, Config, VariableScope};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "bpmn-run", version, about = "Run a BPMN process definition")]
struct Args {
    /// Path to the JSON process definition.
    definition: PathBuf,

    /// Initial variables as a JSON object.
    #[arg(short, long, default_value = "{}")]
    variables: String,

    /// Complete every service task, recording the element id as `<id>_done`.
    #[arg(long)]
    auto_complete: bool,

    /// Engine configuration file (JSON).
    #[arg(short, long, env = "BPMN_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .apply_env_overrides()?;

    // Initialize observability
    bpmn_engine::observability::init_tracing(&config.observability);

    let engine = BpmnEngine::from_config(&config.engine);
    let json = std::fs::read_to_string(&args.definition)?;
    let process = engine.load_process_from_json(&json)?;

    if args.auto_complete {
        for element in process.definition.elements.iter() {
            if element.task_definition().is_none() {
                continue;
            }
            let marker = format!("{}_done", element.id);
            engine.new_task_handler().id(element.id.clone()).handler(move |job| {
                job.set_variable(marker.clone(), true);
                if let Err(err) = job.complete() {
                    tracing::warn!("auto_complete_rejected: element={}, error={}", job.element_id(), err);
                }
            });
        }
    }

    let variables: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&args.variables)?;
    let created = engine.create_instance(process.process_key, VariableScope::from(variables))?;

    tracing::info!(
        "bpmn_run_started: process={}, version={}, instance_key={}",
        process.bpmn_process_id,
        process.version,
        created.instance_key
    );

    let outcome = engine.run_or_continue_instance(created.instance_key);
    let snapshot = engine
        .find_process_instance(created.instance_key)
        .ok_or_else(|| format!("instance {} disappeared", created.instance_key))?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    outcome?;
    Ok(())
}
