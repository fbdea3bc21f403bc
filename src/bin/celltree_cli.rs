use anyhow::{Context, Result as AnyResult};
use celltree::{
    about, build_lineage, check_invariants, logging, strip_tree_columns, summarize_trees,
    engine::{Engine, LineageEngine, Operation, ProjectState, Workflow},
    AnnotationTable, BuildSettings,
};
use serde::Serialize;
use std::{env, fs};

const DEFAULT_STATE_PATH: &str = ".celltree_state.json";

#[derive(Serialize)]
struct StateSummary {
    row_count: usize,
    columns: Vec<String>,
    has_tree: bool,
    parameters: BuildSettings,
    last_report: Option<celltree::protocol::BuildReport>,
}

struct GlobalArgs {
    state_path: String,
    config_path: Option<String>,
    verbosity: u8,
    cmd_idx: usize,
}

fn usage() {
    eprintln!(
        "Usage:\n  \
  celltree_cli --version\n  \
  celltree_cli [GLOBAL] build INPUT.csv OUTPUT.csv\n  \
  celltree_cli [GLOBAL] validate TABLE.csv\n  \
  celltree_cli [GLOBAL] summary TABLE.csv\n  \
  celltree_cli [GLOBAL] strip INPUT.csv OUTPUT.csv\n  \
  celltree_cli [GLOBAL] capabilities\n  \
  celltree_cli [GLOBAL] op '<operation-json>'\n  \
  celltree_cli [GLOBAL] workflow '<workflow-json>'\n  \
  celltree_cli [GLOBAL] state-summary\n\n  \
  GLOBAL: [--state PATH] [--config SETTINGS.json] [-v|-vv|-vvv]\n  \
  Tip: pass @file.json instead of inline JSON; CELLTREE_LOG sets the log filter"
    );
}

fn load_json_arg(value: &str) -> AnyResult<String> {
    if let Some(path) = value.strip_prefix('@') {
        fs::read_to_string(path).with_context(|| format!("Could not read JSON file '{path}'"))
    } else {
        Ok(value.to_string())
    }
}

fn load_table(path: &str) -> AnyResult<AnnotationTable> {
    AnnotationTable::load_csv_path(path).with_context(|| format!("Could not load table '{path}'"))
}

fn save_table(table: &AnnotationTable, path: &str) -> AnyResult<()> {
    table
        .save_csv_path(path)
        .with_context(|| format!("Could not write table '{path}'"))
}

fn load_state(path: &str) -> Result<ProjectState, String> {
    if std::path::Path::new(path).exists() {
        ProjectState::load_from_path(path).map_err(|e| e.to_string())
    } else {
        Ok(ProjectState::default())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Could not serialize JSON output: {e}"))?;
    println!("{text}");
    Ok(())
}

fn parse_global_args(args: &[String]) -> Result<GlobalArgs, String> {
    let mut ret = GlobalArgs {
        state_path: DEFAULT_STATE_PATH.to_string(),
        config_path: None,
        verbosity: 0,
        cmd_idx: 1,
    };
    while let Some(arg) = args.get(ret.cmd_idx) {
        match arg.as_str() {
            "--state" | "--config" => {
                let value = args
                    .get(ret.cmd_idx + 1)
                    .ok_or_else(|| format!("Missing path for {arg}"))?
                    .clone();
                if arg == "--state" {
                    ret.state_path = value;
                } else {
                    ret.config_path = Some(value);
                }
                ret.cmd_idx += 2;
            }
            "-v" | "-vv" | "-vvv" => {
                ret.verbosity = ret.verbosity.saturating_add((arg.len() - 1) as u8);
                ret.cmd_idx += 1;
            }
            _ => break,
        }
    }
    Ok(ret)
}

/// Settings from `--config`, or else from the state file. The state file is
/// not read when a config is given.
fn settings_for(global: &GlobalArgs) -> Result<BuildSettings, String> {
    match &global.config_path {
        Some(path) => BuildSettings::load_from_path(path),
        None => Ok(load_state(&global.state_path)?.parameters),
    }
}

fn apply_config(global: &GlobalArgs, state: &mut ProjectState) -> Result<(), String> {
    if let Some(path) = &global.config_path {
        state.parameters = BuildSettings::load_from_path(path)?;
    }
    Ok(())
}

fn path_args<'a>(args: &'a [String], cmd_idx: usize, count: usize) -> Result<&'a [String], String> {
    let command = &args[cmd_idx];
    let rest = &args[cmd_idx + 1..];
    if rest.len() < count {
        usage();
        return Err(format!("{command} requires {count} path argument(s)"));
    }
    Ok(&rest[..count])
}

fn summarize_state(engine: &LineageEngine) -> StateSummary {
    let state = engine.snapshot();
    StateSummary {
        row_count: state.table.len(),
        columns: state.table.columns().to_vec(),
        has_tree: state.table.has_column(celltree::protocol::columns::CELL_ID_TREE),
        parameters: state.parameters.clone(),
        last_report: state.last_report.clone(),
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        return Err("Missing command".to_string());
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", about::version_cli_text());
        return Ok(());
    }

    let global = parse_global_args(&args)?;
    logging::init(global.verbosity);
    let cmd_idx = global.cmd_idx;
    if args.len() <= cmd_idx {
        usage();
        return Err("Missing command".to_string());
    }

    let command = &args[cmd_idx];

    match command.as_str() {
        "capabilities" => print_json(&LineageEngine::capabilities()),
        "build" => {
            let paths = path_args(&args, cmd_idx, 2)?;
            let settings = settings_for(&global)?;
            let mut table = load_table(&paths[0]).map_err(|e| format!("{e:#}"))?;
            let report = build_lineage(&mut table, &settings, &mut |p| {
                tracing::debug!(
                    "{}/{} branches built",
                    p.completed_branches,
                    p.total_branches
                );
            })
            .map_err(|e| e.to_string())?;
            save_table(&table, &paths[1]).map_err(|e| format!("{e:#}"))?;
            print_json(&report)
        }
        "validate" => {
            let paths = path_args(&args, cmd_idx, 1)?;
            let table = load_table(&paths[0]).map_err(|e| format!("{e:#}"))?;
            let violations = check_invariants(&table).map_err(|e| e.to_string())?;
            print_json(&violations)?;
            if violations.is_empty() {
                Ok(())
            } else {
                Err(format!("{} invariant violation(s)", violations.len()))
            }
        }
        "summary" => {
            let paths = path_args(&args, cmd_idx, 1)?;
            let table = load_table(&paths[0]).map_err(|e| format!("{e:#}"))?;
            print_json(&summarize_trees(&table).map_err(|e| e.to_string())?)
        }
        "strip" => {
            let paths = path_args(&args, cmd_idx, 2)?;
            let mut table = load_table(&paths[0]).map_err(|e| format!("{e:#}"))?;
            let removed = strip_tree_columns(&mut table);
            save_table(&table, &paths[1]).map_err(|e| format!("{e:#}"))?;
            println!("Removed {removed} tree columns, wrote '{}'", paths[1]);
            Ok(())
        }
        "state-summary" => {
            let state = load_state(&global.state_path)?;
            let engine = LineageEngine::from_state(state);
            print_json(&summarize_state(&engine))
        }
        "op" => {
            if args.len() <= cmd_idx + 1 {
                usage();
                return Err("Missing operation JSON".to_string());
            }
            let json = load_json_arg(&args[cmd_idx + 1]).map_err(|e| format!("{e:#}"))?;
            let op: Operation =
                serde_json::from_str(&json).map_err(|e| format!("Invalid operation JSON: {e}"))?;

            let mut state = load_state(&global.state_path)?;
            apply_config(&global, &mut state)?;
            let mut engine = LineageEngine::from_state(state);
            let result = engine.apply(op).map_err(|e| e.to_string())?;
            engine
                .state()
                .save_to_path(&global.state_path)
                .map_err(|e| e.to_string())?;
            print_json(&result)
        }
        "workflow" => {
            if args.len() <= cmd_idx + 1 {
                usage();
                return Err("Missing workflow JSON".to_string());
            }
            let json = load_json_arg(&args[cmd_idx + 1]).map_err(|e| format!("{e:#}"))?;
            let workflow: Workflow =
                serde_json::from_str(&json).map_err(|e| format!("Invalid workflow JSON: {e}"))?;

            let mut state = load_state(&global.state_path)?;
            apply_config(&global, &mut state)?;
            let mut engine = LineageEngine::from_state(state);
            let results = engine.apply_workflow(workflow).map_err(|e| e.to_string())?;
            engine
                .state()
                .save_to_path(&global.state_path)
                .map_err(|e| e.to_string())?;
            print_json(&results)
        }
        _ => {
            usage();
            Err(format!("Unknown command '{command}'"))
        }
    }
}
