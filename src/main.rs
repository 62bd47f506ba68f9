//!
//! # lumenc
//!
//! The command-line driver: reads one or more source files, merges them
//! into a single `Tree`, runs the lowering pipeline, and reports the
//! resulting header/implementation partition. No text or IL emitter is
//! implemented here; this is as far as the pass driver goes before an
//! emitter would take over.
//!
//! ## Module chain
//!
//! ```text
//! lexing -> parsing -> tree (lowering passes) -> backend_contract
//! ```

use std::env::{args, Args};
use std::fs;
use std::process::exit;
use std::sync::Arc;

use lumenc::backend_contract::LoweredModule;
use lumenc::diagnostics::CompileError;
use lumenc::tree::Tree;

/// Parsed command-line configuration: input file paths, the output module
/// name, the dependency list passed through to the back-end contract, and
/// the verbosity level `-v`/`-vv` select.
struct CliOptions {
    inputs: Vec<String>,
    out_name: String,
    dependencies: Vec<String>,
    verbosity: log::LevelFilter,
}

impl CliOptions {
    fn parse(args: Args) -> Result<Self, String> {
        let mut inputs = Vec::new();
        let mut out_name = None;
        let mut dependencies = Vec::new();
        let mut verbosity = log::LevelFilter::Warn;

        let mut rest = args.skip(1);
        while let Some(arg) = rest.next() {
            match arg.as_str() {
                "--out-name" => {
                    out_name = Some(rest.next().ok_or("--out-name requires a value")?);
                }
                "--dep" => {
                    dependencies.push(rest.next().ok_or("--dep requires a value")?);
                }
                "-v" => verbosity = log::LevelFilter::Debug,
                "-vv" => verbosity = log::LevelFilter::Trace,
                other => inputs.push(other.to_string()),
            }
        }

        if inputs.is_empty() {
            return Err("no input source files given".to_string());
        }
        let out_name = out_name.unwrap_or_else(|| "main".to_string());

        Ok(CliOptions { inputs, out_name, dependencies, verbosity })
    }
}

fn install_logger(verbosity: log::LevelFilter) {
    env_logger::Builder::from_default_env()
        .filter_level(verbosity)
        .format_timestamp(None)
        .init();
}

fn run(options: CliOptions) -> Result<LoweredModule, CompileError> {
    let mut tree = Tree::new();
    let mut top_level = Vec::new();

    for path in &options.inputs {
        let source = fs::read_to_string(path).map_err(|error| {
            CompileError::internal(
                lumenc::diagnostics::SourceLocation::generated(),
                "io",
                format!("could not read `{}`: {}", path, error),
            )
        })?;
        let file: Arc<str> = Arc::from(path.as_str());
        top_level.extend(tree.merge_source(&source, file)?);
    }

    tree.lower(&top_level)?;

    let top_level = tree.top_level_with_generated(&top_level);
    Ok(LoweredModule::partition(options.out_name, options.dependencies, &tree.definitions, &top_level))
}

fn main() {
    let options = match CliOptions::parse(args()) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("lumenc: {}", message);
            exit(2);
        }
    };

    install_logger(options.verbosity);

    match run(options) {
        Ok(module) => {
            println!(
                "lowered module `{}`: {} header definitions, {} implementation definitions",
                module.name,
                module.header.len(),
                module.implementation.len()
            );
        }
        Err(error) => {
            eprintln!("{}", error);
            exit(1);
        }
    }
}
