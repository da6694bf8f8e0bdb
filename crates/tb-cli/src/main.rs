//! TrackerBlock CLI
//!
//! CLI tool for compiling tracker corpora and checking the detector.

mod validate;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Instant;

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use env_logger::Env;

use tb_compiler::output::{read_dataset, read_rules, write_dataset, write_rules};
use tb_compiler::{compile_corpus, CompileOptions, ElementHidingRule};
use tb_core::{Detector, ResourceType, SuffixList};

/// Bad arguments or an unusable input file
const EXIT_USAGE: i32 = 1;
/// A descriptor directory could not be enumerated
const EXIT_ENUMERATE: i32 = 2;
/// An output file could not be written
const EXIT_WRITE: i32 = 3;

#[derive(Parser)]
#[command(name = "tb-cli")]
#[command(about = "TrackerBlock tracker data compiler and tools")]
struct Cli {
    /// Verbose logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile tracker and entity descriptors into a dataset and a rule list
    Build {
        /// Directory of tracker descriptor files
        trackers: PathBuf,

        /// Directory of entity descriptor files
        entities: PathBuf,

        /// Output dataset file
        dataset_out: PathBuf,

        /// Output compiled rule list
        rules_out: PathBuf,

        /// Site whose pages are never blocked (repeatable)
        #[arg(long = "trusted-site", value_name = "DOMAIN")]
        trusted_sites: Vec<String>,

        /// Hide elements on a site (repeatable)
        #[arg(long = "hide", value_name = "DOMAIN=SELECTOR")]
        hide: Vec<ElementHidingRule>,
    },

    /// Classify one request against a dataset
    Classify {
        #[command(flatten)]
        engine: EngineArgs,

        /// URL of the requested resource
        resource_url: String,

        /// URL of the page making the request
        page_url: String,

        /// Resource type (script, image, stylesheet, ...)
        #[arg(short = 't', long = "type")]
        resource_type: Option<String>,
    },

    /// Replay a CSV of expected classifications against a dataset
    Validate {
        #[command(flatten)]
        engine: EngineArgs,

        /// CSV with resource_url,page_url,resource_type,expected_action
        #[arg(short, long)]
        input: PathBuf,

        /// Compiled rule list to cross-check against the detector
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Write rows that did not pass to this CSV file
        #[arg(long)]
        mismatches: Option<PathBuf>,
    },
}

/// Options shared by commands that run the detector.
#[derive(Args)]
struct EngineArgs {
    /// Dataset file written by `build`
    #[arg(short, long)]
    dataset: PathBuf,

    /// Public suffix list file (defaults to a built-in heuristic)
    #[arg(long)]
    psl: Option<PathBuf>,

    /// Site whose pages are never blocked (repeatable)
    #[arg(long = "trusted-site", value_name = "DOMAIN")]
    trusted_sites: Vec<String>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            e.print().ok();
            process::exit(EXIT_USAGE);
        }
    };

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    let code = match cli.command {
        Commands::Build {
            trackers,
            entities,
            dataset_out,
            rules_out,
            trusted_sites,
            hide,
        } => {
            let options = CompileOptions {
                trusted_sites,
                element_hiding: hide,
            };
            cmd_build(&trackers, &entities, &dataset_out, &rules_out, &options)
        }
        Commands::Classify {
            engine,
            resource_url,
            page_url,
            resource_type,
        } => report(cmd_classify(&engine, &resource_url, &page_url, resource_type.as_deref())),
        Commands::Validate {
            engine,
            input,
            rules,
            mismatches,
        } => report(cmd_validate(&engine, &input, rules.as_deref(), mismatches.as_deref())),
    };

    process::exit(code);
}

fn report(result: Result<(), String>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e}");
            EXIT_USAGE
        }
    }
}

fn cmd_build(trackers: &Path, entities: &Path, dataset_out: &Path, rules_out: &Path, options: &CompileOptions) -> i32 {
    let start = Instant::now();

    let compilation = match compile_corpus(trackers, entities, options) {
        Ok(compilation) => compilation,
        Err(e) => {
            eprintln!("Error: {e}");
            return EXIT_ENUMERATE;
        }
    };
    let compile_time = start.elapsed();

    // Both outputs are attempted even if the first one fails
    let mut code = 0;
    if let Err(e) = write_dataset(dataset_out, &compilation.data) {
        eprintln!("Error: {e}");
        code = EXIT_WRITE;
    }
    if let Err(e) = write_rules(rules_out, &compilation.rules) {
        eprintln!("Error: {e}");
        code = EXIT_WRITE;
    }

    let total_time = start.elapsed();
    let dataset_size = fs::metadata(dataset_out).map(|m| m.len()).unwrap_or(0);

    println!("Compiled '{}' and '{}'", trackers.display(), entities.display());
    println!(
        "  Trackers: {} loaded, {} failed",
        compilation.tracker_report.loaded,
        compilation.tracker_report.failed()
    );
    println!(
        "  Entities: {} loaded, {} failed, {} kept",
        compilation.entity_report.loaded,
        compilation.entity_report.failed(),
        compilation.data.entity_count()
    );
    println!(
        "  Rules:    {} -> {} (dedupe removed {})",
        compilation.optimize.before, compilation.optimize.after, compilation.optimize.deduped
    );
    println!("  Dataset:  {} bytes ({:.1} KB)", dataset_size, dataset_size as f64 / 1024.0);
    println!(
        "  Time:     {:.1}ms (compile: {:.1}ms)",
        total_time.as_secs_f64() * 1000.0,
        compile_time.as_secs_f64() * 1000.0,
    );

    code
}

fn load_detector(engine: &EngineArgs) -> Result<Detector, String> {
    let data = read_dataset(&engine.dataset).map_err(|e| e.to_string())?;

    let suffixes = match engine.psl {
        Some(ref path) => {
            let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
            SuffixList::from_psl_text(&text).map_err(|e| e.to_string())?
        }
        None => SuffixList::heuristic(),
    };

    let mut detector = Detector::new(Arc::new(data)).with_suffix_list(suffixes);
    for site in &engine.trusted_sites {
        detector.add_trusted_site(site);
    }
    Ok(detector)
}

fn cmd_classify(engine: &EngineArgs, resource_url: &str, page_url: &str, resource_type: Option<&str>) -> Result<(), String> {
    let detector = load_detector(engine)?;
    let resource_type = resource_type.and_then(ResourceType::from_descriptor_name);

    let classification = detector.classify(resource_url, page_url, resource_type);
    let json = serde_json::to_string_pretty(&classification).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn cmd_validate(engine: &EngineArgs, input: &Path, rules: Option<&Path>, mismatches: Option<&Path>) -> Result<(), String> {
    let detector = load_detector(engine)?;
    let rules = match rules {
        Some(path) => Some(read_rules(path).map_err(|e| e.to_string())?),
        None => None,
    };

    let start = Instant::now();
    let counts = validate::run(&detector, input, rules.as_deref(), mismatches)?;
    let elapsed = start.elapsed();

    println!("Validated '{}' against '{}'", input.display(), engine.dataset.display());
    println!("{counts}");
    println!("Time: {:.1}ms", elapsed.as_secs_f64() * 1000.0);
    Ok(())
}
