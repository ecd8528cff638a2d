use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use dataload_core::{DataLoader, LoaderConfig, Statistics};
use dataload_model::{MemoryArchetypeService, Schema};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("dataload")
        .version(dataload_core::VERSION)
        .about("Load archetype data files, resolving references between objects")
        .arg(
            Arg::new("schema")
                .long("schema")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("YAML file declaring the archetypes"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("TOML loader configuration"),
        )
        .arg(
            Arg::new("file")
                .long("file")
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf))
                .help("Data file to load; may be repeated"),
        )
        .arg(
            Arg::new("dir")
                .long("dir")
                .value_parser(value_parser!(PathBuf))
                .help("Directory of data files to load"),
        )
        .arg(
            Arg::new("subdir")
                .long("subdir")
                .action(ArgAction::SetTrue)
                .help("Also load files in subdirectories of --dir"),
        )
        .arg(
            Arg::new("batch-size")
                .long("batch-size")
                .value_parser(value_parser!(usize))
                .help("Roots to collect before saving"),
        )
        .arg(
            Arg::new("validate-only")
                .long("validate-only")
                .action(ArgAction::SetTrue)
                .help("Validate objects without saving them"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Log every element and created object"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print statistics as JSON"),
        )
}

/// Config file values, overridden by flags
fn config(args: &ArgMatches) -> Result<LoaderConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => LoaderConfig::from_file(path)?,
        None => LoaderConfig::new(),
    };
    if let Some(batch_size) = args.get_one::<usize>("batch-size") {
        config.batch_size = *batch_size;
    }
    if args.get_flag("validate-only") {
        config.validate_only = true;
    }
    if args.get_flag("verbose") {
        config.verbose = true;
    }
    if args.get_flag("subdir") {
        config.recurse = true;
    }
    Ok(config)
}

fn report(statistics: &Statistics, json: bool) -> Result<()> {
    let total: u64 = statistics.values().sum();
    if json {
        let report = serde_json::json!({
            "statistics": statistics,
            "total": total,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{:>42} {:6}", "Archetype", "Count");
        for (archetype, count) in statistics {
            println!("{archetype:>42} {count:6}");
        }
        println!("{:>42} {total:6}", "Total");
    }
    Ok(())
}

fn run(args: &ArgMatches) -> Result<()> {
    let config = config(args)?;

    let level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let files: Vec<&PathBuf> = args.get_many::<PathBuf>("file").into_iter().flatten().collect();
    let dir = args.get_one::<PathBuf>("dir");
    if files.is_empty() && dir.is_none() {
        bail!("nothing to load: pass --file or --dir");
    }

    let schema_path = args
        .get_one::<PathBuf>("schema")
        .context("--schema is required")?;
    let schema = Schema::from_file(schema_path)?;
    let service = MemoryArchetypeService::from_schema(&schema);
    tracing::info!("Loaded {} archetypes from {}", schema.archetypes().len(), schema_path.display());

    let mut loader = DataLoader::new(service, config);
    for file in files {
        loader
            .load_file(file)
            .with_context(|| format!("failed to load {}", file.display()))?;
    }
    if let Some(dir) = dir {
        let loaded = loader
            .load_dir(dir)
            .with_context(|| format!("failed to load {}", dir.display()))?;
        tracing::info!("Loaded {} files from {}", loaded, dir.display());
    }
    let finished = loader.finish();
    report(loader.statistics(), args.get_flag("json"))?;
    finished.context("load incomplete")?;
    Ok(())
}

fn main() {
    let matches = cli().get_matches();
    if let Err(err) = run(&matches) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
