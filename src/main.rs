//! rust_pade command-line interface

use clap::Parser;
use log::{info, LevelFilter};

use rust_pade::cli::{Cli, Commands, RunArgs};
use rust_pade::io::read_sample_indexes;
use rust_pade::prelude::*;
use rust_pade::run_engine;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    if std::env::args().len() == 1 {
        print_no_args();
        return;
    }

    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Some(Commands::Run(args)) => run_analysis(&args),
        None => {
            print_no_args();
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_no_args() {
    println!("rust_pade v{}", VERSION);
    println!("Run `rust_pade -h` for usage or `rust_pade run --help` for detailed information.");
}

fn run_analysis(args: &RunArgs) -> Result<()> {
    // Configure thread pool
    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .ok();
    }

    let settings = args.settings()?;
    settings.validate()?;

    info!("Loading measurement table from: {}", args.input);
    let table = read_measurement_table(&args.input)?;

    info!("Loading schema from: {}", args.schema);
    let schema = read_schema(&args.schema)?;
    info!(
        "  {} samples, factors: {}",
        schema.n_samples(),
        schema.factor_names().join(", ")
    );

    let sample_indexes = match &args.sample_indexes {
        Some(path) => {
            info!("Loading sample indexes from: {}", path);
            Some(read_sample_indexes(path)?)
        }
        None => None,
    };

    info!(
        "{} tuning parameters, {} replicates, {} bins, seed {}",
        settings.tuning_params.len(),
        settings.num_samples,
        settings.num_bins,
        settings.seed
    );
    let output = run_engine(&table, &schema, &settings, sample_indexes)?;
    let results = output.results;

    println!();
    print!("{}", results.summary());

    write_results(&args.output, &results)?;
    info!("Results written to: {}", args.output);

    if let Some(path) = &args.json {
        write_results_json(path, &results)?;
        info!("JSON results written to: {}", path);
    }

    Ok(())
}
