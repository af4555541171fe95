//! Conflux CLI - Run solver configurations from JSON.

use std::fs;
use std::path::PathBuf;

use conflux::output::{JsonSnapshotWriter, SnapshotWriter};
use conflux::schema::SolverConfig;
use conflux::{run_rank_group, run_standalone};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [output_dir]", args[0]);
        eprintln!();
        eprintln!("Run a solver configuration to its stop time.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to solver configuration file");
        eprintln!("  output_dir   Snapshot directory (default: ./output)");
        eprintln!();
        eprintln!("An example configuration is printed with --example.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let out_dir = PathBuf::from(args.get(2).map(String::as_str).unwrap_or("output"));

    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: SolverConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    println!("Conflux Solver");
    println!("==============");
    println!(
        "Grid: {}x{}x{} over {}x{}x{} ranks",
        config.grid.nx, config.grid.ny, config.grid.nz, config.ranks.0, config.ranks.1, config.ranks.2
    );
    println!(
        "t1 = {}, dtout = {}, cfl = {}",
        config.time.t1, config.time.dtout, config.time.cfl
    );
    println!();

    let report = if config.rank_count() == 1 {
        run_standalone(config, &out_dir)
    } else {
        let dir = out_dir.clone();
        run_rank_group(&config, move |_rank| {
            Ok(Box::new(JsonSnapshotWriter::new(&dir, "snapshot")?) as Box<dyn SnapshotWriter>)
        })
        .map(|reports| reports[0])
    };

    match report {
        Ok(report) => {
            println!("Completed:");
            println!("  Steps: {}", report.steps);
            println!("  Final time: {:.6}", report.final_time);
            println!("  Snapshots: {}", report.nout);
            println!(
                "  Wall time: {:.2}s ({:.1} steps/s)",
                report.wall_seconds,
                report.steps as f64 / report.wall_seconds
            );
            println!("  Output: {}", out_dir.display());
        }
        Err(e) => {
            eprintln!("Run failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_example_config() {
    let config = SolverConfig::default();
    println!("Example configuration (config.json):");
    println!("{}", serde_json::to_string_pretty(&config).unwrap());
}
