mod commands;

use chrono::{DateTime, Utc};
use clap::Parser;
use commands::{Simulator, SimulatorError};
use lib::output_log::{create_snapshot_file, dump_cluster_log_to_yaml};
use lib::reader::{ReadError, TokenReader};
use log::{error, info};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::process;

#[derive(Parser)]
#[clap(
    name = "cluster_sim",
    version = "1.0",
    about = "About:
    Simulates a cluster of processors arranged as a binary tree.
    Reads the initial cluster, the initial waiting area and then one command per token group
    until fin, echoing every command and its result."
)]
struct ArgParser {
    ///Path to the command file. Standard input is read when omitted.
    #[clap(short = 'i', long = "input_file_path", required = false)]
    input_file_path: Option<String>,
    ///Path to output directory. A YAML snapshot of the final cluster is written there.
    #[clap(short = 'o', long = "output_dir_path", required = false)]
    output_dir_path: Option<String>,
}

fn open_input(input_file_path: Option<&str>) -> io::Result<Box<dyn BufRead>> {
    match input_file_path {
        Some(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
        None => Ok(Box::new(io::stdin().lock())),
    }
}

fn run(arg: &ArgParser) -> Result<(), SimulatorError> {
    let input = open_input(arg.input_file_path.as_deref()).map_err(ReadError::from)?;
    let mut reader = TokenReader::new(input);
    let mut simulator = Simulator::read(&mut reader)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    simulator.run(&mut reader, &mut out)?;
    out.flush()?;

    if let Some(output_dir_path) = &arg.output_dir_path {
        let now: DateTime<Utc> = Utc::now();
        let date = now.format("%Y-%m-%d-%H-%M-%S").to_string();
        let file_name = format!("{}-cluster_sim", date);
        let file_path = create_snapshot_file(output_dir_path, &file_name);
        dump_cluster_log_to_yaml(&file_path, simulator.cluster());
        info!("Dumped cluster snapshot to {}", file_path);
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let arg: ArgParser = ArgParser::parse();
    if let Err(err) = run(&arg) {
        error!("{}", err);
        process::exit(1);
    }
}
