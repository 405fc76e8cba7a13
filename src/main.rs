mod error;
mod logger;
mod model;
mod scenario;
mod scheduling;
mod viewer;

use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};

use structopt::StructOpt;

use logger::{LogLevel, Logger};
use model::log::OperationLog;
use scheduling::{ScheduleReport, Scheduler};
use viewer::{Replay, ReplayBoard};

/// Schedule box moves in a stacking warehouse and print the operation log.
#[derive(Debug, StructOpt)]
#[structopt(name = "stackyard")]
struct Options {
    /// Scenario file (JSON)
    #[structopt(parse(from_os_str))]
    scenario: PathBuf,
    /// Where to write the operation log. Defaults to stdout.
    #[structopt(parse(from_os_str))]
    output: Option<PathBuf>,
    #[structopt(long = "log-level", default_value = "info")]
    log_level: LogLevel,
    #[structopt(long = "log-file", parse(from_os_str))]
    log_file: Option<PathBuf>,
    /// Replay the schedule in the terminal when done
    #[structopt(long)]
    view: bool,
}

fn main() {
    let options = Options::from_args();
    let logger = match &options.log_file {
        Some(path) => match Logger::with_file(options.log_level, path) {
            Ok(logger) => logger,
            Err(err) => {
                eprintln!("Cannot open log file {}: {}", path.display(), err);
                std::process::exit(1);
            }
        },
        None => Logger::new(options.log_level),
    };

    if let Err(err) = run(&options, &logger) {
        logger.error("main", &format!("{}", err));
        std::process::exit(1);
    }
}

fn run(options: &Options, logger: &Logger) -> Result<ScheduleReport, Box<dyn Error>> {
    let mut warehouse = scenario::load_scenario(&options.scenario, logger)?;
    let board = ReplayBoard::capture(&warehouse.graph, &warehouse.vehicles);

    let report = match Scheduler::new(logger.clone()).run(&mut warehouse) {
        Ok(report) => report,
        Err(err) => {
            write_log(&warehouse.log, options.output.as_deref(), logger)?;
            logger.warning(
                "main",
                &format!(
                    "Scheduling stopped early, the log holds the {} operations committed before the failure",
                    warehouse.log.len()
                ),
            );
            return Err(err.into());
        }
    };
    write_log(&warehouse.log, options.output.as_deref(), logger)?;
    if warehouse.log.is_empty() {
        logger.warning("main", "No operations were scheduled");
    }
    for line in report.to_string().lines() {
        logger.info("main", line);
    }

    if options.view {
        let title = options
            .scenario
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        viewer::run(Replay::new(board, &warehouse.log), &title)?;
    }
    Ok(report)
}

fn write_log(log: &OperationLog, output: Option<&Path>, logger: &Logger) -> io::Result<()> {
    match output {
        Some(path) => {
            log.write_file(path)?;
            logger.info("main", &format!("Operation log written to {}", path.display()));
            Ok(())
        }
        None => log.write_to(io::stdout().lock()),
    }
}
