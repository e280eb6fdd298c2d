use anyhow::Context;
use clap::{Arg, Command};
use log::LevelFilter;
use me_tally::archive::{backup_archive, ArchiveReader};
use me_tally::report::{self, ReportFormat};
use me_tally::{Config, Scanner};
use std::path::Path;
use std::process;

fn main() {
    let matches = Command::new("me-tally")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Tally \"me\" claims and daily sparks from a Messages archive")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("me-tally.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_name("FORMAT")
                .help("Report format (table, json)")
                .value_parser(clap::value_parser!(ReportFormat))
                .default_value("table"),
        )
        .arg(
            Arg::new("no-backup")
                .long("no-backup")
                .help("Do not copy the archive after scanning")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .help("Abort on messages whose body cannot be decoded")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging of every claim and expiry")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let format = matches
        .get_one::<ReportFormat>("format")
        .copied()
        .unwrap_or(ReportFormat::Table);

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("me-tally.yaml");

    let config = match Config::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    if let Err(e) = run(
        &config,
        format,
        matches.get_flag("strict"),
        !matches.get_flag("no-backup"),
    ) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(config: &Config, format: ReportFormat, strict: bool, backup: bool) -> anyhow::Result<()> {
    let tz = config.tz()?;
    let archive_path = config.archive_path();

    let query = match &config.query_file {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read query file: {path}"))?,
        ),
        None => None,
    };

    let reader = ArchiveReader::open(&archive_path)?
        .with_chat(config.chat_identifier.clone())
        .with_query(query);

    let mut scanner = Scanner::new(config, tz).strict(strict);
    scanner.scan(&reader)?;
    let summary = scanner.finish();

    print!("{}", report::render(&summary, format)?);

    if backup {
        let since = summary
            .earliest
            .unwrap_or_else(|| chrono::Utc::now().with_timezone(&tz));
        let target = backup_archive(&archive_path, Path::new(&config.backup_dir), &since)?;
        if format == ReportFormat::Table {
            println!("backup: {}", target.display());
        }
    }

    Ok(())
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the user map and archive path before running.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}
