use clap::Parser;
use colored::Colorize;
use habitsync::{Database, HabitApi, Settings};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "habitsync")]
#[command(author, version, about = "Mirror your Habitica tasks into a local SQLite database")]
struct Args {
    /// Increase log detail (-v for progress, -vv for per-row tracing)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to read credentials from
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database file (overrides config)
    #[arg(long)]
    db: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let settings = match args.config {
        Some(ref path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let db_path = args.db.unwrap_or_else(|| settings.database_path());
    let db = match Database::open_at(&db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let api = match HabitApi::new(&settings.user_id, &settings.api_key, settings.base_url.as_deref()) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    match habitsync::sync::run(&db, &api) {
        Ok(report) => {
            println!(
                "{} {} tasks reconciled, {} skipped",
                "sync complete:".green().bold(),
                report.tasks_processed,
                report.tasks_skipped
            );
            println!("  before: {}", report.before);
            println!("  after:  {}", report.after);
            for warning in &report.warnings {
                println!("  {} {}", "warning:".yellow().bold(), warning);
            }
        }
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(e.exit_code());
        }
    }
}
