//! isicdl - Concurrent downloader for the ISIC skin lesion image archive
//!
//! Pages through the public catalog, downloads every image into a folder
//! named after its diagnosis and writes a `dataset.csv` index.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "isicdl")]
#[command(about = "Concurrent downloader for the ISIC image archive")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./isicdl.toml or ~/.config/isicdl/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Download the image catalog
    Fetch(cmd::fetch::FetchArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(isicdl_core::ProgressContext::new());

    // Logging goes through the progress bars when they are drawn
    let multi = if progress.is_tty() {
        Some(progress.multi())
    } else {
        None
    };
    let verbosity = isicdl_core::Verbosity::from_flags(cli.quiet, cli.debug);
    isicdl_core::init_logging(verbosity, multi);

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Fetch(args) => cmd::fetch::run(args, &config, &progress),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec![
                "Output directory",
                &config.output.dir.display().to_string(),
            ]);
            table.add_row(vec!["Workers", &config.workers.count.to_string()]);
            table.add_row(vec![
                "Queue capacity",
                &config.workers.queue_capacity.to_string(),
            ]);
            table.add_row(vec!["Catalog URL", &config.http.base_url]);
            table.add_row(vec!["Page size", &config.http.page_size.to_string()]);
            table.add_row(vec![
                "Request timeout",
                &format!("{}s", config.http.timeout_secs),
            ]);
            table.add_row(vec!["Max retries", &config.http.max_retries.to_string()]);
            table.add_row(vec![
                "Backoff",
                &if config.http.backoff_ms > 0 {
                    format!("{}ms", config.http.backoff_ms)
                } else {
                    "none".to_string()
                },
            ]);
            table.add_row(vec![
                "Page delay",
                &format!("{}ms", config.http.page_delay_ms),
            ]);
            table.add_row(vec![
                "Poll interval",
                &format!("{}ms", config.run.poll_interval_ms),
            ]);
            table.add_row(vec!["On error", &config.run.on_error]);
            table.add_row(vec!["Variant", &config.run.variant]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_short_fetch_flags() {
        let cli = Cli::try_parse_from([
            "isicdl", "fetch", "-p", "out", "-n", "4", "-r", "2", "-l", "3",
        ])
        .unwrap();
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.path, Some(std::path::PathBuf::from("out")));
        assert_eq!(args.workers, Some(4));
        assert_eq!(args.retries, Some(2));
        assert_eq!(args.max_pages, Some(3));
        assert_eq!(args.on_error, None);
    }

    #[test]
    fn parse_policy_and_global_flags() {
        let cli = Cli::try_parse_from([
            "isicdl",
            "fetch",
            "--on-error",
            "skip",
            "--variant",
            "full",
            "--quiet",
        ])
        .unwrap();
        assert!(cli.quiet);
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.on_error, Some(cmd::fetch::OnError::Skip));
        assert_eq!(args.variant, Some(cmd::fetch::Variant::Full));
    }
}
