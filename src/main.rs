//! CLI interface for roundtrip-flights

use anyhow::Context;
use clap::{Parser, Subcommand};
use roundtrip_flights::logging::{init_logging, LogTarget};
use roundtrip_flights::{FlightCardParser, ResultAggregator, ScraperConfig};
use serde_json::json;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "roundtrip-flights")]
#[command(about = "Round-trip flight combinations from Google Flights")]
#[command(version)]
pub struct Cli {
    /// Write JSON logs to daily-rotated files in this directory instead of stderr
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search round trips in a browser (requires the `chromium` feature)
    Search {
        /// Origin city or airport code
        #[arg(short, long)]
        from: String,
        /// Destination city or airport code
        #[arg(short, long)]
        to: String,
        /// Departure date, e.g. "Aug 10, 2025"
        #[arg(short, long)]
        depart: String,
        /// Return date; omit for a one-way search
        #[arg(short, long = "return")]
        return_date: Option<String>,
        /// Number of outbound options to pair (1-30)
        #[arg(short, long, default_value = "5")]
        num_options: usize,
        /// Scraper configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output file for JSON results
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Stream options and combinations to this JSON lines file as they are found
        #[arg(long)]
        jsonl: Option<PathBuf>,
        /// Show the browser window
        #[arg(long)]
        headful: bool,
    },
    /// Parse a saved results page without a browser
    Parse {
        /// Saved HTML of a results page
        #[arg(long)]
        html: PathBuf,
        /// Known origin airport code
        #[arg(long)]
        from: Option<String>,
        /// Known destination airport code
        #[arg(long)]
        to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let target = match cli.log_dir {
        Some(dir) => LogTarget::RollingFile(dir),
        None => LogTarget::Stderr,
    };
    init_logging(target, &cli.log_level)?;

    match cli.command {
        Commands::Search {
            from,
            to,
            depart,
            return_date,
            num_options,
            config,
            output,
            jsonl,
            headful,
        } => {
            let mut scraper_config = match config {
                Some(path) => ScraperConfig::from_json_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => ScraperConfig::default(),
            };
            if headful {
                scraper_config.headless = false;
            }
            let params =
                roundtrip_flights::SearchParams::new(from, to, depart, return_date, num_options);
            run_search(params, scraper_config, output, jsonl).await?;
        }
        Commands::Parse { html, from, to } => {
            let page = fs::read_to_string(&html)
                .with_context(|| format!("reading {}", html.display()))?;
            let parser = FlightCardParser::new()?.with_known_route(from.as_deref(), to.as_deref());
            let options = parser.parse(&page);
            let summary = ResultAggregator::summarize(&options);

            let report = json!({
                "flight_options": options,
                "summary": summary,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

#[cfg(feature = "chromium")]
async fn run_search(
    params: roundtrip_flights::SearchParams,
    config: ScraperConfig,
    output: Option<PathBuf>,
    jsonl: Option<PathBuf>,
) -> anyhow::Result<()> {
    use roundtrip_flights::chromium::BrowserSession;
    use roundtrip_flights::{search_round_trips, JsonLinesSink, NullSink};

    let mut session = BrowserSession::new(&config);
    let driver = session.driver().await?;

    eprintln!("Searching round trips...");
    let outcome = match jsonl {
        Some(path) => {
            let mut sink = JsonLinesSink::create(&path)
                .with_context(|| format!("opening {}", path.display()))?;
            search_round_trips(driver, &mut sink, params, &config).await
        }
        None => search_round_trips(driver, &mut NullSink, params, &config).await,
    };
    session.shutdown().await?;

    let failed = outcome.is_failed();
    let result = outcome.into_result();
    let json = serde_json::to_string_pretty(&result)?;

    match output {
        Some(path) => {
            fs::write(&path, &json)?;
            eprintln!("Results saved to {}", path.display());
        }
        None => println!("{}", json),
    }

    eprintln!("\nSummary:");
    eprintln!(
        "Found {} options, {} combinations",
        result.flight_options.len(),
        result.combinations.len()
    );
    if let Some(range) = &result.summary.price_range {
        eprintln!("Price range: ${} - ${}", range.min, range.max);
    }
    if let Some(range) = result.combination_summary.as_ref().and_then(|s| s.price_range) {
        eprintln!("Round-trip totals: ${} - ${}", range.min, range.max);
    }

    if failed {
        eprintln!("Search failed: {}", result.error.unwrap_or_default());
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(not(feature = "chromium"))]
async fn run_search(
    _params: roundtrip_flights::SearchParams,
    _config: ScraperConfig,
    _output: Option<PathBuf>,
    _jsonl: Option<PathBuf>,
) -> anyhow::Result<()> {
    eprintln!("Browser searches need the `chromium` feature; rebuild with --features chromium");
    std::process::exit(2);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "roundtrip-flights",
            "search",
            "--from", "SFO",
            "--to", "JFK",
            "--depart", "Aug 10, 2025",
            "--return", "Aug 17, 2025",
        ]);

        assert!(cli.is_ok());

        if let Ok(Cli {
            command:
                Commands::Search {
                    from,
                    to,
                    depart,
                    return_date,
                    num_options,
                    ..
                },
            ..
        }) = cli
        {
            assert_eq!(from, "SFO");
            assert_eq!(to, "JFK");
            assert_eq!(depart, "Aug 10, 2025");
            assert_eq!(return_date.as_deref(), Some("Aug 17, 2025"));
            assert_eq!(num_options, 5);
        }
    }

    #[test]
    fn test_parse_command() {
        let cli = Cli::try_parse_from([
            "roundtrip-flights",
            "parse",
            "--html",
            "page.html",
            "--from",
            "SFO",
        ]);
        assert!(matches!(cli, Ok(Cli { command: Commands::Parse { .. }, .. })));
    }
}
