mod db;
mod extract;
mod fetch;
mod ingest;
mod scraper;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ranking_scraper", about = "Team rankings scraper and SQLite loader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape ranking pages to raw JSON dumps
    Scrape {
        /// Only scrape one gender (m or f; default: both)
        #[arg(short, long)]
        gender: Option<String>,
        /// Only scrape one age band (10-19; default: all)
        #[arg(short, long)]
        age: Option<u8>,
    },
    /// Load scraped JSON dumps into the database
    Ingest {
        /// Directory of JSON dumps (default: data/scraped)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Scrape + ingest in one pipeline
    Run,
    /// Show database statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scrape { gender, age } => {
            let groups = resolve_groups(gender.as_deref(), age)?;
            println!("Scraping {} group(s)...", groups.len());
            let client = fetch::build_client()?;
            scraper::scrape_all(&client, &groups, scraper::OUTPUT_DIR.as_ref()).await?;
            Ok(())
        }
        Commands::Ingest { dir } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let dir = dir.unwrap_or_else(|| PathBuf::from(scraper::OUTPUT_DIR));
            println!("Ingesting JSON dumps from {}...", dir.display());
            let (uploaded, summary) = ingest::ingest_dir(&conn, &dir, "data".as_ref())?;
            print_ingest_summary(uploaded, &summary);
            Ok(())
        }
        Commands::Run => {
            let groups = scraper::groups(None, None);

            let t_scrape = Instant::now();
            println!("Pipeline: scraping {} groups...", groups.len());
            let client = fetch::build_client()?;
            scraper::scrape_all(&client, &groups, scraper::OUTPUT_DIR.as_ref()).await?;
            println!("Scraped in {:.1}s", t_scrape.elapsed().as_secs_f64());

            let conn = db::connect()?;
            db::init_schema(&conn)?;
            println!("Ingesting JSON dumps from {}...", scraper::OUTPUT_DIR);
            let (uploaded, summary) =
                ingest::ingest_dir(&conn, scraper::OUTPUT_DIR.as_ref(), "data".as_ref())?;
            print_ingest_summary(uploaded, &summary);
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Total teams:       {}", s.total);
            println!("Male teams:        {}", s.male);
            println!("Female teams:      {}", s.female);
            println!("Nationally ranked: {}", s.nationally_ranked);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn resolve_groups(gender: Option<&str>, age: Option<u8>) -> anyhow::Result<Vec<scraper::Group>> {
    let gender = match gender {
        Some(s) => Some(
            scraper::Gender::parse(s)
                .ok_or_else(|| anyhow::anyhow!("unknown gender `{}` (use m or f)", s))?,
        ),
        None => None,
    };
    if let Some(a) = age {
        if !(10..=19).contains(&a) {
            anyhow::bail!("age {} out of range (10-19)", a);
        }
    }
    Ok(scraper::groups(gender, age))
}

fn print_ingest_summary(uploaded: usize, summary: &ingest::IngestSummary) {
    println!(
        "Done: {} teams uploaded ({} files skipped, {} empty, {} records skipped, {} duplicate ids).",
        uploaded,
        summary.skipped_files.len(),
        summary.empty_files.len(),
        summary.skipped_records.len(),
        summary.duplicate_ids.len(),
    );
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_groups_defaults_to_full_grid() {
        assert_eq!(resolve_groups(None, None).unwrap().len(), 20);
    }

    #[test]
    fn resolve_groups_rejects_bad_inputs() {
        assert!(resolve_groups(Some("x"), None).is_err());
        assert!(resolve_groups(None, Some(9)).is_err());
        assert!(resolve_groups(None, Some(20)).is_err());
    }

    #[test]
    fn resolve_groups_accepts_spelled_out_gender() {
        let groups = resolve_groups(Some("female"), Some(15)).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].to_string(), "f_u15");
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(std::time::Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(std::time::Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(std::time::Duration::from_secs(3725)), "1h 2m 5s");
    }
}
