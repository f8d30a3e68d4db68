use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comps_ingest::{build_scheduler, IngestConfig, IngestPipeline, SearchCriteria};
use comps_store::PropertyFilter;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "comps-cli")]
#[command(about = "County comps ingestion pipeline command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one ingest cycle over the configured sources.
    Ingest {
        /// Restrict the run to these cities.
        #[arg(long)]
        city: Vec<String>,
        /// Restrict the run to these zip codes.
        #[arg(long)]
        zip: Vec<String>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_price: Option<f64>,
    },
    /// Ingest, then list stored properties cheapest first.
    Query {
        #[arg(long)]
        city: Vec<String>,
        #[arg(long)]
        max_price: Option<u64>,
        #[arg(long)]
        min_bedrooms: Option<u32>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Ingest, then print inventory statistics as JSON.
    Stats,
    /// Ingest, then purge stale sold listings.
    Cleanup,
    /// Run the cron scheduler until interrupted.
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Ingest {
        city: Vec::new(),
        zip: Vec::new(),
        min_price: None,
        max_price: None,
    });

    match command {
        Commands::Ingest {
            city,
            zip,
            min_price,
            max_price,
        } => {
            let pipeline = IngestPipeline::new(IngestConfig::from_env())?;
            let criteria = SearchCriteria {
                cities: city,
                zip_codes: zip,
                min_price,
                max_price,
                min_bedrooms: None,
            };
            let summary = pipeline.run_once(&criteria).await?;
            println!(
                "ingest complete: run_id={} sources={} scraped={} invalid={} out_of_market={} stored={} failures={}",
                summary.run_id,
                summary.sources,
                summary.scraped,
                summary.invalid,
                summary.out_of_market,
                summary.stored,
                summary.store_failures
            );
        }
        Commands::Query {
            city,
            max_price,
            min_bedrooms,
            limit,
        } => {
            let pipeline = IngestPipeline::new(IngestConfig::from_env())?;
            pipeline.run_once(&SearchCriteria::default()).await?;
            let filter = PropertyFilter {
                cities: city,
                max_price,
                min_bedrooms,
                limit: Some(limit),
                ..Default::default()
            };
            let records = pipeline.store().query(&filter).await?;
            for record in &records {
                let p = &record.property;
                println!(
                    "${:<12} {:<4} bd {:<4} ba {:>6} sqft  {} | {}, {} {}  score={}",
                    p.list_price,
                    p.bedrooms,
                    p.bathrooms,
                    p.square_feet.map(|s| s.to_string()).unwrap_or_default(),
                    p.property_type,
                    p.address,
                    p.city,
                    p.zip_code,
                    p.match_score.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())
                );
            }
            println!("{} properties", records.len());
        }
        Commands::Stats => {
            let pipeline = IngestPipeline::new(IngestConfig::from_env())?;
            pipeline.run_once(&SearchCriteria::default()).await?;
            let stats = pipeline.store().stats(None).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Cleanup => {
            let pipeline = IngestPipeline::new(IngestConfig::from_env())?;
            pipeline.run_once(&SearchCriteria::default()).await?;
            let removed = pipeline.cleanup_sold().await?;
            println!("cleanup complete: removed={removed}");
        }
        Commands::Schedule => {
            let pipeline = Arc::new(IngestPipeline::new(IngestConfig::from_env())?);
            match build_scheduler(pipeline).await? {
                Some(sched) => {
                    sched.start().await.context("starting scheduler")?;
                    println!("scheduler running; ctrl-c to stop");
                    tokio::signal::ctrl_c().await?;
                }
                None => {
                    eprintln!("scheduler disabled; set COMPS_SCHEDULER_ENABLED=1");
                }
            }
        }
    }

    Ok(())
}
