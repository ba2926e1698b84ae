use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use herald_crawler::browser::{ChromeDriver, HttpResourceProbe};
use herald_crawler::config::{AppConfig, DeliveryMode};
use herald_crawler::coordinator::{Coordinator, ReconcileSettings};
use herald_crawler::models::SiteCatalog;
use herald_crawler::pipeline::{self, CrawlMode, CrawlOptions, CrawlPipeline, Delivery};
use herald_crawler::plugins::EnrichmentManager;
use herald_crawler::queue::SpoolQueue;
use herald_crawler::session::{Credentials, Session, SessionTimeouts};
use herald_crawler::store::{CachedTokenProvider, HttpContentStore, KeycloakTokenSource};
use herald_crawler::utils::logging;

mod cli;

use cli::{Cli, Command};

type RemoteStore = HttpContentStore<CachedTokenProvider<KeycloakTokenSource>>;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config_dir)
        .with_context(|| format!("Failed to load configuration from {}", cli.config_dir))?;
    let log_dir = config.pipeline.log_dir.clone().unwrap_or_else(|| "logs".to_string());
    let _guard = logging::init(cli.log_level.as_deref(), Path::new(&log_dir), "herald-crawler.log")?;

    info!("Starting Herald crawler...");

    match cli.command {
        Command::Sites => list_sites(&config),
        Command::Crawl { site, max_urls, queue } => {
            crawl(&config, &site, CrawlMode::Latest, max_urls.or(config.pipeline.max_urls), queue).await
        }
        Command::Archive {
            site,
            from_year,
            to_year,
            queue,
        } => {
            if from_year > to_year {
                bail!("--from-year {} is after --to-year {}", from_year, to_year);
            }
            crawl(&config, &site, CrawlMode::Archive(from_year..=to_year), config.pipeline.max_urls, queue).await
        }
        Command::Upload => upload(&config).await,
    }
}

fn list_sites(config: &AppConfig) -> Result<()> {
    let catalog = SiteCatalog::from_file(Path::new(&config.sites_path))?;
    for name in catalog.names() {
        println!("{}", name);
    }
    Ok(())
}

async fn crawl(config: &AppConfig, site: &str, mode: CrawlMode, max_urls: Option<usize>, queue: bool) -> Result<()> {
    let catalog = SiteCatalog::from_file(Path::new(&config.sites_path))
        .with_context(|| format!("Failed to load site profiles from {}", config.sites_path))?;
    let profile = catalog.get(site)?.clone();

    let credentials = match &config.auth.site_credentials_path {
        Some(path) => match Credentials::load(Path::new(path)) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                warn!(error = %e, "Site credentials unavailable");
                None
            }
        },
        None => Credentials::from_env(),
    };

    let delivery = if queue || config.pipeline.delivery == DeliveryMode::Queue {
        Delivery::Queue(Arc::new(SpoolQueue::new(&config.pipeline.spool_path)))
    } else {
        Delivery::Upload
    };

    let enrichment = EnrichmentManager::new(config.pipeline.enrichment_batch_size);
    enrichment
        .initialize_default_enrichers(config.pipeline.strip_text_before_upload)
        .await?;

    let mut options = CrawlOptions::from(&config.pipeline);
    options.max_urls = max_urls;

    let pipeline = CrawlPipeline::new(coordinator(config)?, enrichment.clone(), delivery, options);

    let scraper = config.scraper.clone();
    let session = tokio::task::spawn_blocking(move || -> herald_crawler::Result<_> {
        let driver = ChromeDriver::launch(&scraper)?;
        let probe = HttpResourceProbe::new(&scraper.user_agent, Duration::from_secs(scraper.probe_timeout))?;
        Ok(Session::new(driver, probe, profile, SessionTimeouts::from(&scraper)))
    })
    .await??;

    let summary = pipeline.run(session, credentials, mode).await;
    enrichment.shutdown().await?;

    let summary = summary.with_context(|| format!("Crawl of {} failed", site))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn upload(config: &AppConfig) -> Result<()> {
    let queue = SpoolQueue::new(&config.pipeline.spool_path);
    let report = pipeline::upload_spooled(&queue, &coordinator(config)?).await?;
    info!(uploaded = report.uploaded, failed = report.failed, "Spool upload finished");
    println!("uploaded: {}, failed: {}", report.uploaded, report.failed);
    Ok(())
}

fn coordinator(config: &AppConfig) -> Result<Coordinator<RemoteStore>> {
    let auth = &config.auth;
    let (username, password) = match (&auth.username, &auth.password, &auth.credentials_path) {
        (Some(username), Some(password), _) => (username.clone(), password.clone()),
        (_, _, Some(path)) => {
            let credentials = Credentials::from_file(Path::new(path))
                .with_context(|| format!("Failed to read store credentials from {}", path))?;
            (credentials.email, credentials.password)
        }
        _ => bail!("Store credentials missing: set auth.username/auth.password or auth.credentials_path"),
    };

    let source = KeycloakTokenSource::new(
        &auth.server_url,
        &auth.realm,
        &auth.client_id,
        &username,
        &password,
        Duration::from_secs(config.store.request_timeout),
    )?;
    let store = HttpContentStore::new(&config.store, Arc::new(CachedTokenProvider::new(source)))?;
    Ok(Coordinator::new(Arc::new(store), ReconcileSettings::from(&config.store)))
}
