use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use marketwire::models::{Article, ArticleFilter, ArticleTable, MarketName, RawArticle};
use marketwire::{
    AnalyzerConfig, ArticleAnalyzer, ArticleEditor, ClaudeProvider, Config, EditRequest,
    FeedFetcher, FeedSource, GeoConfig, GeoResolver, IngestionPipeline, LLMProvider, MarketTable,
    NominatimGeocoder, NwsClient, PipelineConfig, Storage, WeatherConfig, WeatherEnricher,
    WebhookPayload, WebhookSettings,
};

#[derive(Parser, Debug)]
#[command(name = "marketwire")]
#[command(version = "0.1.0")]
#[command(about = "Ingest local news, resolve markets, and keep an audited article store")]
struct Args {
    /// Database path (overrides DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a raw article (or an array of them) from a JSON file
    Ingest {
        file: PathBuf,
        /// Re-ingest sources that are already stored
        #[arg(long)]
        force: bool,
    },

    /// Ingest a first-party webhook payload from a JSON file
    Webhook {
        file: PathBuf,
        #[arg(long)]
        secret: Option<String>,
    },

    /// Fetch an RSS/Atom feed and ingest its newest entries
    FetchFeed {
        url: String,
        /// City the outlet covers; used as the default article location
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        first_party: bool,
        #[arg(long, default_value = "20")]
        limit: usize,
        #[arg(long)]
        force: bool,
    },

    /// Re-run analysis and market resolution for one stored article
    Reprocess {
        id: i64,
        #[arg(long, default_value = "articles")]
        table: ArticleTable,
    },

    /// Apply a manual edit request from a JSON file
    Edit { file: PathBuf },

    /// Assign markets to stored articles that have none
    Backfill {
        /// Defaults to every article table
        #[arg(long)]
        table: Option<ArticleTable>,
    },

    /// Refresh weather for every market city
    Weather {
        /// Print stored snapshots instead of refreshing
        #[arg(long)]
        show: bool,
    },

    /// List the configured markets
    Markets,

    /// List stored articles
    List {
        #[arg(long, default_value = "articles")]
        table: ArticleTable,
        #[arg(long)]
        market: Option<String>,
        #[arg(long)]
        local_only: bool,
        #[arg(long)]
        accessible_only: bool,
        #[arg(long)]
        include_discarded: bool,
        #[arg(long, default_value = "50")]
        limit: usize,
        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the edit history of one article
    History {
        id: i64,
        #[arg(long, default_value = "articles")]
        table: ArticleTable,
    },

    /// Resolve a free-text location to its market
    Resolve { location: String },
}

struct App {
    config: Config,
    storage: Arc<Storage>,
    llm: Option<Arc<dyn LLMProvider>>,
    markets: Arc<MarketTable>,
    resolver: Arc<GeoResolver>,
}

impl App {
    fn new(config: Config, database: Option<String>) -> anyhow::Result<Self> {
        let storage = Arc::new(Storage::new(
            database.as_deref().unwrap_or(&config.database_path),
        )?);

        let llm: Option<Arc<dyn LLMProvider>> = match &config.anthropic_api_key {
            Some(key) => {
                let provider = ClaudeProvider::new(key.clone(), Some(config.anthropic_model.clone()))?;
                tracing::debug!("Using {} ({})", provider.name(), config.anthropic_model);
                Some(Arc::new(provider))
            }
            None => {
                tracing::warn!("ANTHROPIC_API_KEY not set; articles get default analysis");
                None
            }
        };

        let markets = Arc::new(MarketTable::kansas());
        let geocoder = Arc::new(NominatimGeocoder::new(&config.user_agent())?);
        let resolver = Arc::new(GeoResolver::new(
            markets.clone(),
            geocoder,
            GeoConfig::from(&config),
        ));

        Ok(Self {
            config,
            storage,
            llm,
            markets,
            resolver,
        })
    }

    fn pipeline(&self) -> IngestionPipeline {
        let analyzer = ArticleAnalyzer::new(self.llm.clone(), AnalyzerConfig::from(&self.config));
        IngestionPipeline::new(
            Arc::new(analyzer),
            self.resolver.clone(),
            self.storage.clone(),
            PipelineConfig::from(&self.config),
        )
    }

    fn editor(&self) -> ArticleEditor {
        ArticleEditor::new(self.storage.clone(), self.resolver.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("marketwire=info".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = Config::from_env()?;
    let app = App::new(config, args.database)?;

    match args.command {
        Command::Ingest { file, force } => {
            let text = std::fs::read_to_string(&file)?;
            let value: serde_json::Value = serde_json::from_str(&text)?;
            if value.is_array() {
                let articles: Vec<RawArticle> = serde_json::from_value(value)?;
                let summary = app.pipeline().ingest_batch(&articles, force).await;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                let article: RawArticle = serde_json::from_value(value)?;
                let rows = app.pipeline().ingest(&article).await?;
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
        }

        Command::Webhook { file, secret } => {
            let payload: WebhookPayload = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            let raw = payload.into_raw_article(secret.as_deref(), &WebhookSettings::from(&app.config))?;
            let rows = app.pipeline().ingest(&raw).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }

        Command::FetchFeed {
            url,
            city,
            name,
            first_party,
            limit,
            force,
        } => {
            let source = FeedSource {
                url,
                name,
                city,
                table: if first_party {
                    ArticleTable::FirstPartyArticles
                } else {
                    ArticleTable::Articles
                },
            };
            let fetcher = FeedFetcher::new(&app.config.user_agent())?.with_max_items(limit);
            let articles = fetcher.fetch(&source).await?;
            let summary = app.pipeline().ingest_batch(&articles, force).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Reprocess { id, table } => {
            let article = app.pipeline().reprocess(id, table).await?;
            println!("{}", serde_json::to_string_pretty(&article)?);
        }

        Command::Edit { file } => {
            let request: EditRequest = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            let outcome = request.dispatch(&app.editor()).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Command::Backfill { table } => {
            let pipeline = app.pipeline();
            let tables = table.map(|t| vec![t]).unwrap_or_else(|| ArticleTable::ALL.to_vec());
            for table in tables {
                let updated = pipeline.backfill_markets(table).await?;
                println!("{}: {} rows updated", table, updated);
            }
        }

        Command::Weather { show: true } => {
            for w in app.storage.list_weather()? {
                println!(
                    "{:<14} now {}°F {} | high {} low {} | {}",
                    w.city,
                    show_temp(w.current_temp),
                    w.current_conditions.as_deref().unwrap_or("n/a"),
                    show_temp(w.forecast_high),
                    show_temp(w.forecast_low),
                    w.bullet.as_deref().unwrap_or(""),
                );
            }
        }

        Command::Weather { show: false } => {
            let enricher = WeatherEnricher::new(
                Arc::new(NwsClient::new(&app.config.user_agent())?),
                app.llm.clone(),
                app.markets.clone(),
                WeatherConfig::from(&app.config),
            );
            let stored = enricher.refresh_all(&app.storage).await;
            println!("Stored weather for {} cities", stored);
        }

        Command::List {
            table,
            market,
            local_only,
            accessible_only,
            include_discarded,
            limit,
            format,
        } => {
            let filter = ArticleFilter {
                market: market.map(MarketName::from),
                local_only,
                accessible_only,
                include_discarded,
                limit: Some(limit),
                ..Default::default()
            };
            let articles = app.storage.list_articles(table, &filter)?;
            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&articles)?),
                _ => println!("{}", format_text(&articles)),
            }
        }

        Command::History { id, table } => {
            let history = app.editor().history(id, table)?;
            if history.is_empty() {
                println!("No edits recorded for {} {}", table, id);
            }
            for record in history {
                println!(
                    "{}  {:<20} {} -> {}  ({})",
                    record.edited_at.format("%Y-%m-%d %H:%M:%S"),
                    record.field,
                    record.old_value.as_deref().unwrap_or("null"),
                    record.new_value.as_deref().unwrap_or("null"),
                    record.editor.as_deref().unwrap_or("unknown"),
                );
            }
        }

        Command::Resolve { location } => {
            let market = app.resolver.resolve(&location).await;
            if market.is_at_large() {
                println!("{} -> {} (no market within range)", location, market);
            } else {
                println!("{} -> {}", location, market);
            }
        }

        Command::Markets => {
            for name in app.markets.market_names() {
                match app.markets.by_name(&name) {
                    Some(market) => println!(
                        "{:<14} {}  weather: {}",
                        market.name, market.anchor, market.weather_city
                    ),
                    None => println!("{}", name),
                }
            }
        }
    }

    Ok(())
}

fn show_temp(value: Option<i64>) -> String {
    value.map(|t| t.to_string()).unwrap_or_else(|| "?".to_string())
}

fn format_text(articles: &[Article]) -> String {
    let mut output = String::new();

    if articles.is_empty() {
        output.push_str("No articles found.\n");
        return output;
    }

    for article in articles {
        output.push_str(&format!(
            "[{}] P{} {} ({})\n",
            article.id,
            article
                .priority
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            article.title,
            article
                .market
                .as_ref()
                .map(MarketName::as_str)
                .unwrap_or("no market"),
        ));
        if let Some(ref bullet) = article.bullet {
            output.push_str(&format!("    {}\n", bullet));
        }
        if !article.additional_markets.is_empty() {
            output.push_str(&format!(
                "    also in: {}\n",
                article.additional_markets.join(", ")
            ));
        }
        output.push_str(&format!("    {}\n", article.url));
    }

    output
}
