use anyhow::{Context, Result};
use catalog_harvester::export::{self, ExportFormat};
use catalog_harvester::model::ALL_CATEGORIES;
use catalog_harvester::normalize::{normalize, parse_raw_batch};
use catalog_harvester::service::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use catalog_harvester::session::{CrawlSession, SessionOptions, SessionPacing};
use catalog_harvester::{
    Catalog, CatalogQuery, CatalogStats, CategoryFilter, Extractor, FilterConfig, GeminiService,
    ProductRecord, ServiceConfig,
};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "catalog-harvester")]
#[command(about = "Extract product catalogs from text or simulated TikTok crawls", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Category filter (所有类目 = no constraint)
    #[arg(long, global = true, default_value = ALL_CATEGORIES)]
    category: String,

    /// Minimum price
    #[arg(long, global = true, default_value = "")]
    min_price: String,

    /// Maximum price
    #[arg(long, global = true, default_value = "")]
    max_price: String,

    /// Minimum sales (plain number, e.g. 10000)
    #[arg(long, global = true, default_value = "")]
    min_sales: String,

    /// Case-insensitive search over product and shop names
    #[arg(short, long, global = true, default_value = "")]
    search: String,

    /// Output format: table, csv, xlsx, or json
    #[arg(short, long, global = true, default_value = "table")]
    format: String,

    /// Directory to write the export file into
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Print aggregate statistics
    #[arg(long, global = true)]
    stats: bool,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini model identifier
    #[arg(long, env = "GEMINI_MODEL", global = true, default_value = DEFAULT_MODEL)]
    model: String,

    /// Gemini API base URL
    #[arg(long, env = "GEMINI_BASE_URL", global = true, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Service timeout in seconds
    #[arg(short, long, global = true, default_value = "60")]
    timeout: u64,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract products from pasted text (reads stdin when no text is given)
    Text {
        /// Text to extract from
        #[arg(long, conflicts_with = "input")]
        text: Option<String>,

        /// File holding the text
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Category or free-text context for the model
        #[arg(long, default_value = "")]
        context: String,
    },
    /// Simulate crawling a URL
    Crawl {
        /// Target URL
        #[arg(long)]
        url: String,

        /// Disable stealth mode
        #[arg(long)]
        no_stealth: bool,

        /// Residential proxy region
        #[arg(long, default_value = "美国 (US - Residential)")]
        proxy_region: String,

        /// Do not use a residential proxy
        #[arg(long)]
        no_proxy: bool,

        /// Disable automatic captcha solving
        #[arg(long)]
        no_captcha: bool,

        /// Skip the scripted delays
        #[arg(long)]
        instant: bool,
    },
    /// Normalize a raw JSON array offline (no service call)
    Normalize {
        /// JSON file holding an array of raw records
        #[arg(short, long)]
        input: PathBuf,

        /// Provenance label for records without raw content
        #[arg(long, default_value = "文本导入")]
        provenance: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose {
        "debug"
    } else if args.quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::info!("🚀 Catalog Harvester v{}", env!("CARGO_PKG_VERSION"));

    let filters = FilterConfig::from_text(
        &args.category,
        &args.min_price,
        &args.max_price,
        &args.min_sales,
    );

    let mut catalog = Catalog::new();
    let batch = match &args.command {
        Command::Text {
            text,
            input,
            context,
        } => {
            let source = read_source(text.as_deref(), input.as_ref())?;
            let extractor = build_extractor(&args)?;
            let context = if context.trim().is_empty() {
                category_hint(&filters)
            } else {
                context.clone()
            };
            extractor
                .extract_from_text(&source, &context, constraint_hint(&filters))
                .await?
        }
        Command::Crawl {
            url,
            no_stealth,
            proxy_region,
            no_proxy,
            no_captcha,
            instant,
        } => {
            let options = SessionOptions {
                stealth_mode: !no_stealth,
                proxy_region: (!no_proxy).then(|| proxy_region.clone()),
                auto_captcha: !no_captcha,
                pacing: if *instant {
                    SessionPacing::instant()
                } else {
                    SessionPacing::default()
                },
            };
            let extractor = build_extractor(&args)?;
            let mut session = CrawlSession::new(options);
            let records = session
                .run(url, extractor.simulate_url_extraction(url, constraint_hint(&filters)))
                .await?;
            session.reset()?;
            records
        }
        Command::Normalize { input, provenance } => {
            let content = std::fs::read_to_string(input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let value: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("{} is not valid JSON", input.display()))?;
            normalize(parse_raw_batch(&value)?, provenance)
        }
    };

    catalog.prepend_batch(batch);

    let query = CatalogQuery::new(args.search.clone(), filters);
    let visible = catalog.filtered(&query);
    if query.is_active() {
        log::info!(
            "🔎 {} of {} record(s) match the current filters",
            visible.len(),
            catalog.len()
        );
    }

    if args.stats && !args.quiet {
        println!("{}", format_stats(&CatalogStats::compute(visible.iter().copied())));
    }

    output_results(&visible, &args)?;

    log::info!("✅ Collected {} product(s)", catalog.len());
    Ok(())
}

/// Text from --text, --input, or stdin
fn read_source(text: Option<&str>, input: Option<&PathBuf>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text.to_string());
    }
    if let Some(path) = input {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }
    log::debug!("Reading source text from stdin");
    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer)
}

fn build_extractor(args: &Args) -> Result<Extractor<GeminiService>> {
    let config = ServiceConfig {
        api_key: args.api_key.clone().unwrap_or_default(),
        model: args.model.clone(),
        base_url: args.base_url.clone(),
        timeout: Duration::from_secs(args.timeout),
    };
    let service = GeminiService::new(config)?;
    Ok(Extractor::new(service))
}

fn category_hint(filters: &FilterConfig) -> String {
    match &filters.category {
        CategoryFilter::Exact(category) => category.clone(),
        CategoryFilter::All => String::new(),
    }
}

fn constraint_hint(filters: &FilterConfig) -> Option<&FilterConfig> {
    (!filters.is_unconstrained()).then_some(filters)
}

/// Output results in the requested format
fn output_results(records: &[&ProductRecord], args: &Args) -> Result<()> {
    if args.format.eq_ignore_ascii_case("table") || args.format.eq_ignore_ascii_case("text") {
        if !args.quiet {
            println!("{}", format_table(records));
        }
        return Ok(());
    }

    let format: ExportFormat = args.format.parse()?;
    match (&args.output, format) {
        (Some(dir), _) => {
            export::write_export(records, format, dir, chrono::Utc::now())?;
        }
        (None, ExportFormat::Xlsx) => {
            export::write_export(records, format, &PathBuf::from("."), chrono::Utc::now())?;
        }
        (None, ExportFormat::Csv) => print!("{}", export::to_csv(records)?),
        (None, ExportFormat::Json) => println!("{}", export::to_json(records)?),
    }
    Ok(())
}

/// Format records as plain text
fn format_table(records: &[&ProductRecord]) -> String {
    let mut output = String::new();

    if records.is_empty() {
        output.push_str("No products match.\n");
        return output;
    }

    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            output.push('\n');
            output.push_str(&"-".repeat(60));
            output.push('\n');
        }

        output.push_str(&format!("{}. {}\n", i + 1, record.product_name));
        output.push_str(&format!("   Price: {}", record.price));
        if !record.sales_volume.is_empty() {
            output.push_str(&format!("  Sales: {}", record.sales_volume));
        }
        output.push_str(&format!("  Revenue: {:.2}\n", record.revenue));
        output.push_str(&format!("   Shop: {}", record.shop_name));
        if let Some(link) = &record.shop_link {
            output.push_str(&format!(" ({})", link));
        }
        output.push('\n');
        if let Some(category) = &record.category {
            output.push_str(&format!("   Category: {}\n", category));
        }
        if let Some(link) = &record.product_link {
            output.push_str(&format!("   Link: {}\n", link));
        }

        let preview: String = record.raw_content.chars().take(80).collect();
        if preview.len() < record.raw_content.len() {
            output.push_str(&format!("   Source: {}...\n", preview));
        } else {
            output.push_str(&format!("   Source: {}\n", preview));
        }
    }

    output
}

fn format_stats(stats: &CatalogStats) -> String {
    let mut output = String::new();
    output.push_str(&format!("Products: {}\n", stats.total));
    output.push_str(&format!("Average price: {}\n", stats.average_price_display()));
    output.push_str(&format!("Estimated revenue: {:.2}\n", stats.total_revenue));
    output.push_str(&format!("Link coverage: {}\n", stats.link_coverage_display()));

    output.push_str("\nPrice distribution:\n");
    for bucket in &stats.price_distribution {
        output.push_str(&format!("  {:>7}: {}\n", bucket.label, bucket.count));
    }

    if !stats.top_shops.is_empty() {
        output.push_str("\nTop shops:\n");
        for (i, shop) in stats.top_shops.iter().enumerate() {
            output.push_str(&format!("  {}. {} ({})\n", i + 1, shop.label, shop.count));
        }
    }

    if !stats.categories.is_empty() {
        output.push_str("\nCategories:\n");
        for category in &stats.categories {
            output.push_str(&format!("  - {} ({})\n", category.label, category.count));
        }
    }

    output
}
