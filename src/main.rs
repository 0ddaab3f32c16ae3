use clap::{Parser, Subcommand};
use clicky_popular_posts::cache::{MemoryStorage, OptionStore, SqliteStorage, TransientStore};
use clicky_popular_posts::clicky::{ClickyClient, Payload, QueryArgs, ReqwestFetcher};
use clicky_popular_posts::config::Config;
use clicky_popular_posts::logging;
use clicky_popular_posts::widget::{PopularPostsWidget, StaticResolver, WidgetForm};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "clicky-popular-posts")]
#[command(about = "Clicky stats client and popular posts widget renderer")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/clicky-popular-posts/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Path to the cache database
  #[arg(long)]
  db: Option<PathBuf>,

  /// Keep caches in memory only
  #[arg(long, conflicts_with = "db")]
  ephemeral: bool,

  /// Log debug output
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch a report, served from the cache when present
  Get {
    /// Report type, e.g. "pages" or "visitors"
    report_type: String,

    /// Extra query argument as key=value (repeatable)
    #[arg(short, long = "arg", value_parser = parse_key_val)]
    args: Vec<(String, String)>,

    /// Output format: json, php, xml or csv
    #[arg(short, long)]
    output: Option<String>,
  },

  /// Drop every cached report of the configured site
  Flush,

  /// Render the popular posts widget as HTML
  Render {
    /// Widget instance id (default: widget.id from the config)
    #[arg(long)]
    widget_id: Option<String>,

    /// Render failures as HTML comments
    #[arg(long)]
    diagnostics: bool,
  },

  /// Save new widget settings for `render` and invalidate the caches
  Configure {
    /// Widget instance id (default: widget.id from the config)
    #[arg(long)]
    widget_id: Option<String>,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    number: Option<String>,

    /// Date range code, e.g. last-7-days
    #[arg(long)]
    date: Option<String>,

    /// Allowed content type (repeatable)
    #[arg(long = "post-type")]
    post_types: Vec<String>,
  },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
  s.split_once('=')
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = logging::init(args.verbose)?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  if args.ephemeral {
    let storage = Arc::new(MemoryStorage::new());
    run(args.command, &config, storage).await
  } else {
    let path = match args.db.or_else(|| config.cache_path.clone()) {
      Some(path) => path,
      None => SqliteStorage::default_path()?,
    };
    let storage = SqliteStorage::open_at(&path)?;
    run(args.command, &config, storage).await
  }
}

async fn run<S>(command: Command, config: &Config, storage: S) -> Result<()>
where
  S: OptionStore + TransientStore + Clone,
{
  let fetcher = ReqwestFetcher::new()?;

  match command {
    Command::Get {
      report_type,
      args,
      output,
    } => {
      let mut query: QueryArgs = args.into_iter().collect();
      if let Some(output) = output {
        query.set("output", output);
      }

      let mut client = ClickyClient::new(config.credentials()?, fetcher, storage)
        .with_secure(config.clicky.secure);
      if let Some(endpoint) = config.endpoint()? {
        client = client.with_endpoint(endpoint);
      }

      let payload = client
        .get(&report_type, &query)
        .await
        .map_err(|e| eyre!("{} [{}]", e, e.code()))?;

      match payload {
        Payload::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Payload::Text(text) => println!("{}", text),
      }
    }

    Command::Flush => {
      let mut client = ClickyClient::new(config.credentials()?, fetcher, storage);
      if !client.flush_cache() {
        return Err(eyre!("Failed to persist the flushed cache"));
      }
      info!(site_id = %config.clicky.site_id, "Report cache flushed");
    }

    Command::Render {
      widget_id,
      diagnostics,
    } => {
      let widget = build_widget(config, fetcher, storage)?
        .with_diagnostics(diagnostics || config.widget.diagnostics);
      let widget_id = widget_id.unwrap_or_else(|| config.widget.id.clone());

      // Settings saved by `configure` win over the config file
      let html = widget
        .render_saved(&widget_id, &config.widget_instance()?, &config.widget.chrome)
        .await;
      println!("{}", html);
    }

    Command::Configure {
      widget_id,
      title,
      number,
      date,
      post_types,
    } => {
      let widget = build_widget(config, fetcher, storage)?;
      let widget_id = widget_id.unwrap_or_else(|| config.widget.id.clone());
      let credentials = config.credentials()?;
      let current = match widget.saved_instance(&widget_id) {
        Some(saved) => saved,
        None => config.widget_instance()?,
      };
      let form = WidgetForm {
        title: Some(title.unwrap_or(current.title)),
        site_id: Some(credentials.site_id),
        site_key: Some(credentials.site_key),
        number: Some(number.unwrap_or_else(|| current.number.to_string())),
        post_types: Some(if post_types.is_empty() {
          current.post_types
        } else {
          post_types
        }),
        date: Some(date.unwrap_or_else(|| current.date.as_str().to_string())),
      };

      let mut saved = widget.update(&widget_id, form);

      saved.site_key = "***".to_string();
      print!("{}", serde_yaml::to_string(&saved)?);
    }
  }

  Ok(())
}

fn build_widget<S>(
  config: &Config,
  fetcher: ReqwestFetcher,
  storage: S,
) -> Result<PopularPostsWidget<ReqwestFetcher, S, S, StaticResolver>>
where
  S: OptionStore + TransientStore + Clone,
{
  let resolver = StaticResolver::new(config.content.clone());
  let widget = PopularPostsWidget::new(fetcher, storage.clone(), storage, resolver)
    .with_secure(config.clicky.secure);

  Ok(match config.endpoint()? {
    Some(endpoint) => widget.with_endpoint(endpoint),
    None => widget,
  })
}
