use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use url::Url;

mod app;
mod config;
mod download;
mod models;
mod normalize;
mod notify;
mod render;
mod server;
mod submission;
mod webhook;

#[cfg(test)]
mod test_support;

use app::App;
use config::{BulkPolicy, Config};
use download::{DirSink, FileSink};
use notify::TracingNotifier;
use render::{DownloadLinks, HtmlPageSurface, RenderSurface, TerminalSurface};

#[derive(Debug, Parser)]
#[command(name = "product-grabber", version, about = "Fetch product info and images via an automation webhook")]
struct Cli {
    #[command(flatten)]
    endpoints: EndpointArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct EndpointArgs {
    /// Automation webhook that extracts product content.
    #[arg(long, env = "PRODUCT_GRABBER_WEBHOOK_URL", default_value = config::DEFAULT_WEBHOOK_URL, global = true)]
    webhook_url: Url,

    /// Image download service used before falling back to a direct fetch.
    #[arg(long, env = "PRODUCT_GRABBER_IMAGE_SERVICE_URL", default_value = config::DEFAULT_IMAGE_SERVICE_URL, global = true)]
    image_service_url: Url,

    /// Delay between the starts of consecutive bulk image downloads.
    #[arg(long, env = "PRODUCT_GRABBER_BULK_STAGGER_MS", default_value_t = config::DEFAULT_BULK_STAGGER_MS, global = true)]
    bulk_stagger_ms: u64,

    #[arg(long, env = "PRODUCT_GRABBER_CONNECT_TIMEOUT_SECS", default_value_t = config::DEFAULT_CONNECT_TIMEOUT_SECS, global = true)]
    connect_timeout_secs: u64,

    #[arg(long, env = "PRODUCT_GRABBER_REQUEST_TIMEOUT_SECS", default_value_t = config::DEFAULT_REQUEST_TIMEOUT_SECS, global = true)]
    request_timeout_secs: u64,

    /// Limit for the webhook call, which may take minutes.
    #[arg(long, env = "PRODUCT_GRABBER_WEBHOOK_TIMEOUT_SECS", default_value_t = config::DEFAULT_WEBHOOK_TIMEOUT_SECS, global = true)]
    webhook_timeout_secs: u64,
}

impl EndpointArgs {
    fn into_config(self) -> Config {
        Config::new(self.webhook_url, self.image_service_url)
            .with_bulk(BulkPolicy {
                stagger: Duration::from_millis(self.bulk_stagger_ms),
            })
            .with_timeouts(
                Duration::from_secs(self.connect_timeout_secs),
                Duration::from_secs(self.request_timeout_secs),
            )
            .with_webhook_timeout(Duration::from_secs(self.webhook_timeout_secs))
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit one product URL and print what comes back.
    Grab {
        url: String,

        /// Directory for the preview page, raw text and images.
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Write preview.html with the rendered content and gallery. With
        /// --images, its Download buttons link the stored files.
        #[arg(long)]
        preview: bool,

        /// Save the raw webhook text as product_info_<millis>.txt.
        #[arg(long)]
        raw: bool,

        /// Download every image.
        #[arg(long)]
        images: bool,
    },
    /// Serve the JSON API.
    Serve {
        #[arg(long, env = "PRODUCT_GRABBER_BIND", default_value = "0.0.0.0:8000")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.endpoints.into_config();
    let app = App::new(&config, Arc::new(TracingNotifier)).context("building HTTP client")?;

    match cli.command {
        Command::Grab {
            url,
            out,
            preview,
            raw,
            images,
        } => grab(app, &url, out, preview, raw, images).await,
        Command::Serve { bind } => serve(app, &bind).await,
    }
}

async fn grab(
    app: App,
    url: &str,
    out: PathBuf,
    preview: bool,
    raw: bool,
    images: bool,
) -> anyhow::Result<()> {
    let mut terminal = TerminalSurface::new(std::io::stdout());
    let Some(_) = app.submit(url, &mut terminal).await? else {
        return Ok(());
    };

    let sink = Arc::new(DirSink::new(out));

    let stored_images: Vec<Option<String>> = if images {
        app.download_all(sink.clone())
            .await
            .iter()
            .map(|outcome| outcome.file().map(str::to_string))
            .collect()
    } else {
        Vec::new()
    };

    if preview {
        let Some(current) = app.current().await else {
            return Ok(());
        };
        let mut page = HtmlPageSurface::new(DownloadLinks::Local(stored_images));
        page.show_results(&render::build_view(&current))?;
        if let Some(html) = page.page() {
            let stored = sink.emit("preview.html", html.as_bytes()).await?;
            tracing::info!("wrote {}", sink.dir().join(stored).display());
        }
    }

    if raw {
        if let Some(stored) = app.save_raw(sink.as_ref()).await? {
            tracing::info!("wrote {}", sink.dir().join(stored).display());
        }
    }

    Ok(())
}

async fn serve(app: App, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, server::router(Arc::new(app))).await?;
    Ok(())
}
