use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::download::{DownloadOutcome, FileSink, ImageDownloader};
use crate::normalize::Extraction;
use crate::notify::{Notifier, Toast};
use crate::render::{build_view, ErrorBanner, RenderError, RenderSurface};
use crate::submission::{validate_url, InputError, Session, Submission};
use crate::webhook::{WebhookClient, WebhookError};

const REQUEST_FAILED: &str = "Request failed, check your network connection or try again later";
const RAW_SAVED_TOAST: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Webhook(#[from] WebhookError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Ties input validation, the webhook, the session and the downloader
/// together. Shared by the CLI and the HTTP service.
pub struct App {
    session: Session,
    webhook: WebhookClient,
    downloader: ImageDownloader,
    notifier: Arc<dyn Notifier>,
}

impl App {
    pub fn new(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Self, reqwest::Error> {
        let http = config.http_client()?;
        Ok(Self {
            session: Session::new(),
            webhook: WebhookClient::new(
                http.clone(),
                config.webhook_url.clone(),
                config.webhook_timeout,
            ),
            downloader: ImageDownloader::new(
                http,
                config.image_service_url.clone(),
                config.bulk,
                Arc::clone(&notifier),
            ),
            notifier,
        })
    }

    /// Validate `input`, ask the webhook about it and render the result.
    ///
    /// Returns `Ok(None)` when a newer submission started while this one was
    /// in flight; its result is dropped without rendering.
    pub async fn submit(
        &self,
        input: &str,
        surface: &mut dyn RenderSurface,
    ) -> Result<Option<Arc<Submission>>, SubmitError> {
        let url = match validate_url(input) {
            Ok(url) => url,
            Err(e) => {
                surface.show_error(&ErrorBanner::new(e.to_string()))?;
                return Err(e.into());
            }
        };

        surface.show_loading()?;
        let id = self.session.begin().await;
        tracing::info!("submission {} for {}", id, url);

        let data = match self.webhook.fetch_product(&url).await {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("submission {} failed: {}", id, e);
                surface.show_error(&ErrorBanner::new(REQUEST_FAILED))?;
                return Err(e.into());
            }
        };

        let extraction = Extraction::from_response(&data);
        tracing::info!(
            "submission {}: shape {:?}, {} unique images",
            id,
            extraction.shape.kind(),
            extraction.images.len()
        );

        let Some(submission) = self.session.complete(id, url, extraction).await else {
            return Ok(None);
        };
        surface.show_results(&build_view(&submission))?;
        Ok(Some(submission))
    }

    pub async fn current(&self) -> Option<Arc<Submission>> {
        self.session.current().await
    }

    /// Store the raw webhook text of the current submission as
    /// `product_info_<unix-millis>.txt`.
    pub async fn save_raw(&self, sink: &dyn FileSink) -> std::io::Result<Option<String>> {
        let current = self.session.current().await;
        let Some(raw) = current.as_ref().and_then(|s| s.extraction.raw()) else {
            self.notifier
                .notify(Toast::warning("Nothing to download", RAW_SAVED_TOAST));
            return Ok(None);
        };

        let name = raw_filename(chrono::Utc::now().timestamp_millis());
        let stored = sink.emit(&name, raw.as_bytes()).await?;
        self.notifier
            .notify(Toast::success("Raw text saved", RAW_SAVED_TOAST));
        Ok(Some(stored))
    }

    pub async fn download_image(
        &self,
        sink: &dyn FileSink,
        image_url: &str,
        index: usize,
    ) -> DownloadOutcome {
        self.downloader.download_image(sink, image_url, index).await
    }

    /// Download every image of the current submission.
    pub async fn download_all(&self, sink: Arc<dyn FileSink>) -> Vec<DownloadOutcome> {
        let images = self
            .session
            .current()
            .await
            .map(|s| s.extraction.images.clone())
            .unwrap_or_default();
        self.downloader.download_all(sink, &images).await
    }
}

pub fn raw_filename(millis: i64) -> String {
    format!("product_info_{}.txt", millis)
}
