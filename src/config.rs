use std::time::Duration;

use url::Url;

// ── Defaults ─────────────────────────────────────────────────────────────────

pub const DEFAULT_WEBHOOK_URL: &str =
    "https://n8n.n8-n.org/webhook/009e809a-43de-4b8f-bc5a-e49f33f7558c";

pub const DEFAULT_IMAGE_SERVICE_URL: &str =
    "https://music-shop-image-downloader-354905615311.asia-east1.run.app/auto-download";

pub const DEFAULT_BULK_STAGGER_MS: u64 = 1000;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// The webhook scrapes and summarises a page before answering.
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 300;

pub const USER_AGENT: &str = concat!("product-grabber/", env!("CARGO_PKG_VERSION"));

// ── Bulk download policy ─────────────────────────────────────────────────────

/// Start-time spacing for bulk image downloads.
///
/// Image `i` of a batch is started `stagger * i` after the batch begins. There
/// is no cap on how many downloads may be in flight at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkPolicy {
    pub stagger: Duration,
}

impl Default for BulkPolicy {
    fn default() -> Self {
        Self {
            stagger: Duration::from_millis(DEFAULT_BULK_STAGGER_MS),
        }
    }
}

impl BulkPolicy {
    pub fn delay_for(&self, index: usize) -> Duration {
        self.stagger
            .saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
    }
}

// ── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Config {
    /// Automation endpoint that turns a product URL into content + images.
    pub webhook_url: Url,
    /// Image proxy that fetches an image server-side and returns its bytes.
    pub image_service_url: Url,
    pub bulk: BulkPolicy,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Whole-request limit for the webhook call only.
    pub webhook_timeout: Duration,
}

impl Config {
    pub fn new(webhook_url: Url, image_service_url: Url) -> Self {
        Self {
            webhook_url,
            image_service_url,
            bulk: BulkPolicy::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            webhook_timeout: Duration::from_secs(DEFAULT_WEBHOOK_TIMEOUT_SECS),
        }
    }

    pub fn with_bulk(mut self, bulk: BulkPolicy) -> Self {
        self.bulk = bulk;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    pub fn with_webhook_timeout(mut self, timeout: Duration) -> Self {
        self.webhook_timeout = timeout;
        self
    }

    /// Shared HTTP client for every outbound call.
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::ClientBuilder::new()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(USER_AGENT)
            .build()
    }
}
