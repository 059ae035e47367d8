use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use url::Url;

use crate::config::BulkPolicy;
use crate::models::UrlPayload;
use crate::notify::{Notifier, Toast};

// ── Constants ────────────────────────────────────────────────────────────────

const NAME_MAX: usize = 255;
const SUCCESS_TOAST: Duration = Duration::from_secs(3);
const FALLBACK_TOAST: Duration = Duration::from_secs(6);

// ── File emission ────────────────────────────────────────────────────────────

/// Destination for downloaded files. Returns the name the file was stored
/// under, which may differ from the requested one.
#[async_trait]
pub trait FileSink: Send + Sync {
    async fn emit(&self, name: &str, bytes: &[u8]) -> io::Result<String>;
}

/// Writes into a directory the way a browser's download folder behaves:
/// unsafe characters are replaced and an existing file gets a ` (n)` sibling.
#[derive(Debug, Clone)]
pub struct DirSink {
    dir: PathBuf,
}

impl DirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl FileSink for DirSink {
    async fn emit(&self, name: &str, bytes: &[u8]) -> io::Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = match sanitize_filename(name) {
            s if s.is_empty() => "download".to_string(),
            s => s,
        };

        for attempt in 0u32.. {
            let candidate = numbered(&name, attempt);
            let path = self.dir.join(&candidate);
            let open = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match open {
                Ok(mut file) => {
                    file.write_all(bytes).await?;
                    file.flush().await?;
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(io::ErrorKind::Other, "no free filename"))
    }
}

/// `photo.jpg` → `photo (2).jpg` for attempt 2.
fn numbered(name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, attempt, ext),
        _ => format!("{} ({})", name, attempt),
    }
}

/// Keeps emitted files in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files.lock().await.clone()
    }

    pub async fn take(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.files.lock().await)
    }
}

#[async_trait]
impl FileSink for MemorySink {
    async fn emit(&self, name: &str, bytes: &[u8]) -> io::Result<String> {
        self.files.lock().await.push((name.to_string(), bytes.to_vec()));
        Ok(name.to_string())
    }
}

// ── Filenames ────────────────────────────────────────────────────────────────

/// Filename from a Content-Disposition header value.
///
/// `filename*=UTF-8''<percent-encoded>` takes precedence over `filename=`.
/// Plain values may be double-quoted, single-quoted or bare.
pub fn content_disposition_filename(header: &str) -> Option<String> {
    let mut plain: Option<String> = None;

    for param in header.split(';') {
        let Some((name, value)) = param.trim().split_once('=') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();

        if name == "filename*" {
            let encoded = value
                .split_once("''")
                .filter(|(charset, _)| {
                    let charset = charset.to_ascii_lowercase();
                    charset == "utf-8" || charset.is_empty()
                })
                .map(|(_, rest)| rest);
            if let Some(decoded) = encoded.map(percent_decode).filter(|d| !d.is_empty()) {
                return Some(decoded);
            }
        } else if name == "filename" {
            let unquoted = unquote(value);
            if !unquoted.is_empty() {
                plain = Some(unquoted);
            }
        }
    }

    plain
}

fn unquote(value: &str) -> String {
    let inner = if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        &value[1..value.len() - 1]
    } else {
        value
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out.trim().to_string()
}

/// RFC 5987 value decoding. Malformed escapes are kept verbatim.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                out.push(h << 4 | l);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Last path segment of the image URL with any query string dropped.
pub fn filename_from_url(image_url: &str) -> Option<String> {
    let segment = match Url::parse(image_url) {
        Ok(parsed) => parsed.path_segments()?.last()?.to_string(),
        Err(_) => image_url
            .rsplit('/')
            .next()?
            .split(['?', '#'])
            .next()?
            .to_string(),
    };
    if segment.is_empty() || segment == "." || segment == ".." {
        None
    } else {
        Some(segment)
    }
}

/// Name used when neither the header nor the URL offer one. `index` is 0-based.
pub fn fallback_filename(index: usize) -> String {
    format!("image_{}.jpg", index + 1)
}

fn url_or_fallback_name(image_url: &str, index: usize) -> String {
    filename_from_url(image_url).unwrap_or_else(|| fallback_filename(index))
}

/// Replace path separators and control characters, trim dots and spaces,
/// and cap the length at `NAME_MAX` bytes.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c == '\0' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');

    let mut take = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}

// ── Downloader ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Fetched through the image service.
    Proxied { file: String },
    /// Image service failed; fetched from the image host directly.
    Direct { file: String },
    /// An image was fetched but the sink refused to store it.
    NotSaved { file: String },
    Failed,
}

impl DownloadOutcome {
    pub fn file(&self) -> Option<&str> {
        match self {
            DownloadOutcome::Proxied { file } | DownloadOutcome::Direct { file } => Some(file),
            DownloadOutcome::NotSaved { .. } | DownloadOutcome::Failed => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum TierError {
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("{0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid image URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Proxy,
    Direct,
}

/// A fetched image that has not been stored yet.
struct Fetched {
    tier: Tier,
    name: String,
    bytes: Vec<u8>,
}

/// Fetches images through the image service, falling back to the image host.
#[derive(Clone)]
pub struct ImageDownloader {
    http: reqwest::Client,
    service: Url,
    bulk: BulkPolicy,
    notifier: Arc<dyn Notifier>,
}

impl ImageDownloader {
    pub fn new(
        http: reqwest::Client,
        service: Url,
        bulk: BulkPolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            http,
            service,
            bulk,
            notifier,
        }
    }

    /// Run the proxy → direct chain for one image. Failures end in a toast,
    /// never in an error.
    pub async fn download_image(
        &self,
        sink: &dyn FileSink,
        image_url: &str,
        index: usize,
    ) -> DownloadOutcome {
        self.notifier.notify(Toast::info("Downloading image..."));

        let fetched = match self.via_proxy(image_url, index).await {
            Ok(fetched) => fetched,
            Err(proxy_err) => {
                tracing::warn!(
                    "image service failed for {} ({}), fetching directly",
                    image_url,
                    proxy_err
                );
                match self.direct(image_url, index).await {
                    Ok(fetched) => fetched,
                    Err(e) => {
                        tracing::warn!("direct fetch failed for {}: {}", image_url, e);
                        self.notifier.notify(Toast::error(
                            format!(
                                "Download failed\n\n\
                                 Check that the image service is running at {}\n\n\
                                 or open the image directly:\n{}",
                                self.service, image_url
                            ),
                            FALLBACK_TOAST,
                        ));
                        return DownloadOutcome::Failed;
                    }
                }
            }
        };

        let file = match sink.emit(&fetched.name, &fetched.bytes).await {
            Ok(file) => file,
            Err(e) => {
                tracing::error!("could not save {} from {}: {}", fetched.name, image_url, e);
                self.notifier.notify(Toast::error(
                    format!("Could not save {}\n\n{}", fetched.name, e),
                    FALLBACK_TOAST,
                ));
                return DownloadOutcome::NotSaved { file: fetched.name };
            }
        };

        match fetched.tier {
            Tier::Proxy => {
                tracing::info!("downloaded {} via image service as {}", image_url, file);
                self.notifier.notify(Toast::success(
                    format!("Download complete!\n{}", file),
                    SUCCESS_TOAST,
                ));
                DownloadOutcome::Proxied { file }
            }
            Tier::Direct => {
                tracing::info!("downloaded {} directly as {}", image_url, file);
                self.notifier.notify(Toast::warning(
                    "Image service unavailable\n\
                     Downloaded directly instead\n\n\
                     Start the image service to get around cross-origin restrictions",
                    FALLBACK_TOAST,
                ));
                DownloadOutcome::Direct { file }
            }
        }
    }

    /// Download every image, starting image `i` after `stagger * i`.
    ///
    /// Outcomes come back in input order for logging; nothing aggregates them
    /// into a report.
    pub async fn download_all(
        &self,
        sink: Arc<dyn FileSink>,
        images: &[String],
    ) -> Vec<DownloadOutcome> {
        if images.is_empty() {
            self.notifier
                .notify(Toast::warning("No images to download", SUCCESS_TOAST));
            return Vec::new();
        }
        self.notifier.notify(Toast::info(format!(
            "Downloading {} images...",
            images.len()
        )));

        let mut tasks = JoinSet::new();
        for (index, image_url) in images.iter().enumerate() {
            let this = self.clone();
            let sink = Arc::clone(&sink);
            let image_url = image_url.clone();
            let delay = self.bulk.delay_for(index);
            tasks.spawn(async move {
                tokio::time::sleep(delay).await;
                let outcome = this.download_image(sink.as_ref(), &image_url, index).await;
                (index, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(images.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(pair) => outcomes.push(pair),
                Err(e) => tracing::warn!("bulk download task ended abnormally: {}", e),
            }
        }
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    async fn via_proxy(&self, image_url: &str, index: usize) -> Result<Fetched, TierError> {
        let response = self
            .http
            .post(self.service.clone())
            .json(&UrlPayload { url: image_url })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TierError::Status(response.status()));
        }

        let name = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(content_disposition_filename)
            .unwrap_or_else(|| url_or_fallback_name(image_url, index));
        let bytes = response.bytes().await?.to_vec();
        Ok(Fetched {
            tier: Tier::Proxy,
            name,
            bytes,
        })
    }

    async fn direct(&self, image_url: &str, index: usize) -> Result<Fetched, TierError> {
        let target = Url::parse(image_url)?;
        let response = self.http.get(target).send().await?;
        if !response.status().is_success() {
            return Err(TierError::Status(response.status()));
        }
        let bytes = response.bytes().await?.to_vec();
        Ok(Fetched {
            tier: Tier::Direct,
            name: url_or_fallback_name(image_url, index),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use crate::notify::ToastKind;
    use crate::test_support::{spawn, Recorded};
    use axum::{
        http::{header, StatusCode},
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::Value;

    fn downloader(service: Url, notifier: &RecordingNotifier) -> ImageDownloader {
        ImageDownloader::new(
            reqwest::Client::new(),
            service,
            BulkPolicy {
                stagger: Duration::from_millis(20),
            },
            Arc::new(notifier.clone()),
        )
    }

    async fn image_host() -> Url {
        let app = Router::new()
            .route("/img/cat.png", get(|| async { b"cat-bytes".to_vec() }))
            .route("/img/dog.png", get(|| async { b"dog-bytes".to_vec() }))
            .route("/img/", get(|| async { b"index-bytes".to_vec() }))
            .route("/img/gone.png", get(|| async { StatusCode::NOT_FOUND }));
        spawn(app).await
    }

    async fn failing_service() -> Url {
        let app = Router::new().route("/dl", post(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        spawn(app).await.join("/dl").unwrap()
    }

    #[test]
    fn content_disposition_variants() {
        assert_eq!(
            content_disposition_filename("attachment; filename=\"shoe.jpg\"").as_deref(),
            Some("shoe.jpg")
        );
        assert_eq!(
            content_disposition_filename("attachment; filename=shoe.jpg; size=10").as_deref(),
            Some("shoe.jpg")
        );
        assert_eq!(
            content_disposition_filename("attachment; filename='shoe.jpg'").as_deref(),
            Some("shoe.jpg")
        );
        assert_eq!(content_disposition_filename("attachment"), None);
        assert_eq!(content_disposition_filename("attachment; filename=\"\""), None);
    }

    #[test]
    fn extended_filename_wins_over_plain() {
        assert_eq!(
            content_disposition_filename("attachment; filename*=UTF-8''caf%C3%A9.jpg").as_deref(),
            Some("café.jpg")
        );
        assert_eq!(
            content_disposition_filename(
                "attachment; filename=\"fallback.jpg\"; filename*=utf-8''real%20name.png"
            )
            .as_deref(),
            Some("real name.png")
        );
        assert_eq!(
            content_disposition_filename("attachment; filename*=''plain.gif").as_deref(),
            Some("plain.gif")
        );
        // Unsupported charsets defer to the plain parameter.
        assert_eq!(
            content_disposition_filename(
                "attachment; filename*=ISO-8859-1''caf%E9.jpg; filename=\"cafe.jpg\""
            )
            .as_deref(),
            Some("cafe.jpg")
        );
        assert_eq!(
            content_disposition_filename("attachment; filename=\"a \\\"b\\\".jpg\"").as_deref(),
            Some("a \"b\".jpg")
        );
    }

    #[test]
    fn percent_decode_keeps_malformed_escapes() {
        assert_eq!(percent_decode("100%25"), "100%");
        assert_eq!(percent_decode("a%zzb"), "a%zzb");
        assert_eq!(percent_decode("trail%2"), "trail%2");
    }

    #[test]
    fn url_filenames() {
        assert_eq!(
            filename_from_url("https://cdn.example/p/1/photo.webp?w=800").as_deref(),
            Some("photo.webp")
        );
        assert_eq!(filename_from_url("https://cdn.example/p/1/"), None);
        assert_eq!(filename_from_url("https://cdn.example"), None);
        assert_eq!(filename_from_url("relative/pic.png?x=1").as_deref(), Some("pic.png"));
        assert_eq!(url_or_fallback_name("https://cdn.example/", 4), "image_5.jpg");
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_filename("../etc/passwd"), "_etc_passwd");
        assert_eq!(sanitize_filename("  a\\b\n.jpg "), "a_b_.jpg");
        assert_eq!(sanitize_filename(&"x".repeat(300)).len(), NAME_MAX);
    }

    #[test]
    fn numbered_names() {
        assert_eq!(numbered("a.jpg", 0), "a.jpg");
        assert_eq!(numbered("a.jpg", 2), "a (2).jpg");
        assert_eq!(numbered("noext", 1), "noext (1)");
        assert_eq!(numbered(".hidden", 1), ".hidden (1)");
    }

    #[tokio::test]
    async fn dir_sink_avoids_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirSink::new(dir.path());

        assert_eq!(sink.emit("a.jpg", b"one").await.unwrap(), "a.jpg");
        assert_eq!(sink.emit("a.jpg", b"two").await.unwrap(), "a (1).jpg");
        assert_eq!(sink.emit("sub/b.jpg", b"three").await.unwrap(), "sub_b.jpg");

        assert_eq!(std::fs::read(dir.path().join("a.jpg")).unwrap(), b"one");
        assert_eq!(std::fs::read(dir.path().join("a (1).jpg")).unwrap(), b"two");
    }

    #[tokio::test]
    async fn proxy_success_uses_content_disposition() {
        let recorded = Recorded::default();
        let seen = recorded.clone();
        let app = Router::new().route(
            "/dl",
            post(move |Json(body): Json<Value>| {
                let seen = seen.clone();
                async move {
                    seen.push(body);
                    (
                        [(header::CONTENT_DISPOSITION, "attachment; filename=\"proxied.png\"")],
                        b"proxied-bytes".to_vec(),
                    )
                        .into_response()
                }
            }),
        );
        let service = spawn(app).await.join("/dl").unwrap();
        let notifier = RecordingNotifier::default();
        let sink = MemorySink::new();

        let outcome = downloader(service, &notifier)
            .download_image(&sink, "https://cdn.example/x/cat.png", 0)
            .await;

        assert_eq!(outcome, DownloadOutcome::Proxied { file: "proxied.png".into() });
        assert_eq!(sink.files().await, vec![("proxied.png".to_string(), b"proxied-bytes".to_vec())]);
        assert_eq!(
            recorded.bodies(),
            vec![serde_json::json!({"url": "https://cdn.example/x/cat.png"})]
        );
        assert_eq!(notifier.kinds(), vec![ToastKind::Info, ToastKind::Success]);
    }

    #[tokio::test]
    async fn proxy_success_without_header_names_from_url() {
        let app = Router::new().route("/dl", post(|| async { b"bytes".to_vec() }));
        let service = spawn(app).await.join("/dl").unwrap();
        let notifier = RecordingNotifier::default();
        let sink = MemorySink::new();
        let d = downloader(service, &notifier);

        let named = d.download_image(&sink, "https://cdn.example/x/shoe.jpg?v=2", 0).await;
        assert_eq!(named.file(), Some("shoe.jpg"));

        let synthesized = d.download_image(&sink, "https://cdn.example/x/", 2).await;
        assert_eq!(synthesized.file(), Some("image_3.jpg"));
    }

    #[tokio::test]
    async fn proxy_with_only_extended_filename() {
        let app = Router::new().route(
            "/dl",
            post(|| async {
                (
                    [(header::CONTENT_DISPOSITION, "attachment; filename*=UTF-8''%E5%95%86%E5%93%81.webp")],
                    b"bytes".to_vec(),
                )
                    .into_response()
            }),
        );
        let service = spawn(app).await.join("/dl").unwrap();
        let notifier = RecordingNotifier::default();
        let sink = MemorySink::new();

        let outcome = downloader(service, &notifier)
            .download_image(&sink, "https://cdn.example/x/ignored.jpg", 0)
            .await;
        assert_eq!(outcome, DownloadOutcome::Proxied { file: "商品.webp".into() });
    }

    struct FailingSink;

    #[async_trait]
    impl FileSink for FailingSink {
        async fn emit(&self, _name: &str, _bytes: &[u8]) -> io::Result<String> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only folder"))
        }
    }

    #[tokio::test]
    async fn store_failure_does_not_retry_or_blame_the_service() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let proxy_hits = Arc::new(AtomicUsize::new(0));
        let direct_hits = Arc::new(AtomicUsize::new(0));
        let (p, d) = (proxy_hits.clone(), direct_hits.clone());
        let service = spawn(Router::new().route(
            "/dl",
            post(move || {
                p.fetch_add(1, Ordering::SeqCst);
                async { b"bytes".to_vec() }
            }),
        ))
        .await
        .join("/dl")
        .unwrap();
        let host = spawn(Router::new().route(
            "/img/cat.png",
            get(move || {
                d.fetch_add(1, Ordering::SeqCst);
                async { b"cat-bytes".to_vec() }
            }),
        ))
        .await;
        let notifier = RecordingNotifier::default();

        let image = host.join("/img/cat.png").unwrap();
        let outcome = downloader(service.clone(), &notifier)
            .download_image(&FailingSink, image.as_str(), 0)
            .await;

        assert_eq!(outcome, DownloadOutcome::NotSaved { file: "cat.png".into() });
        assert_eq!(outcome.file(), None);
        assert_eq!(proxy_hits.load(Ordering::SeqCst), 1);
        assert_eq!(direct_hits.load(Ordering::SeqCst), 0);
        let toasts = notifier.toasts();
        let last = toasts.last().unwrap();
        assert_eq!(last.kind, ToastKind::Error);
        assert!(last.message.contains("read-only folder"));
        assert!(!last.message.contains(service.as_str()));
    }

    #[tokio::test]
    async fn proxy_failure_falls_back_to_direct_fetch() {
        let host = image_host().await;
        let notifier = RecordingNotifier::default();
        let sink = MemorySink::new();

        let image = host.join("/img/cat.png").unwrap();
        let outcome = downloader(failing_service().await, &notifier)
            .download_image(&sink, image.as_str(), 0)
            .await;

        assert_eq!(outcome, DownloadOutcome::Direct { file: "cat.png".into() });
        assert_eq!(sink.files().await, vec![("cat.png".to_string(), b"cat-bytes".to_vec())]);
        assert_eq!(notifier.kinds(), vec![ToastKind::Info, ToastKind::Warning]);
    }

    #[tokio::test]
    async fn direct_fetch_without_segment_uses_index_name() {
        let host = image_host().await;
        let notifier = RecordingNotifier::default();
        let sink = MemorySink::new();

        let image = host.join("/img/").unwrap();
        let outcome = downloader(failing_service().await, &notifier)
            .download_image(&sink, image.as_str(), 6)
            .await;
        assert_eq!(outcome, DownloadOutcome::Direct { file: "image_7.jpg".into() });
    }

    #[tokio::test]
    async fn both_tiers_failing_ends_in_error_toast() {
        let host = image_host().await;
        let notifier = RecordingNotifier::default();
        let sink = MemorySink::new();

        let image = host.join("/img/gone.png").unwrap();
        let outcome = downloader(failing_service().await, &notifier)
            .download_image(&sink, image.as_str(), 0)
            .await;

        assert_eq!(outcome, DownloadOutcome::Failed);
        assert!(sink.files().await.is_empty());
        let toasts = notifier.toasts();
        let last = toasts.last().unwrap();
        assert_eq!(last.kind, ToastKind::Error);
        assert!(last.message.contains(image.as_str()));
    }

    #[tokio::test]
    async fn unparseable_image_url_fails_cleanly() {
        let notifier = RecordingNotifier::default();
        let sink = MemorySink::new();
        let outcome = downloader(failing_service().await, &notifier)
            .download_image(&sink, "not a url", 0)
            .await;
        assert_eq!(outcome, DownloadOutcome::Failed);
    }

    #[tokio::test]
    async fn bulk_download_keeps_going_after_failures() {
        let host = image_host().await;
        let notifier = RecordingNotifier::default();
        let sink = Arc::new(MemorySink::new());

        let images = vec![
            host.join("/img/cat.png").unwrap().to_string(),
            host.join("/img/gone.png").unwrap().to_string(),
            host.join("/img/dog.png").unwrap().to_string(),
        ];
        let started = tokio::time::Instant::now();
        let outcomes = downloader(failing_service().await, &notifier)
            .download_all(sink.clone(), &images)
            .await;

        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(
            outcomes,
            vec![
                DownloadOutcome::Direct { file: "cat.png".into() },
                DownloadOutcome::Failed,
                DownloadOutcome::Direct { file: "dog.png".into() },
            ]
        );
        let mut names: Vec<String> = sink.files().await.into_iter().map(|(n, _)| n).collect();
        names.sort();
        assert_eq!(names, vec!["cat.png", "dog.png"]);
        assert_eq!(notifier.kinds()[0], ToastKind::Info);
    }

    #[tokio::test]
    async fn bulk_download_of_nothing_warns() {
        let notifier = RecordingNotifier::default();
        let outcomes = downloader(failing_service().await, &notifier)
            .download_all(Arc::new(MemorySink::new()), &[])
            .await;
        assert!(outcomes.is_empty());
        assert_eq!(notifier.kinds(), vec![ToastKind::Warning]);
    }
}
