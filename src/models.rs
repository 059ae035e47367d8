use serde::{Deserialize, Serialize};

use crate::submission::SubmissionId;

/// Body sent to both the webhook and the image service.
#[derive(Debug, Serialize)]
pub struct UrlPayload<'a> {
    pub url: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageDownloadRequest {
    pub url: String,
    #[serde(default)]
    pub index: usize,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct GalleryItem {
    pub index: usize,
    pub url: String,
    pub alt: String,
    pub appear_delay_ms: u64,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ProductView {
    pub submission: SubmissionId,
    pub source_url: String,
    pub has_content: bool,
    pub preview_html: String,
    pub image_count: usize,
    pub gallery: Vec<GalleryItem>,
}
