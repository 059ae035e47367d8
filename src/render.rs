use std::io::Write;
use std::time::Duration;

use askama::Template;
use scraper::{ElementRef, Html};

use crate::models::{GalleryItem, ProductView};
use crate::submission::Submission;

// ── Constants ────────────────────────────────────────────────────────────────

pub const NO_PRODUCT_INFO: &str = "No product information";
pub const NO_IMAGE_DATA: &str = "No image data";
const ERROR_DISMISS: Duration = Duration::from_secs(3);
const APPEAR_STEP_MS: u64 = 50;

// ── View model ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBanner {
    pub message: String,
    pub dismiss_after: Duration,
}

impl ErrorBanner {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            dismiss_after: ERROR_DISMISS,
        }
    }
}

pub fn build_view(submission: &Submission) -> ProductView {
    let preview = submission.extraction.preview_html();
    let gallery: Vec<GalleryItem> = submission
        .extraction
        .images
        .iter()
        .enumerate()
        .map(|(index, url)| GalleryItem {
            index,
            url: url.clone(),
            alt: format!("Product image {}", index + 1),
            appear_delay_ms: index as u64 * APPEAR_STEP_MS,
        })
        .collect();

    ProductView {
        submission: submission.id,
        source_url: submission.url.to_string(),
        has_content: preview.is_some(),
        preview_html: preview.unwrap_or_else(|| format!("<p>{}</p>", NO_PRODUCT_INFO)),
        image_count: gallery.len(),
        gallery,
    }
}

// ── Surfaces ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("could not write output: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not render page: {0}")]
    Template(#[from] askama::Error),
}

pub trait RenderSurface: Send {
    fn show_loading(&mut self) -> Result<(), RenderError>;
    fn show_error(&mut self, banner: &ErrorBanner) -> Result<(), RenderError>;
    fn show_results(&mut self, view: &ProductView) -> Result<(), RenderError>;
}

/// What a [`CaptureSurface`] was last asked to show.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Shown {
    #[default]
    Idle,
    Loading,
    Error(ErrorBanner),
    Results(Box<ProductView>),
}

/// Remembers the last state instead of drawing it.
#[derive(Debug, Default)]
pub struct CaptureSurface {
    pub shown: Shown,
}

impl RenderSurface for CaptureSurface {
    fn show_loading(&mut self) -> Result<(), RenderError> {
        self.shown = Shown::Loading;
        Ok(())
    }

    fn show_error(&mut self, banner: &ErrorBanner) -> Result<(), RenderError> {
        self.shown = Shown::Error(banner.clone());
        Ok(())
    }

    fn show_results(&mut self, view: &ProductView) -> Result<(), RenderError> {
        self.shown = Shown::Results(Box::new(view.clone()));
        Ok(())
    }
}

/// Plain-text rendering of the preview plus a numbered image list.
pub struct TerminalSurface<W> {
    out: W,
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> RenderSurface for TerminalSurface<W> {
    fn show_loading(&mut self) -> Result<(), RenderError> {
        writeln!(self.out, "Fetching product information...")?;
        Ok(())
    }

    fn show_error(&mut self, banner: &ErrorBanner) -> Result<(), RenderError> {
        writeln!(self.out, "error: {}", banner.message)?;
        Ok(())
    }

    fn show_results(&mut self, view: &ProductView) -> Result<(), RenderError> {
        writeln!(self.out, "Product {} ({})", view.submission, view.source_url)?;
        writeln!(self.out)?;
        if view.has_content {
            writeln!(self.out, "{}", html_to_text(&view.preview_html))?;
        } else {
            writeln!(self.out, "{}", NO_PRODUCT_INFO)?;
        }
        writeln!(self.out)?;
        writeln!(self.out, "Images: {}", view.image_count)?;
        if view.gallery.is_empty() {
            writeln!(self.out, "  {}", NO_IMAGE_DATA)?;
        }
        for item in &view.gallery {
            writeln!(self.out, "  [{}] {}", item.index + 1, item.url)?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// Where a gallery item's Download button points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadLinks {
    /// The service route that runs the image-service → direct chain, called
    /// as `<route>?url=<image>&index=<n>`.
    Service { route: String },
    /// Files already stored next to the page, by gallery index. Images with
    /// no stored file get no Download button.
    Local(Vec<Option<String>>),
}

impl DownloadLinks {
    fn href(&self, item: &GalleryItem) -> Option<String> {
        match self {
            DownloadLinks::Service { route } => {
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("url", &item.url)
                    .append_pair("index", &item.index.to_string())
                    .finish();
                Some(format!("{}?{}", route, query))
            }
            DownloadLinks::Local(files) => files.get(item.index).cloned().flatten(),
        }
    }
}

struct PageItem {
    url: String,
    alt: String,
    delay_ms: u64,
    /// Empty when the item has no Download button.
    download_href: String,
}

#[derive(Template)]
#[template(path = "preview.html")]
struct PreviewPage<'a> {
    error: &'a str,
    has_content: bool,
    preview_html: &'a str,
    image_count: usize,
    items: Vec<PageItem>,
    no_product_info: &'a str,
    no_image_data: &'a str,
}

impl<'a> PreviewPage<'a> {
    fn empty() -> Self {
        Self {
            error: "",
            has_content: false,
            preview_html: "",
            image_count: 0,
            items: Vec::new(),
            no_product_info: NO_PRODUCT_INFO,
            no_image_data: NO_IMAGE_DATA,
        }
    }
}

/// Stand-alone HTML page: the injected preview and an image gallery with
/// Download/Open controls on each image.
#[derive(Debug)]
pub struct HtmlPageSurface {
    links: DownloadLinks,
    page: Option<String>,
}

impl HtmlPageSurface {
    pub fn new(links: DownloadLinks) -> Self {
        Self { links, page: None }
    }

    pub fn page(&self) -> Option<&str> {
        self.page.as_deref()
    }

    pub fn into_page(self) -> Option<String> {
        self.page
    }
}

impl RenderSurface for HtmlPageSurface {
    fn show_loading(&mut self) -> Result<(), RenderError> {
        self.page = None;
        Ok(())
    }

    fn show_error(&mut self, banner: &ErrorBanner) -> Result<(), RenderError> {
        let page = PreviewPage {
            error: &banner.message,
            ..PreviewPage::empty()
        };
        self.page = Some(page.render()?);
        Ok(())
    }

    fn show_results(&mut self, view: &ProductView) -> Result<(), RenderError> {
        let items = view
            .gallery
            .iter()
            .map(|item| PageItem {
                url: item.url.clone(),
                alt: item.alt.clone(),
                delay_ms: item.appear_delay_ms,
                download_href: self.links.href(item).unwrap_or_default(),
            })
            .collect();
        let page = PreviewPage {
            has_content: view.has_content,
            preview_html: &view.preview_html,
            image_count: view.image_count,
            items,
            ..PreviewPage::empty()
        };
        self.page = Some(page.render()?);
        Ok(())
    }
}

// ── HTML → text ──────────────────────────────────────────────────────────────

/// Readable text of an HTML fragment: block elements on their own lines,
/// list items bulleted, scripts and styles dropped.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();
    walk(fragment.root_element(), &mut out);

    out.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn walk(el: ElementRef<'_>, out: &mut String) {
    use scraper::node::Node;

    let name = el.value().name();
    if matches!(name, "script" | "style" | "noscript") {
        return;
    }
    let block = matches!(
        name,
        "p" | "div" | "section" | "article" | "ul" | "ol" | "li" | "table" | "tr" | "br"
            | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
    );
    if block {
        out.push('\n');
    }
    if name == "li" {
        out.push_str("- ");
    }

    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&text.text),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    walk(child_el, out);
                }
            }
            _ => {}
        }
    }

    if block {
        out.push('\n');
    } else if matches!(name, "td" | "th") {
        out.push(' ');
    }
}
