use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

// ── Lazy static regexes ──────────────────────────────────────────────────────

static CODE_FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?:html)?\n?").unwrap());

// ── Content shapes ───────────────────────────────────────────────────────────

/// The content formats the webhook is known to answer with, as found in the
/// first element of its response array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentShape {
    /// LLM output: `content.parts[0].text`.
    LlmParts(String),
    /// OpenAI style: `choices[0].message.content`.
    Choices(String),
    /// Agent output: `output`.
    Output(String),
    /// Plain `text`.
    Text(String),
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    LlmParts,
    Choices,
    Output,
    Text,
}

/// Detection order. The first kind whose container is present wins, even when
/// its text field turns out to be missing.
pub const SHAPE_PRIORITY: [ShapeKind; 4] = [
    ShapeKind::LlmParts,
    ShapeKind::Choices,
    ShapeKind::Output,
    ShapeKind::Text,
];

impl ShapeKind {
    /// Presence of this value selects the shape.
    fn container(self) -> &'static str {
        match self {
            ShapeKind::LlmParts => "/content/parts/0",
            ShapeKind::Choices => "/choices/0/message",
            ShapeKind::Output => "/output",
            ShapeKind::Text => "/text",
        }
    }

    /// Where the shape keeps its text.
    fn field(self) -> &'static str {
        match self {
            ShapeKind::LlmParts => "/content/parts/0/text",
            ShapeKind::Choices => "/choices/0/message/content",
            ShapeKind::Output => "/output",
            ShapeKind::Text => "/text",
        }
    }

    fn wrap(self, text: String) -> ContentShape {
        match self {
            ShapeKind::LlmParts => ContentShape::LlmParts(text),
            ShapeKind::Choices => ContentShape::Choices(text),
            ShapeKind::Output => ContentShape::Output(text),
            ShapeKind::Text => ContentShape::Text(text),
        }
    }
}

impl ContentShape {
    pub fn decode(entry: &Value) -> ContentShape {
        let Some(kind) = SHAPE_PRIORITY
            .iter()
            .copied()
            .find(|kind| entry.pointer(kind.container()).is_some_and(is_present))
        else {
            return ContentShape::Unrecognized;
        };
        entry
            .pointer(kind.field())
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(|s| kind.wrap(s.to_string()))
            .unwrap_or(ContentShape::Unrecognized)
    }

    pub fn kind(&self) -> Option<ShapeKind> {
        match self {
            ContentShape::LlmParts(_) => Some(ShapeKind::LlmParts),
            ContentShape::Choices(_) => Some(ShapeKind::Choices),
            ContentShape::Output(_) => Some(ShapeKind::Output),
            ContentShape::Text(_) => Some(ShapeKind::Text),
            ContentShape::Unrecognized => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ContentShape::LlmParts(t)
            | ContentShape::Choices(t)
            | ContentShape::Output(t)
            | ContentShape::Text(t) => Some(t),
            ContentShape::Unrecognized => None,
        }
    }
}

/// Null, false, zero and the empty string count as absent.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// Everything usable from one webhook response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub shape: ContentShape,
    pub images: Vec<String>,
}

impl Extraction {
    pub fn from_response(data: &Value) -> Extraction {
        let shape = data
            .get(0)
            .map(ContentShape::decode)
            .unwrap_or(ContentShape::Unrecognized);
        Extraction {
            shape,
            images: images(data),
        }
    }

    /// Text exactly as the webhook returned it, fences included.
    pub fn raw(&self) -> Option<&str> {
        self.shape.text()
    }

    pub fn preview_html(&self) -> Option<String> {
        self.raw().map(strip_code_fences)
    }
}

/// Image URLs from `[1].images`, de-duplicated in first-seen order.
pub fn images(data: &Value) -> Vec<String> {
    let Some(list) = data
        .as_array()
        .and_then(|entries| entries.get(1))
        .and_then(|entry| entry.get("images"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    list.iter()
        .filter_map(Value::as_str)
        .filter(|url| seen.insert(*url))
        .map(str::to_string)
        .collect()
}

/// Drop markdown code-fence markers (```` ```html ```` or bare ```` ``` ````,
/// each with one trailing newline) wherever they occur.
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE_RE.replace_all(text, "").into_owned()
}
