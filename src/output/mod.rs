pub mod report;

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::completion::Usage;
use crate::render;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Markdown,
    Html,
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "markdown" | "md" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".md") || lower.ends_with(".markdown") {
        return Some(OutputFormat::Markdown);
    }
    if lower.ends_with(".html") || lower.ends_with(".htm") {
        return Some(OutputFormat::Html);
    }
    if lower.ends_with(".json") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".txt") {
        return Some(OutputFormat::Text);
    }
    None
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to create temporary file in '{dir}': {source}")]
    CreateTemp {
        dir: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write report: {source}")]
    Write {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to save report to '{path}': {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open '{path}' for printing: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything an exported report carries besides the generated text.
#[derive(Clone, Debug, Serialize)]
pub struct ReportRecord {
    pub title: String,
    pub model: String,
    pub instructions: String,
    pub sheets: Vec<String>,
    pub content: String,
    pub usage: Option<Usage>,
    pub generated_at: String,
}

impl ReportRecord {
    /// Builds a record from a finished stream buffer. An outer code fence
    /// around the whole answer is removed.
    pub fn new(
        title: &str,
        model: &str,
        instructions: &str,
        sheets: Vec<String>,
        buffer: &str,
        usage: Option<Usage>,
    ) -> Self {
        Self {
            title: title.to_string(),
            model: model.to_string(),
            instructions: instructions.to_string(),
            sheets,
            content: render::unwrap_outer_fence(buffer).to_string(),
            usage,
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

pub fn render_markdown(record: &ReportRecord) -> Vec<u8> {
    let mut out = record.content.clone();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.into_bytes()
}

pub fn render_text(record: &ReportRecord) -> Vec<u8> {
    let mut out = render::markdown_to_text(&record.content);
    out.push('\n');
    out.into_bytes()
}

pub fn render_json(record: &ReportRecord) -> Vec<u8> {
    serde_json::to_vec_pretty(record).unwrap_or_else(|_| b"{}\n".to_vec())
}

pub fn render_html(record: &ReportRecord) -> Vec<u8> {
    report::render_html(record)
}

pub fn render_report(format: OutputFormat, record: &ReportRecord) -> Vec<u8> {
    match format {
        OutputFormat::Markdown => render_markdown(record),
        OutputFormat::Html => render_html(record),
        OutputFormat::Text => render_text(record),
        OutputFormat::Json => render_json(record),
    }
}

pub fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Writes `bytes` to `path` through a temporary file in the same directory.
/// The destination is replaced only once the data is complete; on any failure
/// the temporary file is removed when it drops.
pub fn write_report(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    let mut tmp =
        tempfile::NamedTempFile::new_in(&dir).map_err(|source| ExportError::CreateTemp {
            dir: dir.display().to_string(),
            source,
        })?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .map_err(|source| ExportError::Write { source })?;
    tmp.persist(path).map_err(|e| ExportError::Persist {
        path: path.display().to_string(),
        source: e.error,
    })?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "report written");
    Ok(())
}

/// Hands the exported file to the system viewer, where it can be printed or
/// saved as PDF.
pub fn open_for_print(path: &Path) -> Result<(), ExportError> {
    open::that(path).map_err(|source| ExportError::Open {
        path: path.display().to_string(),
        source,
    })
}
