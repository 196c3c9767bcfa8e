use std::path::PathBuf;

use super::WorkbookError;
use crate::config;

/// Where workbook bytes come from: a local file or a downloadable URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkbookSource {
    Path(PathBuf),
    Url(String),
}

impl WorkbookSource {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if is_remote(value) {
            Self::Url(value.to_string())
        } else {
            Self::Path(config::expand_tilde(value))
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Path(p) => p.display().to_string(),
            Self::Url(u) => u.clone(),
        }
    }

    /// Reads the whole source into memory.
    pub async fn load_bytes(&self, client: &reqwest::Client) -> Result<Vec<u8>, WorkbookError> {
        match self {
            Self::Path(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| WorkbookError::SourceRead {
                        path: path.display().to_string(),
                        source,
                    })
            }
            Self::Url(url) => {
                let response = client.get(url).send().await.map_err(|source| {
                    WorkbookError::SourceFetch {
                        url: url.clone(),
                        source,
                    }
                })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(WorkbookError::SourceStatus {
                        url: url.clone(),
                        status: status.as_u16(),
                    });
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|source| WorkbookError::SourceFetch {
                        url: url.clone(),
                        source,
                    })?;
                tracing::debug!(url = %url, bytes = bytes.len(), "downloaded workbook");
                Ok(bytes.to_vec())
            }
        }
    }
}

pub fn is_remote(value: &str) -> bool {
    let lower = value.trim().to_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
