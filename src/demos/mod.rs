use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;
use crate::workbook::source::is_remote;
use crate::workbook::WorkbookSource;

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("failed to read demo config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch demo config '{url}': {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("demo config '{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to parse demo config '{location}': {source}")]
    Parse {
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DemoDescriptor {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub src: String,
    #[serde(default)]
    pub prompt: String,
}

/// The demo catalogue plus the location it was loaded from, which relative
/// `src` entries resolve against.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DemoCatalog {
    pub location: String,
    pub demos: Vec<DemoDescriptor>,
}

#[derive(Debug, Default, Deserialize)]
struct DemoConfigFile {
    #[serde(default)]
    demos: Vec<DemoDescriptor>,
}

impl DemoCatalog {
    pub fn parse(location: &str, contents: &str) -> Result<Self, DemoError> {
        let file: DemoConfigFile =
            serde_json::from_str(contents).map_err(|source| DemoError::Parse {
                location: location.to_string(),
                source,
            })?;
        Ok(Self {
            location: location.to_string(),
            demos: file.demos,
        })
    }

    pub async fn load(client: &reqwest::Client, location: &str) -> Result<Self, DemoError> {
        let contents = if is_remote(location) {
            let response =
                client
                    .get(location)
                    .send()
                    .await
                    .map_err(|source| DemoError::Fetch {
                        url: location.to_string(),
                        source,
                    })?;
            let status = response.status();
            if !status.is_success() {
                return Err(DemoError::Status {
                    url: location.to_string(),
                    status: status.as_u16(),
                });
            }
            response.text().await.map_err(|source| DemoError::Fetch {
                url: location.to_string(),
                source,
            })?
        } else {
            let path = config::expand_tilde(location);
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| DemoError::Read {
                    path: path.display().to_string(),
                    source,
                })?
        };
        Self::parse(location, &contents)
    }

    /// Looks a demo up by zero-based index or by title (case-insensitive).
    pub fn select(&self, key: &str) -> Option<(usize, &DemoDescriptor)> {
        let key = key.trim();
        if let Ok(index) = key.parse::<usize>() {
            return self.demos.get(index).map(|d| (index, d));
        }
        self.demos
            .iter()
            .enumerate()
            .find(|(_, d)| d.title.trim().eq_ignore_ascii_case(key))
    }

    /// Resolves a demo's `src` the way a page resolves a relative link.
    pub fn source_for(&self, demo: &DemoDescriptor) -> WorkbookSource {
        WorkbookSource::parse(&resolve_relative(&self.location, &demo.src))
    }
}

pub fn resolve_relative(base: &str, src: &str) -> String {
    let src = src.trim();
    if is_remote(src) {
        return src.to_string();
    }
    if is_remote(base) {
        return match reqwest::Url::parse(base).and_then(|b| b.join(src)) {
            Ok(url) => url.to_string(),
            Err(_) => src.to_string(),
        };
    }
    let src_path = config::expand_tilde(src);
    if src_path.is_absolute() {
        return src_path.to_string_lossy().to_string();
    }
    match config::expand_tilde(base).parent() {
        Some(dir) if dir != Path::new("") => dir.join(src_path).to_string_lossy().to_string(),
        _ => src_path.to_string_lossy().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const CONFIG: &str = r#"{
      "demos": [
        { "title": "Clinical Quality", "description": "Trial sites", "src": "data/clinical.xlsx", "prompt": "Write a quality report." },
        { "title": "Sales", "description": "Regional sales", "src": "https://cdn.example.com/sales.xlsx", "prompt": "Summarize sales." }
      ]
    }"#;

    #[test]
    fn select_by_index_or_title() {
        let catalog = DemoCatalog::parse("demos/config.json", CONFIG).unwrap();
        assert_eq!(catalog.select("1").map(|(i, d)| (i, d.title.as_str())), Some((1, "Sales")));
        assert_eq!(
            catalog.select("clinical quality").map(|(i, _)| i),
            Some(0)
        );
        assert!(catalog.select("7").is_none());
        assert!(catalog.select("Unknown").is_none());
    }

    #[test]
    fn sources_resolve_against_config_location() {
        let catalog = DemoCatalog::parse("demos/config.json", CONFIG).unwrap();
        assert_eq!(
            catalog.source_for(&catalog.demos[0]),
            WorkbookSource::Path(PathBuf::from("demos/data/clinical.xlsx"))
        );
        assert_eq!(
            catalog.source_for(&catalog.demos[1]),
            WorkbookSource::Url("https://cdn.example.com/sales.xlsx".to_string())
        );
    }

    #[test]
    fn relative_src_joins_remote_base() {
        assert_eq!(
            resolve_relative("https://example.com/app/config.json", "data/x.xlsx"),
            "https://example.com/app/data/x.xlsx"
        );
        assert_eq!(resolve_relative("config.json", "x.xlsx"), "x.xlsx");
    }

    #[test]
    fn missing_demos_key_is_an_empty_catalog() {
        let catalog = DemoCatalog::parse("c.json", "{}").unwrap();
        assert!(catalog.demos.is_empty());
        assert!(matches!(
            DemoCatalog::parse("c.json", "[1,2"),
            Err(DemoError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn load_reads_remote_config() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/config.json")
            .with_status(200)
            .with_body(CONFIG)
            .create_async()
            .await;
        let client = reqwest::Client::new();
        let url = format!("{}/config.json", server.url());
        let catalog = DemoCatalog::load(&client, &url).await.unwrap();
        assert_eq!(catalog.demos.len(), 2);
        assert_eq!(
            catalog.source_for(&catalog.demos[0]),
            WorkbookSource::Url(format!("{}/data/clinical.xlsx", server.url()))
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn load_reports_missing_file() {
        let client = reqwest::Client::new();
        let err = DemoCatalog::load(&client, "./no/such/config.json")
            .await
            .unwrap_err();
        assert!(matches!(err, DemoError::Read { .. }));
    }
}
