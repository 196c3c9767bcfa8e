use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::completion::{self, ChatRequest, CompletionClient, CompletionError};
use crate::flatten::{self, ColumnAlignment};
use crate::stream::{Completion, RenderSink, ReportSession, StreamError, StreamOutcome};
use crate::workbook::{self, WorkbookError, WorkbookSource};

#[derive(Clone, Debug)]
pub enum InputSource {
    Workbook(WorkbookSource),
    Bytes(Vec<u8>),
}

#[derive(Clone, Debug)]
pub struct Options {
    pub source: Option<InputSource>,
    pub base_url: String,
    pub model: String,
    pub token: Option<String>,
    pub app_tag: Option<String>,
    pub instructions: String,
    pub alignment: ColumnAlignment,
    pub timeout_seconds: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            source: None,
            base_url: completion::DEFAULT_BASE_URL.to_string(),
            model: completion::DEFAULT_MODEL.to_string(),
            token: None,
            app_tag: None,
            instructions: String::new(),
            alignment: ColumnAlignment::default(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no workbook provided")]
    NoSource,

    #[error("model name is empty")]
    EmptyModel,

    #[error("invalid timeout {value}, expected positive integer")]
    InvalidTimeout { value: u64 },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("error loading or parsing workbook: {source}")]
    Workbook {
        #[from]
        source: WorkbookError,
    },

    #[error("completion request failed: {source}")]
    Completion {
        #[from]
        source: CompletionError,
    },

    #[error("{source}")]
    Stream {
        #[from]
        source: StreamError,
    },

    #[error("task join failed: {source}")]
    TaskJoin {
        #[source]
        source: tokio::task::JoinError,
    },
}

/// The workbook after extraction and flattening, ready to be sent.
#[derive(Clone, Debug)]
pub struct PreparedReport {
    pub sheets: Vec<String>,
    pub non_empty_sheets: usize,
    pub rows: usize,
    pub payload: String,
}

#[derive(Clone, Debug)]
pub struct ReportResult {
    pub generation: u64,
    pub outcome: StreamOutcome,
    pub content: String,
}

impl ReportResult {
    pub fn is_finished(&self) -> bool {
        self.outcome.completion == Completion::Finished
    }
}

#[derive(Clone, Debug)]
pub struct Runner {
    options: Options,
    http: reqwest::Client,
}

impl Runner {
    pub fn new(options: Options) -> Result<Self, RunnerError> {
        if options.source.is_none() {
            return Err(RunnerError::NoSource);
        }
        if options.model.trim().is_empty() {
            return Err(RunnerError::EmptyModel);
        }
        if options.timeout_seconds == 0 {
            return Err(RunnerError::InvalidTimeout {
                value: options.timeout_seconds,
            });
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|source| RunnerError::HttpClientBuild { source })?;
        Ok(Self { options, http })
    }

    /// Loads, decodes and flattens the workbook.
    pub async fn prepare(&self) -> Result<PreparedReport, RunnerError> {
        let bytes = match self.options.source.as_ref() {
            Some(InputSource::Workbook(src)) => src.load_bytes(&self.http).await?,
            Some(InputSource::Bytes(bytes)) => bytes.clone(),
            None => return Err(RunnerError::NoSource),
        };
        let alignment = self.options.alignment;
        tokio::task::spawn_blocking(move || -> Result<PreparedReport, WorkbookError> {
            let book = workbook::decode_workbook(bytes)?;
            let payload = flatten::flatten_workbook(&book, alignment);
            Ok(PreparedReport {
                sheets: book.sheet_names().iter().map(|s| s.to_string()).collect(),
                non_empty_sheets: book.sheets.iter().filter(|s| !s.is_empty()).count(),
                rows: book.row_count(),
                payload,
            })
        })
        .await
        .map_err(|source| RunnerError::TaskJoin { source })?
        .map_err(RunnerError::from)
    }

    pub fn request(&self, prepared: &PreparedReport) -> ChatRequest {
        ChatRequest::report(
            &self.options.model,
            &self.options.instructions,
            &prepared.payload,
        )
    }

    /// Sends the prepared payload and streams the answer into `session`,
    /// rendering through `sink`. `cancel` may fire while the request is
    /// pending or while it streams.
    pub async fn generate<R, C>(
        &self,
        prepared: &PreparedReport,
        session: &mut ReportSession,
        sink: &mut R,
        cancel: C,
    ) -> Result<ReportResult, RunnerError>
    where
        R: RenderSink + ?Sized,
        C: Future<Output = ()>,
    {
        futures::pin_mut!(cancel);
        let generation = session.begin();

        let client = match CompletionClient::new(
            &self.options.base_url,
            self.options.token.as_deref().unwrap_or_default(),
            self.options.app_tag.as_deref(),
            Duration::from_secs(self.options.timeout_seconds),
        ) {
            Ok(client) => client,
            Err(e) => {
                session.fail();
                return Err(e.into());
            }
        };
        let request = self.request(prepared);

        let opened = tokio::select! {
            biased;
            _ = &mut cancel => None,
            opened = client.open_stream(&request) => Some(opened),
        };
        let events = match opened {
            None => {
                session.cancel();
                return Ok(ReportResult {
                    generation,
                    outcome: StreamOutcome {
                        completion: Completion::Cancelled,
                        fragments: 0,
                        usage: None,
                    },
                    content: String::new(),
                });
            }
            Some(Ok(events)) => events,
            Some(Err(e)) => {
                session.fail();
                return Err(e.into());
            }
        };

        let outcome = session.consume(events, sink, &mut cancel).await?;
        Ok(ReportResult {
            generation,
            outcome,
            content: session.buffer().to_string(),
        })
    }

    pub async fn run<R, C>(
        &self,
        session: &mut ReportSession,
        sink: &mut R,
        cancel: C,
    ) -> Result<(PreparedReport, ReportResult), RunnerError>
    where
        R: RenderSink + ?Sized,
        C: Future<Output = ()>,
    {
        let prepared = self.prepare().await?;
        let result = self.generate(&prepared, session, sink, cancel).await?;
        Ok((prepared, result))
    }
}

/// Joins the base instructions (demo prompt or config) with the user's extra
/// instructions on a new line.
pub fn compose_instructions(base: &str, extra: Option<&str>) -> String {
    let extra = extra.map(str::trim).filter(|e| !e.is_empty());
    match extra {
        Some(extra) if base.is_empty() => extra.to_string(),
        Some(extra) => format!("{base}\n{extra}"),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ConsumerState, RenderError};

    #[test]
    fn new_rejects_missing_source_and_bad_values() {
        assert!(matches!(
            Runner::new(Options::default()),
            Err(RunnerError::NoSource)
        ));
        let with_source = Options {
            source: Some(InputSource::Bytes(Vec::new())),
            ..Options::default()
        };
        assert!(matches!(
            Runner::new(Options {
                model: " ".to_string(),
                ..with_source.clone()
            }),
            Err(RunnerError::EmptyModel)
        ));
        assert!(matches!(
            Runner::new(Options {
                timeout_seconds: 0,
                ..with_source
            }),
            Err(RunnerError::InvalidTimeout { value: 0 })
        ));
    }

    #[test]
    fn compose_instructions_appends_user_text() {
        assert_eq!(compose_instructions("Base", Some("extra")), "Base\nextra");
        assert_eq!(compose_instructions("Base", Some("  ")), "Base");
        assert_eq!(compose_instructions("", Some("only")), "only");
        assert_eq!(compose_instructions("Base", None), "Base");
    }

    #[tokio::test]
    async fn prepare_surfaces_decode_failures() {
        let runner = Runner::new(Options {
            source: Some(InputSource::Bytes(b"not a workbook".to_vec())),
            ..Options::default()
        })
        .unwrap();
        let err = runner.prepare().await.unwrap_err();
        assert!(matches!(err, RunnerError::Workbook { .. }));
        assert!(err.to_string().starts_with("error loading or parsing workbook"));
    }

    #[tokio::test]
    async fn cancel_before_acceptance_leaves_session_cancelled() {
        let runner = Runner::new(Options {
            source: Some(InputSource::Bytes(Vec::new())),
            base_url: "http://127.0.0.1:9/v1".to_string(),
            ..Options::default()
        })
        .unwrap();
        let prepared = PreparedReport {
            sheets: vec![],
            non_empty_sheets: 0,
            rows: 0,
            payload: String::new(),
        };
        let mut session = ReportSession::new();
        let mut sink = |_: &str| -> Result<(), RenderError> { Ok(()) };
        let result = runner
            .generate(&prepared, &mut session, &mut sink, std::future::ready(()))
            .await
            .unwrap();
        assert!(!result.is_finished());
        assert_eq!(session.state(), ConsumerState::Cancelled);
    }
}
