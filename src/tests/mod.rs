use std::future::pending;

use mockito::Matcher;

use crate::demos::DemoCatalog;
use crate::flatten::ColumnAlignment;
use crate::output::{self, OutputFormat, ReportRecord};
use crate::render::{HtmlPreviewSink, MultiSink, TerminalSink};
use crate::runner::{InputSource, Options, Runner, RunnerError};
use crate::stream::{Completion, ConsumerState, RenderError, ReportSession};

fn sample_workbook() -> Vec<u8> {
    let mut book = rust_xlsxwriter::Workbook::new();
    {
        let sheet = book.add_worksheet();
        sheet.set_name("Sites").unwrap();
        sheet.write_string(0, 0, "site").unwrap();
        sheet.write_string(0, 1, "enrolled").unwrap();
        sheet.write_string(0, 2, "deviations").unwrap();
        sheet.write_string(1, 0, "Boston").unwrap();
        sheet.write_number(1, 1, 40).unwrap();
        sheet.write_number(1, 2, 2).unwrap();
        sheet.write_string(2, 0, "Denver").unwrap();
        sheet.write_number(2, 2, 5).unwrap();
    }
    {
        let sheet = book.add_worksheet();
        sheet.set_name("Notes").unwrap();
    }
    {
        let sheet = book.add_worksheet();
        sheet.set_name("Staff").unwrap();
        sheet.write_string(0, 0, "name").unwrap();
        sheet.write_string(1, 0, "Ada").unwrap();
    }
    book.save_to_buffer().unwrap()
}

fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::from("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n");
    for fragment in fragments {
        let chunk = serde_json::json!({ "choices": [{ "delta": { "content": fragment } }] });
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str(
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":11,\"completion_tokens\":4,\"total_tokens\":15}}\n\n",
    );
    body.push_str("data: [DONE]\n\n");
    body
}

fn options_for(server: &mockito::ServerGuard, bytes: Vec<u8>) -> Options {
    Options {
        source: Some(InputSource::Bytes(bytes)),
        base_url: format!("{}/v1", server.url()),
        model: "gpt-4o-mini".to_string(),
        token: Some("tok".to_string()),
        app_tag: Some("reports".to_string()),
        instructions: "Write a quality report.".to_string(),
        alignment: ColumnAlignment::Header,
        timeout_seconds: 5,
    }
}

#[tokio::test]
async fn workbook_streams_into_a_report() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer tok:reports")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "gpt-4o-mini",
            "stream": true,
            "stream_options": { "include_usage": true },
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&["# Findings", "\n\nDenver", " lags."]))
        .create_async()
        .await;

    let runner = Runner::new(options_for(&server, sample_workbook())).unwrap();
    let mut session = ReportSession::new();
    let mut renders: Vec<String> = Vec::new();
    let mut sink = |buffer: &str| -> Result<(), RenderError> {
        renders.push(buffer.to_string());
        Ok(())
    };
    let (prepared, result) = runner.run(&mut session, &mut sink, pending()).await.unwrap();

    assert_eq!(prepared.sheets, vec!["Sites", "Notes", "Staff"]);
    assert_eq!(prepared.payload.matches("<DATA name=").count(), 2);
    assert!(prepared
        .payload
        .starts_with("<DATA name=\"Sites\">\nsite\tenrolled\tdeviations\nBoston\t40\t2\nDenver\t\t5\n</DATA>"));
    assert!(prepared.payload.ends_with("<DATA name=\"Staff\">\nname\nAda\n</DATA>"));

    assert!(result.is_finished());
    assert_eq!(result.content, "# Findings\n\nDenver lags.");
    assert_eq!(renders.len(), 3);
    assert_eq!(renders.last().map(String::as_str), Some("# Findings\n\nDenver lags."));
    assert_eq!(result.outcome.usage.map(|u| u.total_tokens), Some(15));
    assert_eq!(session.state(), ConsumerState::Done);
    mock.assert_async().await;
}

#[tokio::test]
async fn as_read_alignment_keeps_row_order_of_values() {
    let server = mockito::Server::new_async().await;
    let runner = Runner::new(Options {
        alignment: ColumnAlignment::AsRead,
        ..options_for(&server, sample_workbook())
    })
    .unwrap();
    let prepared = runner.prepare().await.unwrap();
    assert!(prepared.payload.contains("Denver\t5\n"));
}

#[tokio::test]
async fn resubmission_starts_from_an_empty_buffer() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(sse_body(&["same ", "report"]))
        .expect(2)
        .create_async()
        .await;

    let runner = Runner::new(options_for(&server, sample_workbook())).unwrap();
    let prepared = runner.prepare().await.unwrap();
    let mut session = ReportSession::new();
    let mut sink = |_: &str| -> Result<(), RenderError> { Ok(()) };

    let first = runner
        .generate(&prepared, &mut session, &mut sink, pending())
        .await
        .unwrap();
    let second = runner
        .generate(&prepared, &mut session, &mut sink, pending())
        .await
        .unwrap();

    assert_eq!(first.generation, 1);
    assert_eq!(second.generation, 2);
    assert_eq!(session.generation(), 2);
    assert_eq!(second.content, "same report");
    assert_eq!(session.buffer(), "same report");
    mock.assert_async().await;
}

#[tokio::test]
async fn rejected_request_fails_without_rendering() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":"unauthorized"}"#)
        .create_async()
        .await;

    let runner = Runner::new(options_for(&server, sample_workbook())).unwrap();
    let mut session = ReportSession::new();
    let mut calls = 0;
    let mut sink = |_: &str| -> Result<(), RenderError> {
        calls += 1;
        Ok(())
    };
    let err = runner
        .run(&mut session, &mut sink, pending())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::Completion { .. }));
    assert!(err.to_string().contains("authentication failed"));
    assert_eq!(calls, 0);
    assert_eq!(session.state(), ConsumerState::Failed);
    assert_eq!(session.buffer(), "");
}

#[tokio::test]
async fn broken_chunk_keeps_partial_report() {
    let mut server = mockito::Server::new_async().await;
    let body = "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\ndata: {oops\n\n";
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let runner = Runner::new(options_for(&server, sample_workbook())).unwrap();
    let mut session = ReportSession::new();
    let mut sink = |_: &str| -> Result<(), RenderError> { Ok(()) };
    let err = runner
        .run(&mut session, &mut sink, pending())
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Stream { .. }));
    assert_eq!(session.buffer(), "partial");
    assert_eq!(session.state(), ConsumerState::Failed);
}

#[tokio::test]
async fn demo_catalogue_drives_a_remote_workbook() {
    let mut server = mockito::Server::new_async().await;
    let catalogue = r#"{"demos":[{"title":"Trial Quality","description":"Sites","src":"data/trial.xlsx","prompt":"Write a trial quality report."}]}"#;
    let _config = server
        .mock("GET", "/app/config.json")
        .with_status(200)
        .with_body(catalogue)
        .create_async()
        .await;
    let _book = server
        .mock("GET", "/app/data/trial.xlsx")
        .with_status(200)
        .with_body(sample_workbook())
        .create_async()
        .await;
    let completion = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::Regex(
            r#""content":"Write a trial quality report\.\\nKeep it short\.""#.to_string(),
        ))
        .with_status(200)
        .with_body(sse_body(&["ok"]))
        .create_async()
        .await;

    let http = reqwest::Client::new();
    let catalog = DemoCatalog::load(&http, &format!("{}/app/config.json", server.url()))
        .await
        .unwrap();
    let (_, demo) = catalog.select("trial quality").unwrap();

    let options = Options {
        source: Some(InputSource::Workbook(catalog.source_for(demo))),
        instructions: crate::runner::compose_instructions(&demo.prompt, Some("Keep it short.")),
        ..options_for(&server, Vec::new())
    };
    let runner = Runner::new(options).unwrap();
    let mut session = ReportSession::new();
    let mut sink = |_: &str| -> Result<(), RenderError> { Ok(()) };
    let (prepared, result) = runner.run(&mut session, &mut sink, pending()).await.unwrap();

    assert_eq!(prepared.non_empty_sheets, 2);
    assert_eq!(result.content, "ok");
    completion.assert_async().await;
}

#[tokio::test]
async fn live_preview_and_export_follow_the_stream() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(sse_body(&["```markdown\n", "## Summary\n\n", "| a | b |\n|---|---|\n| 1 | 2 |\n", "```"]))
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let preview = dir.path().join("live.html");
    let mut sinks = MultiSink::new();
    sinks.push(TerminalSink::new(Vec::<u8>::new()));
    sinks.push(HtmlPreviewSink::new(preview.clone(), "Trial"));

    let runner = Runner::new(options_for(&server, sample_workbook())).unwrap();
    let mut session = ReportSession::new();
    let (prepared, result) = runner
        .run(&mut session, &mut sinks, pending())
        .await
        .unwrap();
    assert_eq!(result.outcome.completion, Completion::Finished);

    let live = std::fs::read_to_string(&preview).unwrap();
    assert!(live.contains("<h2>Summary</h2>") || live.contains("language-markdown"));

    let record = ReportRecord::new(
        "Trial",
        "gpt-4o-mini",
        "Write a quality report.",
        prepared.sheets.clone(),
        &result.content,
        result.outcome.usage,
    );
    assert!(record.content.starts_with("## Summary"));

    let target = dir.path().join("report.html");
    let rendered = output::render_report(OutputFormat::Html, &record);
    output::write_report(&target, &rendered).unwrap();
    let html = std::fs::read_to_string(&target).unwrap();
    assert!(html.contains("Generated Report"));
    assert!(html.contains("<td>2</td>"));
    assert!(html.contains("@page"));
}
