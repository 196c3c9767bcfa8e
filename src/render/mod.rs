use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

use pulldown_cmark::{html, Event, Options, Parser, TagEnd};
use regex::Regex;

use crate::output::report;
use crate::stream::{RenderError, RenderSink};

fn markdown_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

/// Renders markdown to an HTML fragment. Always a full parse of `markdown`.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, markdown_options());
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Reduces markdown to readable plain text: markup dropped, block elements on
/// their own lines, table cells tab-separated.
pub fn markdown_to_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    for event in Parser::new_ext(markdown, markdown_options()) {
        match event {
            Event::Text(t) | Event::Code(t) => out.push_str(&t),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::Rule => out.push_str("\n\n"),
            Event::TaskListMarker(done) => out.push_str(if done { "[x] " } else { "[ ] " }),
            Event::End(TagEnd::TableCell) => out.push('\t'),
            Event::End(TagEnd::TableRow) | Event::End(TagEnd::TableHead) => {
                if out.ends_with('\t') {
                    out.pop();
                }
                out.push('\n');
            }
            Event::End(TagEnd::Item) => out.push('\n'),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::CodeBlock)
            | Event::End(TagEnd::Table) => out.push_str("\n\n"),
            _ => {}
        }
    }
    let trimmed = out.trim_end().to_string();
    collapse_blank_runs(&trimmed)
}

fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;
    for c in text.chars() {
        if c == '\n' {
            newlines += 1;
            if newlines > 2 {
                continue;
            }
        } else {
            newlines = 0;
        }
        out.push(c);
    }
    out
}

fn outer_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[ \t]*(markdown|md)?[ \t]*\r?\n(.*?)\r?\n```\s*$")
            .expect("static regex")
    })
}

/// Strips a single code fence wrapping the whole response. Models often
/// answer with the report inside ```` ```markdown ```` even when asked not to.
///
/// A bare fence is only removed when nothing inside it opens another fence.
pub fn unwrap_outer_fence(text: &str) -> &str {
    let Some(caps) = outer_fence().captures(text) else {
        return text;
    };
    let tagged = caps.get(1).is_some();
    let Some(inner) = caps.get(2) else {
        return text;
    };
    if !tagged && inner.as_str().contains("```") {
        return text;
    }
    inner.as_str()
}

/// Streams the report to a terminal as it grows, printing only what was
/// appended since the previous call.
pub struct TerminalSink<W: Write> {
    out: W,
    printed: String,
}

impl TerminalSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: String::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RenderSink for TerminalSink<W> {
    fn render(&mut self, buffer: &str) -> Result<(), RenderError> {
        // a buffer that does not extend what is on screen belongs to a new request
        let suffix = match buffer.strip_prefix(self.printed.as_str()) {
            Some(rest) => rest,
            None => {
                self.printed.clear();
                buffer
            }
        };
        self.out.write_all(suffix.as_bytes())?;
        self.out.flush()?;
        self.printed.push_str(suffix);
        Ok(())
    }

    fn restart(&mut self) {
        self.printed.clear();
    }
}

/// Rewrites an HTML page with the whole rendered buffer on every fragment, so
/// a browser pointed at the file shows the report as it is written.
pub struct HtmlPreviewSink {
    path: PathBuf,
    title: String,
}

impl HtmlPreviewSink {
    pub fn new(path: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
        }
    }
}

impl RenderSink for HtmlPreviewSink {
    fn render(&mut self, buffer: &str) -> Result<(), RenderError> {
        let body = markdown_to_html(buffer);
        let page = report::render_document(&self.title, &body, true);
        std::fs::write(&self.path, page)?;
        Ok(())
    }
}

/// Forwards each render to several sinks in order; the first error wins.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn RenderSink + Send>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: impl RenderSink + Send + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl RenderSink for MultiSink {
    fn render(&mut self, buffer: &str) -> Result<(), RenderError> {
        for sink in self.sinks.iter_mut() {
            sink.render(buffer)?;
        }
        Ok(())
    }

    fn restart(&mut self) {
        for sink in self.sinks.iter_mut() {
            sink.restart();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_renders_headings_and_tables() {
        let html = markdown_to_html("# Summary\n\n| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<h1>Summary</h1>"));
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>2</td>"));
    }

    #[test]
    fn text_rendering_drops_markup() {
        let text = markdown_to_text("# Title\n\nSome **bold** text.\n\n- one\n- two\n");
        assert_eq!(text, "Title\n\nSome bold text.\n\none\ntwo");
    }

    #[test]
    fn unwrap_outer_fence_strips_tagged_fence() {
        let wrapped = "```markdown\n# Report\n\n```python\nx = 1\n```\n```\n";
        assert_eq!(unwrap_outer_fence(wrapped), "# Report\n\n```python\nx = 1\n```");
    }

    #[test]
    fn unwrap_outer_fence_leaves_other_text_alone() {
        let plain = "# Report\n\nNo fences here.";
        assert_eq!(unwrap_outer_fence(plain), plain);
        let two_blocks = "```\na\n```\ntext\n```\nb\n```";
        assert_eq!(unwrap_outer_fence(two_blocks), two_blocks);
        assert_eq!(unwrap_outer_fence("```\nbare\n```"), "bare");
    }

    #[test]
    fn terminal_sink_prints_only_new_text() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.render("Hello").unwrap();
        sink.render("Hello ").unwrap();
        sink.render("Hello world").unwrap();
        assert_eq!(sink.into_inner(), b"Hello world".to_vec());
    }

    #[test]
    fn terminal_sink_restarts_after_reset() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.render("first run").unwrap();
        sink.render("new").unwrap();
        assert_eq!(sink.into_inner(), b"first runnew".to_vec());

        let mut sink = TerminalSink::new(Vec::new());
        sink.render("a").unwrap();
        sink.render("ab").unwrap();
        sink.render("x").unwrap();
        sink.render("xyz").unwrap();
        assert_eq!(sink.into_inner(), b"abxyz".to_vec());
    }

    #[tokio::test]
    async fn terminal_sink_reused_across_requests_prints_each_report() {
        use crate::completion::{CompletionError, SseEvent};
        use crate::stream::ReportSession;

        fn delta(text: &str) -> Result<SseEvent, CompletionError> {
            Ok(SseEvent {
                data: serde_json::json!({ "choices": [{ "delta": { "content": text } }] })
                    .to_string(),
                ..Default::default()
            })
        }

        let mut session = ReportSession::new();
        let mut sink = TerminalSink::new(Vec::new());
        for fragments in [vec!["a", "b"], vec!["xy", "z"], vec!["xy", "z", "!"]] {
            session.begin();
            let events = futures::stream::iter(fragments.into_iter().map(delta));
            session
                .consume(events, &mut sink, std::future::pending())
                .await
                .unwrap();
        }
        assert_eq!(sink.into_inner(), b"abxyzxyz!".to_vec());
    }

    #[test]
    fn html_preview_sink_rewrites_whole_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.html");
        let mut sink = HtmlPreviewSink::new(&path, "Live");
        sink.render("# Draft").unwrap();
        sink.render("# Draft\n\nmore").unwrap();
        let page = std::fs::read_to_string(&path).unwrap();
        assert!(page.contains("<h1>Draft</h1>"));
        assert!(page.contains("<p>more</p>"));
        assert_eq!(page.matches("<h1>Draft</h1>").count(), 1);
    }

    #[test]
    fn multi_sink_fans_out() {
        use std::sync::{Arc, Mutex};
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut multi = MultiSink::new();
        for tag in ["a", "b"] {
            let seen = Arc::clone(&seen);
            multi.push(move |buf: &str| -> Result<(), RenderError> {
                seen.lock().unwrap().push(format!("{tag}:{buf}"));
                Ok(())
            });
        }
        assert_eq!(multi.len(), 2);
        assert!(!multi.is_empty());
        multi.render("x").unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a:x", "b:x"]);
    }
}
