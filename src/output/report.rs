use super::{escape_html, ReportRecord};
use crate::render::markdown_to_html;

const PRINT_STYLE: &str = r#"
    :root { color-scheme: light; }
    * { box-sizing: border-box; }
    body {
      margin: 0;
      background: #f8fafc;
      color: #0f172a;
      font-family: 'Inter', -apple-system, 'Segoe UI', Roboto, sans-serif;
      line-height: 1.6;
    }
    header {
      display: flex;
      align-items: center;
      justify-content: space-between;
      padding: 1rem 2rem;
      border-bottom: 1px solid #e2e8f0;
      background: #ffffff;
    }
    header h2 { margin: 0; font-size: 1.1rem; text-transform: uppercase; letter-spacing: 0.05em; }
    header button {
      border: 0;
      border-radius: 0.5rem;
      padding: 0.5rem 1rem;
      background: #135bec;
      color: #ffffff;
      font-weight: 600;
      cursor: pointer;
    }
    main { max-width: 960px; margin: 0 auto; padding: 2.5rem 2rem; }
    h1.report-title {
      font-size: 2.5rem;
      margin: 0 0 0.5rem;
      padding-bottom: 0.5rem;
      border-bottom: 2px solid #0f172a;
    }
    .meta { color: #64748b; font-size: 0.85rem; margin-bottom: 2rem; }
    .meta span + span::before { content: " \00b7 "; }
    article table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
    article th, article td { border: 1px solid #cbd5e1; padding: 0.4rem 0.6rem; text-align: left; }
    article th { background: #f1f5f9; }
    article pre { background: #0f172a; color: #e2e8f0; padding: 1rem; border-radius: 0.5rem; overflow-x: auto; }
    article code { font-family: 'JetBrains Mono', Consolas, monospace; font-size: 0.9em; }
    footer {
      padding: 2rem;
      border-top: 1px solid #e2e8f0;
      text-align: center;
      font-size: 0.75rem;
      color: #94a3b8;
      text-transform: uppercase;
      letter-spacing: 0.1em;
    }
    @page { size: A4 portrait; margin: 10mm; }
    @media print {
      body { background: #ffffff; }
      header, footer, .no-print { display: none; }
      main { max-width: none; padding: 0; }
      article h1, article h2, article h3 { break-after: avoid; }
      article table, article pre { break-inside: avoid; }
    }
"#;

/// Wraps an already-rendered HTML fragment into a standalone printable page.
/// `live` pages reload themselves so a browser follows the growing report.
pub fn render_document(title: &str, body_html: &str, live: bool) -> String {
    render_page(title, "", body_html, live)
}

pub fn render_html(record: &ReportRecord) -> Vec<u8> {
    let mut meta = Vec::new();
    meta.push(format!("<span>{}</span>", escape_html(&record.generated_at)));
    meta.push(format!("<span>model {}</span>", escape_html(&record.model)));
    if !record.sheets.is_empty() {
        meta.push(format!(
            "<span>sheets: {}</span>",
            escape_html(&record.sheets.join(", "))
        ));
    }
    if let Some(usage) = record.usage {
        meta.push(format!("<span>{} tokens</span>", usage.total_tokens));
    }
    let body = markdown_to_html(&record.content);
    render_page(&record.title, &meta.join(""), &body, false).into_bytes()
}

fn render_page(title: &str, meta_html: &str, body_html: &str, live: bool) -> String {
    let title = escape_html(title);
    let refresh = if live {
        r#"<meta http-equiv="refresh" content="2"/>"#
    } else {
        ""
    };
    let meta_block = if meta_html.is_empty() {
        String::new()
    } else {
        format!(r#"<div class="meta">{meta_html}</div>"#)
    };

    format!(
        r####"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8"/>
  <meta content="width=device-width, initial-scale=1.0" name="viewport"/>
  {refresh}
  <title>{title}</title>
  <style>{style}</style>
</head>
<body>
  <header class="no-print">
    <h2>{title}</h2>
    <button type="button" onclick="window.print()">Download Report</button>
  </header>

  <main>
    <h1 class="report-title">Generated Report</h1>
    {meta_block}
    <article>
{body_html}
    </article>
  </main>

  <footer>Generated with tabreport</footer>
</body>
</html>
"####,
        refresh = refresh,
        title = title,
        style = PRINT_STYLE,
        meta_block = meta_block,
        body_html = body_html,
    )
}
