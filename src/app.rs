use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::auth::{self, TokenOrigin};
use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::completion;
use crate::config::{self, ConfigFile};
use crate::demos::DemoCatalog;
use crate::flatten::ColumnAlignment;
use crate::output::{self, OutputFormat, ReportRecord};
use crate::render::{HtmlPreviewSink, MultiSink, TerminalSink};
use crate::runner::{self, InputSource, Options, Runner};
use crate::stream::{Completion, RenderError, RenderSink, ReportSession};
use crate::workbook::WorkbookSource;

fn print_banner() {
    const BANNER: &str = r#"
   __        __
  / /_____ _/ /_  ________  ____  ____  _____/ /_
 / __/ __ `/ __ \/ ___/ _ \/ __ \/ __ \/ ___/ __/
/ /_/ /_/ / /_/ / /  /  __/ /_/ / /_/ / /  / /_
\__/\__,_/_.___/_/   \___/ .___/\____/_/   \__/
                        /_/
       v0.1.0 - spreadsheet-to-report generator
    "#;
    print!("{}", BANNER.cyan());
    println!();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<12}: {}", label, value);
}

fn render_custom_help() -> String {
    let cmd = CliArgs::command();
    let mut out = String::new();

    out.push_str(cmd.get_name());
    if let Some(version) = cmd.get_version() {
        out.push(' ');
        out.push_str(version);
    }
    out.push('\n');
    if let Some(about) = cmd.get_about() {
        out.push_str(&format!("{about}\n"));
    }
    if let Some(long_about) = cmd.get_long_about() {
        out.push_str(&format!("\n{long_about}\n"));
    }
    out.push_str(&format!("\nUsage: {} [OPTIONS]\n\n", cmd.get_name()));

    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<&clap::Arg>> = HashMap::new();
    for arg in cmd.get_arguments().filter(|a| !a.is_hide_set()) {
        let heading = arg.get_help_heading().unwrap_or("Options").to_string();
        if !grouped.contains_key(&heading) {
            order.push(heading.clone());
        }
        grouped.entry(heading).or_default().push(arg);
    }

    for heading in order {
        out.push_str(&format!("{heading}:\n"));
        for arg in grouped.remove(&heading).unwrap_or_default() {
            let mut parts: Vec<String> = Vec::new();
            if let Some(short) = arg.get_short() {
                parts.push(format!("-{short}"));
            }
            if let Some(long) = arg.get_long() {
                parts.push(format!("--{long}"));
            }
            for alias in arg.get_visible_aliases().unwrap_or_default() {
                let rendered = format!("--{alias}");
                if !parts.contains(&rendered) {
                    parts.push(rendered);
                }
            }
            let mut flags = parts.join(", ");
            if arg.get_action().takes_values() {
                let value_name = arg
                    .get_value_names()
                    .and_then(|names| names.first())
                    .map(|name| name.as_str())
                    .unwrap_or("VALUE");
                flags.push_str(&format!(" <{value_name}>"));
            }
            out.push_str(&format!("  {flags}\n"));
            if let Some(help) = arg.get_help().map(|h| h.to_string()) {
                if !help.trim().is_empty() {
                    out.push_str(&format!("          {}\n", help.trim()));
                }
            }
            out.push('\n');
        }
    }

    out
}

fn format_opt_value<'a>(v: Option<&'a str>, default: &'a str) -> &'a str {
    match v.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => default,
    }
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum InputMode {
    File(String),
    Demo(String),
    ListDemos,
}

#[derive(Clone, Debug)]
struct RunConfig {
    mode: InputMode,
    demos: Option<String>,
    save_sample: Option<String>,
    base_instructions: String,
    instructions: Option<String>,
    alignment: ColumnAlignment,
    base_url: String,
    model: String,
    token: Option<String>,
    token_url: String,
    login_url: String,
    cookie: Option<String>,
    app_tag: Option<String>,
    timeout: u64,
    output: Option<String>,
    output_format: OutputFormat,
    live_html: Option<String>,
    open: bool,
    no_color: bool,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let no_color = args.no_color || cfg.no_color.unwrap_or(false);
    let open = args.open || cfg.open.unwrap_or(false);

    let timeout = args.timeout.or(cfg.timeout).unwrap_or(30);
    if timeout == 0 {
        return Err("invalid timeout, expected positive integer".to_string());
    }

    let columns_raw = args.columns.or(cfg.columns);
    let alignment = match columns_raw.as_deref() {
        Some(raw) => ColumnAlignment::parse(raw)
            .ok_or_else(|| format!("invalid columns '{raw}', expected header or as-read"))?,
        None => ColumnAlignment::default(),
    };

    let output = args
        .output
        .or(cfg.output)
        .map(|p| config::expand_tilde_string(&p));
    let output_format = match args.output_format.or(cfg.output_format) {
        Some(raw) => OutputFormat::parse(&raw)
            .ok_or_else(|| format!("invalid output format '{raw}'"))?,
        None => output
            .as_deref()
            .and_then(output::infer_format_from_path)
            .unwrap_or(OutputFormat::Markdown),
    };
    if open && output.is_none() {
        return Err("--open requires --output".to_string());
    }

    let demos = args.demos.or(cfg.demos);
    let mode = match (args.file, args.demo) {
        (Some(file), _) => InputMode::File(file),
        (None, Some(demo)) => InputMode::Demo(demo),
        (None, None) => InputMode::ListDemos,
    };
    if !matches!(mode, InputMode::File(_)) && demos.is_none() {
        return Err(
            "a demo catalogue is required (--demos or `demos` in the config file)".to_string(),
        );
    }

    let model = args
        .model
        .or(cfg.model)
        .unwrap_or_else(|| completion::DEFAULT_MODEL.to_string());
    if model.trim().is_empty() {
        return Err("invalid model, expected a non-empty name".to_string());
    }

    Ok(RunConfig {
        mode,
        demos,
        save_sample: args.save_sample.map(|p| config::expand_tilde_string(&p)),
        base_instructions: cfg.instructions.unwrap_or_default(),
        instructions: args.instructions,
        alignment,
        base_url: args
            .base_url
            .or(cfg.base_url)
            .unwrap_or_else(|| completion::DEFAULT_BASE_URL.to_string()),
        model,
        token: args.token.or(cfg.token),
        token_url: args
            .token_url
            .or(cfg.token_url)
            .unwrap_or_else(|| auth::DEFAULT_TOKEN_URL.to_string()),
        login_url: args
            .login_url
            .or(cfg.login_url)
            .unwrap_or_else(|| auth::DEFAULT_LOGIN_URL.to_string()),
        cookie: args.cookie.or(cfg.cookie),
        app_tag: args.app_tag.or(cfg.app_tag),
        timeout,
        output,
        output_format,
        live_html: args.live_html.map(|p| config::expand_tilde_string(&p)),
        open,
        no_color,
    })
}

/// Clears the loading spinner once the first fragment arrives.
struct SpinnerSink<S> {
    spinner: Option<ProgressBar>,
    inner: S,
}

impl<S: RenderSink> RenderSink for SpinnerSink<S> {
    fn render(&mut self, buffer: &str) -> Result<(), RenderError> {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
        self.inner.render(buffer)
    }

    fn restart(&mut self) {
        self.inner.restart();
    }
}

fn new_spinner() -> Result<ProgressBar, String> {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_style(
        ProgressStyle::with_template(":: {spinner} {msg} [{elapsed_precise}]")
            .map_err(|e| format!("failed to build progress bar style: {e}"))?,
    );
    pb.set_message("Generating report");
    Ok(pb)
}

fn title_from_source(source: &WorkbookSource) -> String {
    let raw = match source {
        WorkbookSource::Path(p) => p
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
        WorkbookSource::Url(u) => u
            .rsplit('/')
            .next()
            .and_then(|last| last.split('.').next())
            .unwrap_or_default()
            .to_string(),
    };
    if raw.is_empty() {
        "Report".to_string()
    } else {
        raw
    }
}

async fn load_catalog(client: &reqwest::Client, location: &str) -> DemoCatalog {
    match DemoCatalog::load(client, location).await {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::error!(error = %e, "could not load demo catalogue");
            eprintln!("{} {e}", "::".red());
            DemoCatalog {
                location: location.to_string(),
                demos: Vec::new(),
            }
        }
    }
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    print_banner();

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(run.timeout))
        .build()
        .map_err(|e| format!("failed to build http client: {e}"))?;

    let catalog = match run.demos.as_deref() {
        Some(location) => Some(load_catalog(&http, location).await),
        None => None,
    };

    let (source, base_instructions, title) = match &run.mode {
        InputMode::ListDemos => {
            let catalog = catalog.unwrap_or_default();
            format_kv_line("Demos", &catalog.location);
            println!();
            for (index, demo) in catalog.demos.iter().enumerate() {
                println!("  [{}] {}", index.to_string().yellow(), demo.title.bold());
                if !demo.description.trim().is_empty() {
                    println!("      {}", demo.description.trim());
                }
            }
            if catalog.demos.is_empty() {
                println!("  {}", "no demos available".yellow());
            }
            return Ok(());
        }
        InputMode::Demo(key) => {
            let catalog = catalog.unwrap_or_default();
            let (index, demo) = catalog.select(key).ok_or_else(|| {
                format!(
                    "demo '{key}' not found ({} demos in catalogue)",
                    catalog.demos.len()
                )
            })?;
            let source = catalog.source_for(demo);
            tracing::info!(index, title = %demo.title, "selected demo");

            if let Some(path) = run.save_sample.as_deref() {
                let bytes = source
                    .load_bytes(&http)
                    .await
                    .map_err(|e| format!("failed to download sample: {e}"))?;
                output::write_report(Path::new(path), &bytes).map_err(|e| e.to_string())?;
                format_kv_line("Sample", path);
                return Ok(());
            }
            (source, demo.prompt.clone(), demo.title.clone())
        }
        InputMode::File(file) => {
            let source = WorkbookSource::parse(file);
            let title = title_from_source(&source);
            (source, run.base_instructions.clone(), title)
        }
    };

    let resolved = auth::resolve_token(
        &http,
        run.token.as_deref(),
        &run.token_url,
        run.cookie.as_deref(),
    )
    .await;

    let instructions = runner::compose_instructions(&base_instructions, run.instructions.as_deref());
    let options = Options {
        source: Some(InputSource::Workbook(source.clone())),
        base_url: run.base_url.clone(),
        model: run.model.clone(),
        token: resolved.token.clone(),
        app_tag: run.app_tag.clone(),
        instructions: instructions.clone(),
        alignment: run.alignment,
        timeout_seconds: run.timeout,
    };
    let runner = Runner::new(options).map_err(|e| e.to_string())?;

    format_kv_line("Workbook", &source.display());
    format_kv_line("Model", &run.model);
    format_kv_line("Endpoint", &run.base_url);
    format_kv_line("Columns", run.alignment.label());
    format_kv_line(
        "Token",
        match resolved.origin {
            TokenOrigin::Explicit => "configured",
            TokenOrigin::Endpoint => "session",
            TokenOrigin::Missing => "missing",
        },
    );
    format_kv_line("Output", format_opt_value(run.output.as_deref(), "terminal only"));
    if run.output.is_some() {
        format_kv_line("Format", run.output_format.label());
        format_kv_line("Open", format_bool(run.open));
    }
    if resolved.origin == TokenOrigin::Missing {
        let link = auth::login_url(&run.login_url, &run.base_url);
        println!(
            "{} {}",
            ":: Not logged in, get a token at".yellow(),
            link.yellow().bold()
        );
    }

    let prepared = runner.prepare().await.map_err(|e| e.to_string())?;
    format_kv_line(
        "Sheets",
        &format!(
            "{} ({} with data, {} rows)",
            prepared.sheets.len(),
            prepared.non_empty_sheets,
            prepared.rows
        ),
    );
    if prepared.payload.is_empty() {
        tracing::warn!("workbook has no data rows, sending an empty payload");
    }
    println!();

    let mut sinks = MultiSink::new();
    sinks.push(TerminalSink::stdout());
    if let Some(path) = run.live_html.as_deref() {
        sinks.push(HtmlPreviewSink::new(PathBuf::from(path), title.clone()));
        format_kv_line("Live", path);
    }
    let spinner = new_spinner()?;
    let mut sink = SpinnerSink {
        spinner: Some(spinner.clone()),
        inner: sinks,
    };
    let cancel = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    let mut session = ReportSession::new();
    let result = runner
        .generate(&prepared, &mut session, &mut sink, cancel)
        .await;
    spinner.finish_and_clear();
    println!();

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            if !session.buffer().is_empty() {
                println!();
            }
            return Err(e.to_string());
        }
    };

    if result.outcome.completion == Completion::Cancelled {
        println!();
        println!("{}", ":: Cancelled :: report not exported ::".yellow());
        return Ok(());
    }

    println!();
    if let Some(usage) = result.outcome.usage {
        format_kv_line(
            "Tokens",
            &format!(
                "{} prompt, {} completion, {} total",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            ),
        );
    }

    if let Some(path) = run.output.as_deref() {
        let record = ReportRecord::new(
            &title,
            &run.model,
            &instructions,
            prepared.sheets.clone(),
            &result.content,
            result.outcome.usage,
        );
        let rendered = output::render_report(run.output_format, &record);
        let path = Path::new(path);
        output::write_report(path, &rendered).map_err(|e| {
            tracing::error!(error = %e, "export failed");
            e.to_string()
        })?;
        format_kv_line("Saved", &path.display().to_string());
        if run.open {
            output::open_for_print(path).map_err(|e| {
                tracing::error!(error = %e, "could not open exported report");
                e.to_string()
            })?;
        }
    }

    println!(
        ":: Completed :: {} fragments ::",
        result.outcome.fragments.to_string().green()
    );
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp => {
                print!("{}", render_custom_help());
                return Ok(());
            }
            ErrorKind::DisplayVersion => {
                let cmd = CliArgs::command();
                print!("{}", cmd.render_version());
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };
    init_tracing(args.verbose);

    let user_config_path = args.config.clone().map(|p| config::expand_tilde(&p));
    if args.init_config {
        let path = user_config_path
            .or_else(config::default_config_path)
            .ok_or_else(|| "could not determine a config path".to_string())?;
        if config::ensure_default_config_file(&path)? {
            format_kv_line("Config", &format!("written to {}", path.display()));
        } else {
            format_kv_line("Config", &format!("{} already exists", path.display()));
        }
        return Ok(());
    }

    let cfg = match user_config_path.as_ref() {
        Some(path) => config::load_config(path, false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))?;
    Ok(())
}
