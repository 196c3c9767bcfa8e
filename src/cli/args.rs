use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tabreport",
    version,
    about = "spreadsheet-to-report generator",
    long_about = "Tabreport reads every sheet of a workbook, sends the rows to a chat-completion API together with your instructions, and streams the written report to the terminal.\n\nExamples:\n  tabreport -f data.xlsx -i \"Focus on outliers\"\n  tabreport --demos demos/config.json --list-demos\n  tabreport --demos demos/config.json --demo 0 -o report.html --open\n\nTip: Use --init-config once and keep the API settings in ~/.tabreport/config.yml."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "vb",
        visible_alias = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase log verbosity (-v, -vv)."
    )]
    pub verbose: u8,

    #[arg(
        short = 'f',
        long = "fl",
        visible_alias = "file",
        value_name = "PATH|URL",
        help_heading = "Input",
        help = "Workbook to report on (.xlsx, .xlsm, .xls, .ods), local or http(s)."
    )]
    pub file: Option<String>,

    #[arg(
        long = "dm",
        visible_alias = "demos",
        value_name = "PATH|URL",
        help_heading = "Input",
        help = "Demo catalogue (JSON with a \"demos\" array)."
    )]
    pub demos: Option<String>,

    #[arg(
        short = 'd',
        long = "dmo",
        visible_alias = "demo",
        value_name = "INDEX|TITLE",
        help_heading = "Input",
        help = "Generate the report for a demo from the catalogue."
    )]
    pub demo: Option<String>,

    #[arg(
        short = 'L',
        long = "ld",
        visible_alias = "list-demos",
        help_heading = "Input",
        help = "List the demos in the catalogue and exit."
    )]
    pub list_demos: bool,

    #[arg(
        long = "ss",
        visible_alias = "save-sample",
        value_name = "PATH",
        help_heading = "Input",
        help = "Save the selected demo's workbook to PATH and exit."
    )]
    pub save_sample: Option<String>,

    #[arg(
        short = 'C',
        long = "cfg",
        visible_alias = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.tabreport/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        long = "ic",
        visible_alias = "init-config",
        help_heading = "Input",
        help = "Write a commented default config file if none exists, then exit."
    )]
    pub init_config: bool,

    #[arg(
        short = 'i',
        long = "ins",
        visible_alias = "instructions",
        value_name = "TEXT",
        help_heading = "Report",
        help = "Extra instructions appended to the base prompt."
    )]
    pub instructions: Option<String>,

    #[arg(
        long = "col",
        visible_alias = "columns",
        value_name = "MODE",
        help_heading = "Report",
        help = "Column alignment for rows with differing fields (header or as-read)."
    )]
    pub columns: Option<String>,

    #[arg(
        short = 'm',
        long = "mdl",
        visible_alias = "model",
        value_name = "NAME",
        help_heading = "API",
        help = "Chat model name."
    )]
    pub model: Option<String>,

    #[arg(
        long = "bu",
        visible_alias = "base-url",
        value_name = "URL",
        help_heading = "API",
        help = "OpenAI-compatible API base URL (…/v1)."
    )]
    pub base_url: Option<String>,

    #[arg(
        long = "tk",
        visible_alias = "token",
        value_name = "TOKEN",
        env = "TABREPORT_TOKEN",
        hide_env_values = true,
        help_heading = "API",
        help = "Bearer token for the completion API."
    )]
    pub token: Option<String>,

    #[arg(
        long = "tu",
        visible_alias = "token-url",
        value_name = "URL",
        help_heading = "API",
        help = "Endpoint that issues a session token when --token is not set."
    )]
    pub token_url: Option<String>,

    #[arg(
        long = "lu",
        visible_alias = "login-url",
        value_name = "URL",
        help_heading = "API",
        help = "Login page shown when no token is available."
    )]
    pub login_url: Option<String>,

    #[arg(
        long = "ck",
        visible_alias = "cookie",
        value_name = "COOKIE",
        help_heading = "API",
        help = "Cookie header sent to the token endpoint."
    )]
    pub cookie: Option<String>,

    #[arg(
        long = "at",
        visible_alias = "app-tag",
        value_name = "TAG",
        help_heading = "API",
        help = "Application tag appended to the token (token:tag)."
    )]
    pub app_tag: Option<String>,

    #[arg(
        short = 't',
        long = "to",
        visible_alias = "timeout",
        value_name = "SECONDS",
        help_heading = "API",
        help = "Seconds allowed to connect to the API or fetch a workbook."
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'o',
        long = "out",
        visible_alias = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Export the finished report to FILE."
    )]
    pub output: Option<String>,

    #[arg(
        long = "of",
        visible_alias = "output-format",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Export format (markdown, html, text, json); inferred from --output otherwise."
    )]
    pub output_format: Option<String>,

    #[arg(
        long = "lh",
        visible_alias = "live-html",
        value_name = "FILE",
        help_heading = "Output",
        help = "Rewrite FILE with the rendered report after every fragment."
    )]
    pub live_html: Option<String>,

    #[arg(
        long = "op",
        visible_alias = "open",
        help_heading = "Output",
        help = "Open the exported report with the system viewer (for printing)."
    )]
    pub open: bool,

    #[arg(
        short = 'n',
        long = "nc",
        visible_alias = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,
}
