use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub token: Option<String>,
    pub token_url: Option<String>,
    pub login_url: Option<String>,
    pub cookie: Option<String>,
    #[serde(alias = "app")]
    pub app_tag: Option<String>,
    pub demos: Option<String>,
    pub instructions: Option<String>,
    #[serde(alias = "alignment")]
    pub columns: Option<String>,
    pub output: Option<String>,
    pub output_format: Option<String>,
    pub timeout: Option<u64>,
    pub no_color: Option<bool>,
    pub open: Option<bool>,
}

fn home_dir() -> Option<PathBuf> {
    if let Some(home) = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")) {
        return Some(PathBuf::from(home));
    }
    match (env::var_os("HOMEDRIVE"), env::var_os("HOMEPATH")) {
        (Some(drive), Some(rest)) => Some(Path::new(&drive).join(rest)),
        _ => None,
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".tabreport").join("config.yml"))
}

/// Expands a leading `~/` against the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let rest = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\"));
    match (rest, home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

pub fn expand_tilde_string(path: &str) -> String {
    expand_tilde(path).display().to_string()
}

/// Reads a YAML config. A missing file yields the empty config only when
/// `allow_missing` is set (the implicit default location).
pub fn load_config(path: &Path, allow_missing: bool) -> Result<ConfigFile, String> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return if allow_missing {
                Ok(ConfigFile::default())
            } else {
                Err(format!("config file not found: {}", path.display()))
            };
        }
        Err(e) => return Err(format!("cannot read config {}: {e}", path.display())),
    };
    serde_yaml::from_str(&contents)
        .map_err(|e| format!("invalid config {}: {e}", path.display()))
}

fn default_config_yaml() -> &'static str {
    r#"# tabreport config
#
# Location (default):
#   ~/.tabreport/config.yml

# Completion API
base_url: https://llmfoundry.straive.com/openai/v1
model: gpt-4o-mini
# app_tag: reports

# Authentication (choose one)
# token: sk-...
token_url: https://llmfoundry.straive.com/token
login_url: https://llmfoundry.straive.com/login
# cookie: "session=..."

# Demo catalogue (JSON with a "demos" array)
# demos: ./demos/config.json

# Base instructions sent as the system prompt
# instructions: "Write a concise quality report with findings and recommendations."

# Column alignment for rows with differing fields: header or as-read
columns: header

# Output (optional)
# output: ./report.html
# output_format: html
# open: false

# Seconds allowed to connect to the API or fetch a workbook
timeout: 30

# Output styling
no_color: false
"#
}

/// Writes the commented default config unless a file is already there.
/// Returns whether a file was written.
pub fn ensure_default_config_file(path: &Path) -> Result<bool, String> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("cannot create {}: {e}", dir.display()))?;
    }
    std::fs::write(path, default_config_yaml())
        .map_err(|e| format!("cannot write config {}: {e}", path.display()))?;
    Ok(true)
}
