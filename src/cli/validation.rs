use crate::cli::args::CliArgs;
use crate::flatten::ColumnAlignment;
use crate::output::OutputFormat;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if args.init_config {
        return Ok(());
    }
    if args.file.is_some() && args.demo.is_some() {
        return Err("--file and --demo are mutually exclusive".to_string());
    }
    if args.save_sample.is_some() && args.demo.is_none() {
        return Err("--save-sample requires --demo".to_string());
    }
    if !args.list_demos && args.file.is_none() && args.demo.is_none() {
        return Err(
            "an input must be specified (--file, --demo, or --list-demos)".to_string(),
        );
    }
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err("invalid timeout, expected positive integer".to_string());
        }
    }
    if let Some(raw) = args.output_format.as_deref() {
        OutputFormat::parse(raw).ok_or_else(|| {
            format!("invalid --output-format '{raw}', expected markdown, html, text, or json")
        })?;
    }
    if let Some(raw) = args.columns.as_deref() {
        ColumnAlignment::parse(raw)
            .ok_or_else(|| format!("invalid --columns '{raw}', expected header or as-read"))?;
    }
    if let Some(model) = args.model.as_deref() {
        if model.trim().is_empty() {
            return Err("invalid model, expected a non-empty name".to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(argv: &[&str]) -> CliArgs {
        let mut full = vec!["tabreport"];
        full.extend_from_slice(argv);
        CliArgs::parse_from(full)
    }

    #[test]
    fn accepts_a_plain_file_run() {
        assert!(validate(&parse(&["-f", "data.xlsx", "--columns", "as-read"])).is_ok());
    }

    #[test]
    fn rejects_conflicting_or_missing_sources() {
        let err = validate(&parse(&["--file", "a.xlsx", "--demo", "0"])).unwrap_err();
        assert!(err.contains("mutually exclusive"));
        let err = validate(&parse(&[])).unwrap_err();
        assert!(err.contains("an input must be specified"));
        assert!(validate(&parse(&["--list-demos"])).is_ok());
        assert!(validate(&parse(&["--init-config"])).is_ok());
    }

    #[test]
    fn save_sample_needs_a_demo() {
        let err = validate(&parse(&["-f", "a.xlsx", "--save-sample", "b.xlsx"])).unwrap_err();
        assert_eq!(err, "--save-sample requires --demo");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(validate(&parse(&["-f", "a.xlsx", "--timeout", "0"])).is_err());
        assert!(validate(&parse(&["-f", "a.xlsx", "--output-format", "pdf"]))
            .unwrap_err()
            .contains("--output-format 'pdf'"));
        assert!(validate(&parse(&["-f", "a.xlsx", "--columns", "diagonal"])).is_err());
        assert!(validate(&parse(&["-f", "a.xlsx", "-m", " "])).is_err());
    }
}
