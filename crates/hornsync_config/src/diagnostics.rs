use std::io::Write;
use std::ops::Range;
use std::path::PathBuf;

/// Source information for where a diagnostic came from
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub file_path: PathBuf,
    pub content: String,
}

impl SourceInfo {
    fn file_id(&self) -> String {
        self.file_path.to_string_lossy().to_string()
    }
}

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Warning(Warning),
    Error(Error),
}

/// Warning messages that don't prevent config loading
#[derive(Debug, Clone)]
pub enum Warning {
    EmptyConfig {
        file_path: PathBuf,
    },
    /// A setting that is valid on its own but has no effect with the rest of
    /// the configuration (e.g. `twin.path` with the in-memory store).
    IgnoredSetting {
        field_path: String,
        message: String,
        span: Option<Range<usize>>,
        source: Option<SourceInfo>,
    },
}

/// Error messages that indicate problems with the config
#[derive(Debug, Clone)]
pub enum Error {
    Load(LoadError),
    Validation(ValidationError),
}

/// Error type for validation failures
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
    pub span: Option<Range<usize>>,
    pub source: Option<SourceInfo>,
}

/// Error type for config loading failures (IO errors, TOML syntax errors)
#[derive(Debug, Clone)]
pub enum LoadError {
    Io {
        path: PathBuf,
        error: String,
    },
    Parse {
        path: PathBuf,
        error: String,
        span: Option<Range<usize>>,
        content: String,
    },
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io { path, error } => write!(
                f,
                "\x1b[31mError\x1b[0m: Failed to read config file\n  ┌─ {}:1:1\n  │\n  = {}\n",
                path.display(),
                error
            ),
            LoadError::Parse { path, error, .. } => write!(
                f,
                "\x1b[31mError\x1b[0m: Failed to parse config file\n  ┌─ {}:1:1\n  │\n  = {}\n",
                path.display(),
                error.trim_end()
            ),
        }
    }
}

impl std::error::Error for LoadError {}

/// A collection of diagnostics (warnings and/or errors)
#[derive(Debug, Clone, Default)]
pub struct Diagnostics(pub Vec<Diagnostic>);

impl Diagnostics {
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Warning> {
        self.0.iter().filter_map(|d| match d {
            Diagnostic::Warning(w) => Some(w),
            Diagnostic::Error(_) => None,
        })
    }

    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.0.iter().filter_map(|d| match d {
            Diagnostic::Error(e) => Some(e),
            Diagnostic::Warning(_) => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<LoadError> for Diagnostics {
    fn from(error: LoadError) -> Self {
        Diagnostics(vec![Diagnostic::Error(Error::Load(error))])
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_diagnostics(&self.0))
    }
}

impl std::error::Error for Diagnostics {}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_diagnostics(std::slice::from_ref(self)))
    }
}

impl Diagnostic {
    /// Returns true if this diagnostic is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    /// Returns true if this diagnostic is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }

    /// Dotted path of the field this diagnostic is about, if any
    pub fn field_path(&self) -> Option<&str> {
        match self {
            Diagnostic::Warning(Warning::IgnoredSetting { field_path, .. }) => Some(field_path),
            Diagnostic::Error(Error::Validation(v)) => Some(&v.field_path),
            _ => None,
        }
    }
}

/// Write a spanned report with a single label through ariadne
fn write_spanned_report(
    output: &mut Vec<u8>,
    kind: ariadne::ReportKind<'_>,
    color: ariadne::Color,
    title: String,
    message: &str,
    span: Range<usize>,
    source: &SourceInfo,
) {
    use ariadne::Label;
    use ariadne::Report;
    use ariadne::Source;

    let file_id = source.file_id();
    let report = Report::build(kind, (file_id.clone(), span.clone()))
        .with_message(title)
        .with_label(
            Label::new((file_id.clone(), span))
                .with_message(message)
                .with_color(color),
        )
        .finish();

    report
        .write((file_id, Source::from(source.content.clone())), output)
        .ok();
}

/// Fallback layout for diagnostics that carry no span.
///
/// Formatted by hand since ariadne doesn't render notes well without source.
fn write_plain_report(
    output: &mut Vec<u8>,
    header: &str,
    title: &str,
    file_path: &str,
    message: &str,
) {
    writeln!(output, "{}: {}", header, title).ok();
    writeln!(output, "  ┌─ {}:1:1", file_path).ok();
    writeln!(output, "  │").ok();
    writeln!(output, "  = {}", message).ok();
    writeln!(output).ok();
}

/// Format all diagnostics for display using Ariadne
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    use ariadne::Color;
    use ariadne::ReportKind;

    let mut output = Vec::new();

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Warning(Warning::EmptyConfig { file_path }) => {
                write_plain_report(
                    &mut output,
                    "\x1b[33mWarning\x1b[0m",
                    "Empty configuration file",
                    &file_path.display().to_string(),
                    &format!(
                        "Config file '{}' is empty, using defaults",
                        file_path.display()
                    ),
                );
            }
            Diagnostic::Warning(Warning::IgnoredSetting {
                field_path,
                message,
                span,
                source,
            }) => {
                let title = format!("Ignored setting '{}'", field_path);
                match (span, source) {
                    (Some(span), Some(source)) => write_spanned_report(
                        &mut output,
                        ReportKind::Warning,
                        Color::Yellow,
                        title,
                        message,
                        span.clone(),
                        source,
                    ),
                    _ => write_plain_report(
                        &mut output,
                        "\x1b[33mWarning\x1b[0m",
                        &title,
                        &source_path(source.as_ref()),
                        message,
                    ),
                }
            }
            Diagnostic::Error(Error::Validation(validation_error)) => {
                let title = format!("Validation error in '{}'", validation_error.field_path);
                match (&validation_error.span, &validation_error.source) {
                    (Some(span), Some(source)) => write_spanned_report(
                        &mut output,
                        ReportKind::Error,
                        Color::Red,
                        title,
                        &validation_error.message,
                        span.clone(),
                        source,
                    ),
                    _ => write_plain_report(
                        &mut output,
                        "\x1b[31mError\x1b[0m",
                        &title,
                        &source_path(validation_error.source.as_ref()),
                        &validation_error.message,
                    ),
                }
            }
            Diagnostic::Error(Error::Load(LoadError::Parse {
                path,
                error,
                span: Some(span),
                content,
            })) => {
                let source = SourceInfo {
                    file_path: path.clone(),
                    content: content.clone(),
                };
                // toml's message repeats the source excerpt; keep its first line only
                let message = error.lines().next().unwrap_or("invalid TOML");
                write_spanned_report(
                    &mut output,
                    ReportKind::Error,
                    Color::Red,
                    "Failed to parse config file".to_string(),
                    message,
                    span.clone(),
                    &source,
                );
            }
            Diagnostic::Error(Error::Load(load_error)) => {
                write!(&mut output, "{}", load_error).ok();
            }
        }
    }

    String::from_utf8_lossy(&output).to_string()
}

fn source_path(source: Option<&SourceInfo>) -> String {
    source
        .map(|s| s.file_path.display().to_string())
        .unwrap_or_else(|| "<unknown>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_is_error() {
        let error = Diagnostic::Error(Error::Validation(ValidationError {
            field_path: "test".to_string(),
            message: "test error".to_string(),
            span: None,
            source: None,
        }));
        assert!(error.is_error());
        assert!(!error.is_warning());
        assert_eq!(error.field_path(), Some("test"));
    }

    #[test]
    fn test_diagnostic_is_warning() {
        let warning = Diagnostic::Warning(Warning::EmptyConfig {
            file_path: PathBuf::from("test.toml"),
        });
        assert!(warning.is_warning());
        assert!(!warning.is_error());
        assert_eq!(warning.field_path(), None);
    }

    #[test]
    fn test_format_empty_config_warning() {
        let diagnostics = vec![Diagnostic::Warning(Warning::EmptyConfig {
            file_path: PathBuf::from("/tmp/empty.toml"),
        })];

        let output = format_diagnostics(&diagnostics);
        let expected = "\u{1b}[33mWarning\u{1b}[0m: Empty configuration file
  ┌─ /tmp/empty.toml:1:1
  │
  = Config file '/tmp/empty.toml' is empty, using defaults

";
        assert_eq!(output, expected);
    }

    #[test]
    fn test_format_validation_error_without_span() {
        let diagnostics = vec![Diagnostic::Error(Error::Validation(ValidationError {
            field_path: "sync.auto_sync".to_string(),
            message: "auto_sync requires auto_connect".to_string(),
            span: None,
            source: Some(SourceInfo {
                file_path: PathBuf::from("/tmp/hornsync.toml"),
                content: String::new(),
            }),
        }))];

        let output = format_diagnostics(&diagnostics);
        let expected = "\u{1b}[31mError\u{1b}[0m: Validation error in 'sync.auto_sync'\n  ┌─ /tmp/hornsync.toml:1:1\n  │\n  = auto_sync requires auto_connect\n\n";
        assert_eq!(output, expected);
    }

    #[test]
    fn test_format_validation_error_with_span() {
        let content = "[serial]\nbaud_rate = 0\n";
        let diagnostics = vec![Diagnostic::Error(Error::Validation(ValidationError {
            field_path: "serial.baud_rate".to_string(),
            message: "baud rate must be greater than zero".to_string(),
            span: Some(21..22),
            source: Some(SourceInfo {
                file_path: PathBuf::from("/tmp/hornsync.toml"),
                content: content.to_string(),
            }),
        }))];

        let output = format_diagnostics(&diagnostics);
        assert!(output.contains("Validation error in 'serial.baud_rate'"));
        assert!(output.contains("baud rate must be greater than zero"));
        assert!(output.contains("/tmp/hornsync.toml:2:13"));
    }

    #[test]
    fn test_format_multiple_diagnostics() {
        let diagnostics = vec![
            Diagnostic::Warning(Warning::EmptyConfig {
                file_path: PathBuf::from("/tmp/empty.toml"),
            }),
            Diagnostic::Error(Error::Validation(ValidationError {
                field_path: "test.field".to_string(),
                message: "test error".to_string(),
                span: None,
                source: None,
            })),
        ];

        let output = format_diagnostics(&diagnostics);
        let expected = "\u{1b}[33mWarning\u{1b}[0m: Empty configuration file\n  ┌─ /tmp/empty.toml:1:1\n  │\n  = Config file '/tmp/empty.toml' is empty, using defaults\n\n\u{1b}[31mError\u{1b}[0m: Validation error in 'test.field'\n  ┌─ <unknown>:1:1\n  │\n  = test error\n\n";
        assert_eq!(output, expected);
    }

    #[test]
    fn test_load_error_display_io() {
        let error = LoadError::Io {
            path: PathBuf::from("/tmp/hornsync.toml"),
            error: "file not found".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("Failed to read"));
        assert!(display.contains("/tmp/hornsync.toml"));
        assert!(display.contains("file not found"));
    }

    #[test]
    fn test_load_error_display_parse() {
        let error = LoadError::Parse {
            path: PathBuf::from("/tmp/hornsync.toml"),
            error: "invalid TOML syntax".to_string(),
            span: None,
            content: String::new(),
        };
        let display = format!("{}", error);
        assert!(display.contains("Failed to parse"));
        assert!(display.contains("/tmp/hornsync.toml"));
    }

    #[test]
    fn test_diagnostics_partition() {
        let diagnostics = Diagnostics(vec![
            Diagnostic::Warning(Warning::EmptyConfig {
                file_path: PathBuf::from("a.toml"),
            }),
            Diagnostic::Error(Error::Load(LoadError::Io {
                path: PathBuf::from("b.toml"),
                error: "denied".to_string(),
            })),
        ]);

        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.warnings().count(), 1);
        assert_eq!(diagnostics.errors().count(), 1);
    }
}
