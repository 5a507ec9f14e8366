//! Shared CLI plumbing for the stage binaries.
use clap::ValueEnum;

/// Log level selection, also reachable by numeric alias.
#[derive(ValueEnum, Clone, Default, Debug)]
pub enum LogLevel {
    /// Only critical errors are logged.
    #[default]
    #[value(alias("0"))]
    Error,

    #[value(alias("1"))]
    Warn,

    /// General progress information, e.g. which stage runs on which file.
    #[value(alias("2"))]
    Info,

    #[value(alias("3"))]
    Debug,

    /// Everything, including per-expression annotations. Very noisy.
    #[value(alias("4"))]
    Trace,
}

impl From<&LogLevel> for log::Level {
    fn from(value: &LogLevel) -> Self {
        match value {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// Replace the extension of a stage input, validating the expected one.
pub fn stage_output_path(
    input: &std::path::Path,
    expected: &str,
    produced: &str,
) -> Result<std::path::PathBuf, String> {
    let name = input.to_string_lossy();
    match name.strip_suffix(expected) {
        Some(stem) => Ok(std::path::PathBuf::from(format!("{stem}{produced}"))),
        None => Err(format!("input file must have a {expected} extension")),
    }
}

#[cfg(test)]
mod tests {
    use super::stage_output_path;
    use std::path::Path;

    #[test]
    fn test_stage_output_path() {
        assert_eq!(
            Path::new("demo.cl-ast"),
            stage_output_path(Path::new("demo.cl-lex"), ".cl-lex", ".cl-ast").unwrap()
        );
        assert!(stage_output_path(Path::new("demo.txt"), ".cl-lex", ".cl-ast").is_err());
    }
}
