//! Helpers for driving the compiler stage binaries in integration tests.
//!
//! Stage binaries derive their output path from the input path, so each test
//! copies its fixture into a fresh scratch directory before running a stage
//! on it.
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
    process::{Command, Output},
    sync::atomic::{AtomicUsize, Ordering},
};

static SCRATCH_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Copy a fixture into a unique scratch directory and return the new path.
pub fn prepare_fixture(fixture: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let unique = SCRATCH_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "cool-lang-test-{}-{unique}",
        std::process::id()
    ));
    fs::create_dir_all(&dir)?;

    let file_name = fixture
        .file_name()
        .ok_or_else(|| format!("fixture has no file name: {}", fixture.display()))?;
    let target = dir.join(file_name);
    fs::copy(fixture, &target)?;
    Ok(target)
}

/// Run one stage binary on an input file.
pub fn run_stage(binary: &str, input: &Path) -> Result<Output, Box<dyn Error>> {
    Ok(Command::new(binary).arg(input).output()?)
}

/// What a stage run should print and how it should exit.
pub struct Expected<'a> {
    pub stdout: &'a str,
    pub success: bool,
}

impl<'a> Expected<'a> {
    pub fn assert_matches(&self, output: &Output) {
        assert_eq!(
            self.stdout,
            String::from_utf8_lossy(&output.stdout),
            "stage stdout mismatch"
        );
        assert_eq!(
            self.success,
            output.status.success(),
            "stage exited with {:?}",
            output.status.code()
        );
    }
}

/// Run a stage expecting success and return the produced output file's
/// contents. `input` must end with `input_ext`.
pub fn run_stage_ok(
    binary: &str,
    input: &Path,
    input_ext: &str,
    output_ext: &str,
) -> Result<(PathBuf, String), Box<dyn Error>> {
    let output = run_stage(binary, input)?;
    assert!(
        output.status.success(),
        "stage {binary} failed: stdout={} stderr={}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
    );

    let name = input.to_string_lossy();
    let stem = name
        .strip_suffix(input_ext)
        .ok_or_else(|| format!("input {name} does not end with {input_ext}"))?;
    let produced = PathBuf::from(format!("{stem}{output_ext}"));
    let contents = fs::read_to_string(&produced)?;
    Ok((produced, contents))
}
