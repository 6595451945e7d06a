//! Runs external tools and captures their output.

use crate::error::{Result, VirtError};
use std::ffi::OsStr;
use std::path::Path;
use tokio::process::Command;

/// Run `program` with `args` to completion and return its trimmed stdout.
///
/// A non-zero exit is reported as [`VirtError::Command`] with stderr attached.
pub(crate) async fn run<I, S>(program: &Path, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    let display_args = args
        .iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let start = std::time::Instant::now();
    tracing::trace!(program = %program.display(), args = %display_args, "Running command");

    let output = Command::new(program)
        .args(&args)
        .output()
        .await
        .map_err(|source| VirtError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::debug!(
            program = %program.display(),
            args = %display_args,
            status = %output.status,
            elapsed_ms,
            stderr = %stderr,
            "Command failed"
        );
        return Err(VirtError::Command {
            program: program.display().to_string(),
            args: display_args,
            status: output.status.to_string(),
            stderr,
        });
    }

    tracing::trace!(program = %program.display(), elapsed_ms, "Command completed");
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let out = run(Path::new("sh"), ["-c", "echo hello"]).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_run_reports_stderr_on_failure() {
        let err = run(Path::new("sh"), ["-c", "echo boom >&2; exit 3"])
            .await
            .unwrap_err();
        match err {
            VirtError::Command { stderr, args, .. } => {
                assert_eq!(stderr, "boom");
                assert_eq!(args, "-c echo boom >&2; exit 3");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let err = run(Path::new("/nonexistent/vmapi-tool"), ["x"])
            .await
            .unwrap_err();
        assert!(matches!(err, VirtError::Spawn { .. }));
    }
}
