//! External command execution for sources backed by CLI tools

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::{Error, Result};

pub const HG_BINARY_ENV: &str = "VENDO_HG_BINARY";
pub const HELM_BINARY_ENV: &str = "VENDO_HELM_BINARY";

/// Executables used for Mercurial and Helm sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub hg: PathBuf,
    pub helm: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            hg: PathBuf::from("hg"),
            helm: PathBuf::from("helm"),
        }
    }
}

impl ToolPaths {
    /// Defaults overridden by `VENDO_HG_BINARY` and `VENDO_HELM_BINARY`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str| std::env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from);
        Self {
            hg: var(HG_BINARY_ENV).unwrap_or(defaults.hg),
            helm: var(HELM_BINARY_ENV).unwrap_or(defaults.helm),
        }
    }
}

/// Run `program` with `args` in `dir` and return its trimmed stdout.
///
/// `envs` are added to the inherited environment.
pub(crate) fn run<I, S>(program: &Path, args: I, dir: &Path, envs: &[(&str, &OsStr)]) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let tool = program.display().to_string();
    let mut command = Command::new(program);
    command.args(args).current_dir(dir);
    for (key, value) in envs {
        command.env(key, value);
    }
    tracing::debug!(?command, "Running external tool");

    let output = command.output().map_err(|e| Error::Tool {
        tool: tool.clone(),
        message: format!("failed to start: {e}"),
    })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let code = output.status.code().unwrap_or(-1);
        Err(Error::Tool {
            tool,
            message: format!("exit code {code}: {stderr}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_a_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(Path::new("vendo-no-such-tool"), ["--version"], dir.path(), &[]).unwrap_err();
        assert!(matches!(err, Error::Tool { .. }), "got {err}");
        assert!(err.to_string().contains("failed to start"));
    }

    #[cfg(unix)]
    #[test]
    fn failure_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(Path::new("sh"), ["-c", "echo broken >&2; exit 3"], dir.path(), &[]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("exit code 3"), "{message}");
        assert!(message.contains("broken"), "{message}");
    }
}
