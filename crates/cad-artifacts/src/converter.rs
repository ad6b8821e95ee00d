use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;

pub const DEFAULT_COMPILER: &str = "openscad";
pub const DEFAULT_CONVERSION_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("could not launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} did not finish within {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
    #[error("{program} exited with {status}")]
    Failed {
        program: String,
        status: ExitStatus,
        diagnostics: String,
    },
}

impl ConversionError {
    /// Captured compiler output, when the compiler ran and failed.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            ConversionError::Failed { diagnostics, .. } if !diagnostics.is_empty() => {
                Some(diagnostics)
            }
            _ => None,
        }
    }
}

/// Runs the external geometry compiler as `<program> [args...] -o <mesh> <source>`.
#[derive(Debug, Clone)]
pub struct MeshConverter {
    program: OsString,
    args: Vec<OsString>,
    timeout: Option<Duration>,
}

impl Default for MeshConverter {
    fn default() -> Self {
        Self::new(DEFAULT_COMPILER)
    }
}

impl MeshConverter {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Some(DEFAULT_CONVERSION_TIMEOUT),
        }
    }

    /// Extra arguments placed before `-o`.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args = args
            .into_iter()
            .map(|arg| arg.as_ref().to_os_string())
            .collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub async fn convert(&self, source: &Path, mesh: &Path) -> Result<(), ConversionError> {
        let program = self.program.to_string_lossy().into_owned();
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("-o")
            .arg(mesh)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            %program,
            source = %source.display(),
            mesh = %mesh.display(),
            "running mesh conversion"
        );
        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, command.output())
                .await
                .map_err(|_| ConversionError::TimedOut {
                    program: program.clone(),
                    timeout,
                })?,
            None => command.output().await,
        }
        .map_err(|source| ConversionError::Launch {
            program: program.clone(),
            source,
        })?;

        if output.status.success() {
            return Ok(());
        }

        let diagnostics = diagnostics_from(&output.stderr, &output.stdout);
        tracing::warn!(%program, status = %output.status, "mesh conversion failed");
        Err(ConversionError::Failed {
            program,
            status: output.status,
            diagnostics,
        })
    }
}

fn diagnostics_from(stderr: &[u8], stdout: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    if !stderr.trim().is_empty() {
        return stderr.trim().to_string();
    }
    String::from_utf8_lossy(stdout).trim().to_string()
}
