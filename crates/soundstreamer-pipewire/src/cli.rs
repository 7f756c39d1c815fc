//! Backend driving the PipeWire command-line utilities.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, info, warn};

use crate::error::{PwError, PwResult};

/// Operations the graph mirror needs from PipeWire.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait GraphBackend: Send + Sync {
    /// Return the raw `pw-dump` JSON of the whole graph.
    fn dump(&self) -> PwResult<String>;

    /// Link an output node/port to an input node/port.
    fn link(&self, output: u32, input: u32) -> PwResult<()>;

    /// Remove the link between an output node/port and an input node/port.
    fn unlink(&self, output: u32, input: u32) -> PwResult<()>;

    /// Remove a link by its own object ID.
    fn unlink_id(&self, link_id: u32) -> PwResult<()>;
}

/// Paths of the PipeWire tools to run.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub pw_dump: PathBuf,
    pub pw_link: PathBuf,
    pub pw_cli: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            pw_dump: PathBuf::from("pw-dump"),
            pw_link: PathBuf::from("pw-link"),
            pw_cli: PathBuf::from("pw-cli"),
        }
    }
}

/// [`GraphBackend`] running `pw-dump` and `pw-link` as subprocesses.
pub struct PwCli {
    tools: ToolPaths,
}

impl PwCli {
    /// Create a backend using the given tool paths.
    #[must_use]
    pub fn new(tools: ToolPaths) -> Self {
        Self { tools }
    }

    fn run(&self, tool: &Path, args: &[String]) -> PwResult<Output> {
        debug!(tool = %tool.display(), ?args, "Running PipeWire tool");

        let output = Command::new(tool).args(args).output().map_err(|source| PwError::Spawn {
            tool: tool.display().to_string(),
            source,
        })?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(PwError::CommandFailed {
                tool: tool.display().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Default for PwCli {
    fn default() -> Self {
        Self::new(ToolPaths::default())
    }
}

impl GraphBackend for PwCli {
    fn dump(&self) -> PwResult<String> {
        let output = self.run(&self.tools.pw_dump, &[])?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn link(&self, output: u32, input: u32) -> PwResult<()> {
        match self.run(&self.tools.pw_link, &[output.to_string(), input.to_string()]) {
            Ok(_) => {
                info!(output, input, "Linked");
                Ok(())
            }
            Err(PwError::CommandFailed { stderr, .. }) => {
                warn!(output, input, %stderr, "pw-link refused link");
                Err(PwError::LinkCreationFailed(failure_text(stderr, output, input)))
            }
            Err(e) => Err(e),
        }
    }

    fn unlink(&self, output: u32, input: u32) -> PwResult<()> {
        let args = ["-d".to_string(), output.to_string(), input.to_string()];
        match self.run(&self.tools.pw_link, &args) {
            Ok(_) => {
                info!(output, input, "Unlinked");
                Ok(())
            }
            Err(PwError::CommandFailed { stderr, .. }) => {
                Err(PwError::LinkRemovalFailed(failure_text(stderr, output, input)))
            }
            Err(e) => Err(e),
        }
    }

    fn unlink_id(&self, link_id: u32) -> PwResult<()> {
        match self.run(&self.tools.pw_link, &["-d".to_string(), link_id.to_string()]) {
            Ok(_) => {
                info!(link_id, "Unlinked");
                Ok(())
            }
            Err(PwError::CommandFailed { stderr, .. }) => Err(PwError::LinkRemovalFailed(
                if stderr.is_empty() { format!("link {link_id}") } else { stderr },
            )),
            Err(e) => Err(e),
        }
    }
}

fn failure_text(stderr: String, output: u32, input: u32) -> String {
    if stderr.is_empty() { format!("{output} -> {input}") } else { stderr }
}
