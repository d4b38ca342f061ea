//! The backend-runner interface
//!
//! Backends are language-independent from the driver's point of view: they
//! declare an artifact extension, a prelude, include directories, a setup
//! check, a build step, and an eval step that forwards run arguments and
//! the child's exit code.

use crate::config::{BackendKind, CompilerConfig};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("the external tool '{tool}' is missing: {remediation}")]
    MissingTool { tool: String, remediation: String },

    #[error("building '{artifact}' failed: {message}")]
    BuildFailed { artifact: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// What every backend exposes to the driver
pub trait BackendRunner {
    /// Extension of generated artifacts, e.g. `js`
    fn extension(&self) -> &'static str;

    /// Module names every compiled program imports implicitly
    fn prelude(&self) -> Vec<&'static str>;

    /// Extra include directories below the standard library root
    fn includes(&self, stdlib: &Path) -> Vec<PathBuf>;

    /// Verify the external toolchain exists
    fn check_setup(&self) -> Result<()>;

    /// Turn a generated artifact into something executable, returning its
    /// path. Writes a launcher wrapper beside the artifact.
    fn build(&self, artifact: &Path) -> Result<PathBuf>;

    /// Run the executable, forwarding arguments, and hand back the child's
    /// exit code. Output is inherited so the program talks to the user.
    fn eval(&self, executable: &Path, args: &[String]) -> Result<i32>;
}

/// Pick the runner for a configured backend
pub fn runner_for(config: &CompilerConfig) -> Box<dyn BackendRunner> {
    match config.backend {
        BackendKind::Js => Box::new(NodeRunner),
        // The remaining backends replicate the JS semantics; their code
        // generators live outside this repository, so the driver only
        // knows their artifact shape.
        BackendKind::Chez => Box::new(ArtifactOnly { ext: "ss" }),
        BackendKind::Llvm => Box::new(ArtifactOnly { ext: "ll" }),
        BackendKind::Ml => Box::new(ArtifactOnly { ext: "sml" }),
        BackendKind::Jit => Box::new(ArtifactOnly { ext: "mcore.json" }),
        BackendKind::Core => Box::new(ArtifactOnly { ext: "mcore.json" }),
    }
}

fn tool_exists(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Write the platform launcher next to the artifact and return it
fn write_launcher(artifact: &Path, command: &str) -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let path = artifact.with_extension("bat");
        std::fs::write(&path, format!("@echo off\r\n{} {} %*\r\n", command, artifact.display()))?;
        Ok(path)
    }
    #[cfg(not(windows))]
    {
        use std::os::unix::fs::PermissionsExt;
        let path = artifact.with_extension("sh");
        std::fs::write(
            &path,
            format!("#!/bin/sh\nexec {} {} \"$@\"\n", command, artifact.display()),
        )?;
        let mut perms = std::fs::metadata(&path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms)?;
        Ok(path)
    }
}

/// The reference runner: executes the JS-semantics artifact with node
pub struct NodeRunner;

impl BackendRunner for NodeRunner {
    fn extension(&self) -> &'static str {
        "js"
    }

    fn prelude(&self) -> Vec<&'static str> {
        vec!["prelude"]
    }

    fn includes(&self, stdlib: &Path) -> Vec<PathBuf> {
        vec![stdlib.join("common"), stdlib.join("js")]
    }

    fn check_setup(&self) -> Result<()> {
        if tool_exists("node") {
            Ok(())
        } else {
            Err(BackendError::MissingTool {
                tool: "node".into(),
                remediation: "install Node.js or put 'node' on the PATH".into(),
            })
        }
    }

    fn build(&self, artifact: &Path) -> Result<PathBuf> {
        debug!(artifact = %artifact.display(), "writing launcher");
        write_launcher(artifact, "node")
    }

    fn eval(&self, executable: &Path, args: &[String]) -> Result<i32> {
        info!(executable = %executable.display(), "running program");
        let status = Command::new(executable).args(args).status()?;
        Ok(status.code().unwrap_or(1))
    }
}

/// A backend whose toolchain lives elsewhere: the driver can emit and
/// place artifacts but not run them
struct ArtifactOnly {
    ext: &'static str,
}

impl BackendRunner for ArtifactOnly {
    fn extension(&self) -> &'static str {
        self.ext
    }

    fn prelude(&self) -> Vec<&'static str> {
        vec!["prelude"]
    }

    fn includes(&self, stdlib: &Path) -> Vec<PathBuf> {
        vec![stdlib.join("common")]
    }

    fn check_setup(&self) -> Result<()> {
        Err(BackendError::MissingTool {
            tool: self.ext.into(),
            remediation: "this backend's toolchain is not bundled; use the js backend".into(),
        })
    }

    fn build(&self, artifact: &Path) -> Result<PathBuf> {
        Ok(artifact.to_path_buf())
    }

    fn eval(&self, executable: &Path, _args: &[String]) -> Result<i32> {
        Err(BackendError::BuildFailed {
            artifact: executable.display().to_string(),
            message: "this backend cannot evaluate artifacts".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_extensions_follow_backend() {
        let mut config = CompilerConfig::default();
        assert_eq!(runner_for(&config).extension(), "js");
        config.backend = BackendKind::Chez;
        assert_eq!(runner_for(&config).extension(), "ss");
        config.backend = BackendKind::Core;
        assert_eq!(runner_for(&config).extension(), "mcore.json");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_launcher_is_executable_shell_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("main.js");
        std::fs::write(&artifact, "process.exit(0)\n").unwrap();

        let launcher = write_launcher(&artifact, "node").unwrap();
        let text = std::fs::read_to_string(&launcher).unwrap();
        assert!(text.starts_with("#!/bin/sh"));
        assert!(text.contains("node"));
    }
}
