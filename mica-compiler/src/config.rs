//! Compiler configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which backend the driver targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The reference JavaScript monadic backend
    Js,
    /// ChezScheme
    Chez,
    /// LLVM native
    Llvm,
    /// Standard ML
    Ml,
    /// The JIT
    Jit,
    /// Serialized core, for tooling
    Core,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Js
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "js" => Ok(BackendKind::Js),
            "chez" => Ok(BackendKind::Chez),
            "llvm" => Ok(BackendKind::Llvm),
            "ml" => Ok(BackendKind::Ml),
            "jit" => Ok(BackendKind::Jit),
            "core" => Ok(BackendKind::Core),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Driver configuration, assembled from CLI flags and the environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    pub backend: BackendKind,
    /// Where generated artifacts land
    pub output_dir: PathBuf,
    /// The standard library root handed to backends for include resolution
    pub stdlib_path: Option<PathBuf>,
    /// Additional include directories
    pub include_paths: Vec<PathBuf>,
    /// Extra libraries forwarded to the native linker
    pub gcc_libraries: Vec<String>,
    /// Extra include directories forwarded to the native compiler
    pub gcc_includes: Vec<PathBuf>,
    /// Explicit JIT binary; otherwise `MICA_JIT_BIN` is consulted
    pub jit_binary: Option<PathBuf>,
    /// Additive debug output
    pub debug: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            backend: BackendKind::default(),
            output_dir: PathBuf::from("out"),
            stdlib_path: None,
            include_paths: Vec::new(),
            gcc_libraries: Vec::new(),
            gcc_includes: Vec::new(),
            jit_binary: None,
            debug: false,
        }
    }
}

impl CompilerConfig {
    /// The JIT binary search path: the explicit setting wins, then the
    /// `MICA_JIT_BIN` environment variable
    pub fn jit_binary(&self) -> Option<PathBuf> {
        self.jit_binary
            .clone()
            .or_else(|| std::env::var_os("MICA_JIT_BIN").map(PathBuf::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("js".parse::<BackendKind>(), Ok(BackendKind::Js));
        assert_eq!("llvm".parse::<BackendKind>(), Ok(BackendKind::Llvm));
        assert!("cobol".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.backend, BackendKind::Js);
        assert!(!config.debug);
    }
}
