//! Tool context and error types (spec §4.6, C6).
//!
//! Grounded in `querymt_agent::tools::context::{ToolContext, Tool,
//! ToolError}`, trimmed of delegation/elicitation/ask_question machinery
//! this spec has no use for, and extended with the working-directory
//! containment check spec §4.6 requires of every tool invocation.

use async_trait::async_trait;
use std::any::Any;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use agentworld_llm::Tool as ToolDefinition;

/// Capability requirements a tool declares; used by the registry to decide
/// whether a tool can run in a world lacking a working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CapabilityRequirement {
    Filesystem,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("execution error: {0}")]
    Execution(String),
    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Normalizes `path` (resolving `.`/`..` components and `~`/`~/...` against
/// `home`, without requiring the path to exist) and checks it falls under
/// `root`. Returns the normalized path on success, or the exact violation
/// string spec §4.6 requires ("Working directory mismatch: <path>") on
/// failure.
pub fn check_containment(root: &Path, path: &Path, home: Option<&Path>) -> Result<PathBuf, String> {
    let expanded = expand_tilde(path, home);
    let normalized = normalize_path(&expanded);
    let normalized_root = normalize_path(root);

    if normalized.starts_with(&normalized_root) {
        Ok(normalized)
    } else {
        Err(format!("Working directory mismatch: {}", path.display()))
    }
}

fn expand_tilde(path: &Path, home: Option<&Path>) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = home {
            return home.join(rest);
        }
    } else if s == "~" {
        if let Some(home) = home {
            return home.to_path_buf();
        }
    }
    path.to_path_buf()
}

/// Lexical normalization (no filesystem access): collapses `.` and resolves
/// `..` against preceding components without following symlinks.
fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !matches!(out.components().next_back(), None | Some(Component::RootDir)) {
                    out.pop();
                }
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Everything a tool needs from the world it runs inside.
#[async_trait]
pub trait ToolContext: Send + Sync {
    fn world_id(&self) -> &str;

    /// The enforced filesystem root (spec §4.6: derived from
    /// `world.variables`'s `working_directory` entry), if the world has one.
    fn working_directory(&self) -> Option<&Path>;

    /// Home directory used for tilde-expansion during containment checks.
    fn home_dir(&self) -> Option<&Path> {
        None
    }

    fn cancellation_token(&self) -> CancellationToken;

    /// Resolve `path` relative to [`ToolContext::working_directory`] (or
    /// pass through if absolute) and enforce containment. Returns the
    /// spec-mandated violation string as `Err` rather than a hard error —
    /// callers decide whether that becomes the tool's entire string result.
    fn resolve_and_check(&self, path: &str) -> Result<PathBuf, String> {
        let candidate = Path::new(path);
        let root = self.working_directory().unwrap_or_else(|| Path::new("."));
        let absolute = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            root.join(candidate)
        };
        check_containment(root, &absolute, self.home_dir())
    }

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    fn required_capabilities(&self) -> &'static [CapabilityRequirement] {
        &[]
    }

    /// Optional truncation hint shown to callers when output is long
    /// (spec §11 supplementary feature; unused by default).
    fn truncation_hint(&self) -> Option<&'static str> {
        None
    }

    async fn call(&self, args: serde_json::Value, context: &dyn ToolContext) -> Result<String, ToolError>;
}
