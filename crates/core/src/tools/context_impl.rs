//! Default [`ToolContext`] implementation (spec §4.6, C6).
//!
//! Grounded in `querymt_agent::tools::context_impl::AgentToolContext`, with
//! the MCP elicitation/`ask_question`/agent-registry fields dropped (this
//! spec has no delegation concept) and a `working_directory` root added —
//! distinct from the teacher's plain `cwd`, since containment is enforced
//! against it rather than just used to join relative paths.

use std::any::Any;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use super::context::ToolContext;

pub struct AgentToolContext {
    world_id: String,
    working_directory: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    cancellation_token: CancellationToken,
}

impl AgentToolContext {
    pub fn new(world_id: impl Into<String>, working_directory: Option<PathBuf>) -> Self {
        Self {
            world_id: world_id.into(),
            working_directory,
            home_dir: std::env::var_os("HOME").map(PathBuf::from),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// No working directory at all: tools requiring
    /// `CapabilityRequirement::Filesystem` (spec §4.6) are excluded from
    /// such a world's registry entirely.
    pub fn without_working_directory(world_id: impl Into<String>) -> Self {
        Self::new(world_id, None)
    }
}

impl ToolContext for AgentToolContext {
    fn world_id(&self) -> &str {
        &self.world_id
    }

    fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    fn home_dir(&self) -> Option<&Path> {
        self.home_dir.as_deref()
    }

    fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
