pub mod builtins;
pub mod context;
pub mod context_impl;
pub mod registry;

pub use builtins::{GrepTool, ListFilesTool, LoadSkillTool, ReadFileTool, ShellCmdTool, register_builtins};
pub use context::{CapabilityRequirement, Tool, ToolContext, ToolError};
pub use context_impl::AgentToolContext;
pub use registry::ToolRegistry;
