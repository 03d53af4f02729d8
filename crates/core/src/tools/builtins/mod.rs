pub mod load_skill;
pub mod ls;
pub mod read_file;
pub mod search_text;
pub mod shell;

pub use load_skill::LoadSkillTool;
pub use ls::ListFilesTool;
pub use read_file::ReadFileTool;
pub use search_text::GrepTool;
pub use shell::ShellCmdTool;

use crate::tools::{Tool, ToolRegistry};
use std::sync::Arc;

/// Registers every built-in tool (spec §4.6: always available to every
/// world), including the `grep_search` alias for `grep`.
pub fn register_builtins(registry: &mut ToolRegistry) {
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(ShellCmdTool::new()),
        Arc::new(LoadSkillTool::new()),
        Arc::new(ReadFileTool::new()),
        Arc::new(ListFilesTool::new()),
        Arc::new(GrepTool::new()),
    ];
    for tool in tools {
        registry.add(tool);
    }
    registry.add_alias("grep_search", "grep");
}
