use async_trait::async_trait;
use picoclaw_core::error::Result;
use serde_json::Value;

use crate::result::ToolResult;
use crate::workspace::Workspace;

/// Context passed to a skill on each invocation: the channel the request
/// originated on, used by skills that need to address replies or
/// subagents back at the caller.
#[derive(Debug, Clone)]
pub struct SkillContext {
    pub origin: picoclaw_core::types::ChannelOrigin,
}

impl SkillContext {
    pub fn internal() -> Self {
        Self {
            origin: picoclaw_core::types::ChannelOrigin::internal(),
        }
    }
}

/// The capability surface every skill exposes (spec.md §4.4).
#[async_trait]
pub trait Skill: Send + Sync {
    /// Stable identifier used as the tool-call name.
    fn name(&self) -> &str;

    /// Narrative plus command list, shown to the LM.
    fn description(&self) -> &str;

    /// JSON-Schema-shaped object: `{type: object, properties: {...},
    /// required: [...]}`, where `command` is always present with a closed
    /// enum.
    fn parameter_schema(&self) -> Value;

    /// Idempotent: bind (or rebind) this skill to a workspace directory,
    /// creating it and its identity files if missing.
    fn set_workspace(&self, workspace: Workspace) -> Result<()>;

    /// Execute one command. Never panics across this boundary — callers
    /// that run skills in a task pool are expected to convert panics to
    /// [`ToolResult::error`] themselves.
    async fn execute(&self, ctx: &SkillContext, args: Value) -> ToolResult;
}
