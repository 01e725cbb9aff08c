use std::collections::HashMap;
use std::sync::Arc;

use picoclaw_core::error::{PicoclawError, Result};
use serde_json::Value;

use crate::result::ToolResult;
use crate::skill::{Skill, SkillContext};

/// Tool definition shape handed to an `LlmProvider` (name + description +
/// JSON-Schema parameters). Kept here rather than in `picoclaw-agent` so
/// the registry can build the list without a dependency cycle.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameter_schema: Value,
}

/// Name-keyed dispatch table of skills, generalizing the teacher's
/// fixed tool list (`tool_catalog()`/`to_definitions()`) to six concrete
/// skills served under one registry (spec.md §4.4).
#[derive(Clone, Default)]
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        self.skills.insert(skill.name().to_string(), skill);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.skills.get(name).cloned()
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.skills
            .values()
            .map(|s| ToolDefinition {
                name: s.name().to_string(),
                description: s.description().to_string(),
                parameter_schema: s.parameter_schema(),
            })
            .collect()
    }

    /// Dispatch to the named skill. Returns [`PicoclawError::ToolNotFound`]
    /// if no skill is registered under that name.
    pub async fn execute(&self, name: &str, ctx: &SkillContext, args: Value) -> Result<ToolResult> {
        let skill = self.skills.get(name).cloned().ok_or_else(|| PicoclawError::ToolNotFound {
            name: name.to_string(),
        })?;
        Ok(skill.execute(ctx, args).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::Workspace;
    use async_trait::async_trait;

    struct EchoSkill;

    #[async_trait]
    impl Skill for EchoSkill {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameter_schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {"command": {"type": "string", "enum": ["say"]}}, "required": ["command"]})
        }
        fn set_workspace(&self, _workspace: Workspace) -> Result<()> {
            Ok(())
        }
        async fn execute(&self, _ctx: &SkillContext, args: Value) -> ToolResult {
            ToolResult::success(args.to_string())
        }
    }

    #[tokio::test]
    async fn execute_dispatches_to_registered_skill() {
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(EchoSkill));

        let ctx = SkillContext::internal();
        let result = registry
            .execute("echo", &ctx, serde_json::json!({"command": "say"}))
            .await
            .unwrap();
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn execute_unknown_skill_is_tool_not_found() {
        let registry = SkillRegistry::new();
        let ctx = SkillContext::internal();
        let err = registry.execute("missing", &ctx, Value::Null).await.unwrap_err();
        assert!(matches!(err, PicoclawError::ToolNotFound { .. }));
    }

    #[test]
    fn tool_definitions_reflects_registered_skills() {
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(EchoSkill));
        let defs = registry.tool_definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }
}
