use std::sync::Arc;

use picoclaw_skills::{SkillContext, SkillRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};

/// Default iteration cap for a top-level request (spec.md §4.5).
pub const DEFAULT_MAX_ITERATIONS: usize = 8;
/// Default iteration cap for a subagent's nested loop.
pub const DEFAULT_SUBAGENT_MAX_ITERATIONS: usize = 10;

/// Resolve a tool call's name from either the top-level `name` field or a
/// nested `function.name` field, and its arguments from either a JSON
/// object or a JSON-encoded string (spec.md §4.5).
fn resolve_call(call: &serde_json::Value) -> Option<(String, String, serde_json::Value)> {
    let id = call.get("id").and_then(|v| v.as_str()).unwrap_or("call_0").to_string();

    let (name, raw_input) = if let Some(function) = call.get("function") {
        let name = function.get("name").and_then(|v| v.as_str())?.to_string();
        (name, function.get("arguments").cloned())
    } else {
        let name = call.get("name").and_then(|v| v.as_str())?.to_string();
        (name, call.get("input").cloned().or_else(|| call.get("arguments").cloned()))
    };

    let args = match raw_input {
        Some(serde_json::Value::String(s)) => serde_json::from_str(&s).unwrap_or(serde_json::Value::Null),
        Some(v) => v,
        None => serde_json::Value::Null,
    };

    Some((id, name, args))
}

/// Run the bounded tool-call loop: LM → tool calls → skill registry →
/// extended transcript → LM again, until the reply carries no more tool
/// calls, the iteration cap is hit, or the provider errors.
///
/// Generalizes the teacher's `tool_loop.rs` state machine from a flat
/// `Tool` list / plain `content`/`is_error` result to a name-keyed
/// `SkillRegistry` and the `forLLM`/`forUser`/`silent`/`async` semantics
/// of [`picoclaw_skills::ToolResult`].
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    registry: &SkillRegistry,
    ctx: &SkillContext,
    initial_request: ChatRequest,
    max_iterations: usize,
    cancel: CancellationToken,
) -> Result<ChatResponse, ProviderError> {
    let mut raw_messages: Vec<serde_json::Value> = if let Some(ref raw) = initial_request.raw_messages {
        raw.clone()
    } else {
        initial_request
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
            .collect()
    };

    let mut last_response: Option<ChatResponse> = None;

    for iteration in 0..max_iterations {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let mut req = initial_request.clone();
        req.raw_messages = Some(raw_messages.clone());

        debug!(iteration, "tool loop iteration");

        let response = tokio::select! {
            resp = provider.send(&req) => resp?,
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        };

        if !response.wants_tool_use() {
            info!(iteration, "tool loop complete — no more tool calls");
            return Ok(response);
        }

        let mut assistant_content: Vec<serde_json::Value> = Vec::new();
        if !response.content.is_empty() {
            assistant_content.push(serde_json::json!({ "type": "text", "text": response.content }));
        }
        for call in &response.tool_calls {
            assistant_content.push(serde_json::json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.input,
            }));
        }
        raw_messages.push(serde_json::json!({ "role": "assistant", "content": assistant_content }));

        let mut tool_result_content: Vec<serde_json::Value> = Vec::new();
        for call in &response.tool_calls {
            let raw_call = serde_json::json!({ "id": call.id, "name": call.name, "input": call.input });
            let Some((id, name, args)) = resolve_call(&raw_call) else {
                warn!("tool call missing a resolvable name, skipping");
                continue;
            };

            let result = registry.execute(&name, ctx, args).await;
            let result = match result {
                Ok(r) => r,
                Err(e) => picoclaw_skills::ToolResult::error(e.to_string()),
            };

            if result.silent {
                debug!(tool = %name, "tool result is silent, skipping transcript append");
                continue;
            }

            tool_result_content.push(serde_json::json!({
                "type": "tool_result",
                "tool_use_id": id,
                "content": result.transcript_text(),
                "is_error": result.is_error,
            }));
        }

        if !tool_result_content.is_empty() {
            raw_messages.push(serde_json::json!({ "role": "user", "content": tool_result_content }));
        }

        last_response = Some(response);
    }

    warn!(max_iterations, "tool loop hit maximum iterations");

    // Terminate on cap with the last assistant content returned as-is
    // (spec.md §4.5 point 4) — not an error.
    last_response.ok_or_else(|| {
        ProviderError::Parse(format!("tool loop exceeded {max_iterations} iterations without a response"))
    })
}

/// Convenience wrapper carrying a shared provider/registry pair, used by
/// the scheduler fabric and the skillpack's subagent-spawning skills.
pub struct ToolLoopRunner {
    pub provider: Arc<dyn LlmProvider>,
    pub registry: Arc<SkillRegistry>,
}

impl ToolLoopRunner {
    pub fn new(provider: Arc<dyn LlmProvider>, registry: Arc<SkillRegistry>) -> Self {
        Self { provider, registry }
    }

    pub async fn run(
        &self,
        ctx: &SkillContext,
        request: ChatRequest,
        max_iterations: usize,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, ProviderError> {
        run_tool_loop(self.provider.as_ref(), &self.registry, ctx, request, max_iterations, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_call_reads_top_level_name_and_object_input() {
        let call = serde_json::json!({"id": "1", "name": "task", "input": {"command": "analyze_tasks"}});
        let (id, name, args) = resolve_call(&call).unwrap();
        assert_eq!(id, "1");
        assert_eq!(name, "task");
        assert_eq!(args["command"], "analyze_tasks");
    }

    #[test]
    fn resolve_call_reads_nested_function_name_and_string_arguments() {
        let call = serde_json::json!({
            "id": "2",
            "function": {"name": "news", "arguments": "{\"command\":\"fetch\"}"}
        });
        let (id, name, args) = resolve_call(&call).unwrap();
        assert_eq!(id, "2");
        assert_eq!(name, "news");
        assert_eq!(args["command"], "fetch");
    }

    #[test]
    fn resolve_call_missing_name_returns_none() {
        let call = serde_json::json!({"id": "3", "input": {}});
        assert!(resolve_call(&call).is_none());
    }
}
