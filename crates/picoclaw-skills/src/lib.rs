//! The skill runtime: the `Skill` trait, the uniform `ToolResult` shape,
//! per-skill `Workspace` isolation, and a name-keyed `SkillRegistry`. See
//! spec.md §4.4.

pub mod registry;
pub mod result;
pub mod skill;
pub mod workspace;

pub use registry::{SkillRegistry, ToolDefinition};
pub use result::ToolResult;
pub use skill::{Skill, SkillContext};
pub use workspace::Workspace;
