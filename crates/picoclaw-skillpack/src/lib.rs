pub mod briefing;
pub mod deadline;
pub mod format;
pub mod habit;
pub mod news;
pub mod research;
pub mod task;

pub use briefing::{BriefingSkill, BriefingSources};
pub use deadline::DeadlineSkill;
pub use habit::HabitSkill;
pub use news::NewsSkill;
pub use research::ResearchSkill;
pub use task::TaskSkill;
