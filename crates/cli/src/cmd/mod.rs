mod cache;
mod plan;
mod run;

pub use cache::{cmd_cache_clean, cmd_cache_list};
pub use plan::cmd_plan;
pub use run::cmd_run;
