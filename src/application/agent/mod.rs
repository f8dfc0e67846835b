mod errors;
mod models;
mod prompts;
mod runner;

pub use errors::AgentError;
pub use models::{ReviewOutcome, ReviewStep};
pub use runner::ReviewAgent;
