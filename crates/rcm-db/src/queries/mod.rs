pub mod agent_runs;
pub mod appeals;
pub mod claims;
pub mod denials;
