pub mod llm;
pub mod mcp_hub;
pub mod query;

pub use mcp_hub::McpHub;
pub use query::process_query;
