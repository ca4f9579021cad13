pub mod agent_context;
pub mod conversation_context;
pub mod query_service;
