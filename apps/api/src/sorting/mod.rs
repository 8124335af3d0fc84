pub mod flag;
pub mod handlers;
pub mod ingest;
pub mod registry;
