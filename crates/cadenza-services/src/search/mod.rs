pub mod client;
pub mod indexer;
