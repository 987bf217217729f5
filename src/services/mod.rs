pub mod error;
pub mod ingest;
pub mod metadata_store;
pub mod object_store;
pub mod reconciler;
pub mod retrieval;
pub mod staging;
