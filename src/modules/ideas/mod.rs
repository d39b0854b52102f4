pub mod ingest;
pub mod structs;
pub mod summarizer;
pub mod text_serializer;

pub use ingest::{IdeaIngestor, IngestReport};
pub use structs::{IdeaRecord, Post};
