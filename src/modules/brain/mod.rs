pub mod analysis;
pub mod llm;
pub mod memory_index;
pub mod prompts;
pub mod rag;
#[cfg(test)]
pub mod testing;

pub use llm::{LanguageModel, OpenAiClient};
pub use memory_index::MemoryIdeaIndex;
pub use rag::{IdeaIndex, QdrantIdeaIndex};
