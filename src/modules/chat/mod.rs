pub mod followups;
pub mod memory;
pub mod protocol;
pub mod registry;
pub mod session;

pub use protocol::{ChatResponse, MessageKind, Outbox};
pub use registry::SessionRegistry;
pub use session::{ChatEngine, ChatSession};
