pub mod event;
pub mod provider;
pub mod request;

pub use event::{encode_delta_line, OutputEvent};
pub use provider::{Provider, UnknownProvider};
pub use request::{normalize, ChatMessage, ChatRequest, NormalizedChatRequest, Role};
