// Multi-LLM round-table conversation engine
//
// Several language models hold a structured conversation in a "room": a
// seeded persona cast, a four-act turn scheduler, a generation pipeline with
// failure accounting, and broadcast fan-out to live observers. The HTTP and
// WebSocket layer in `http_server` is one transport over the engine; the
// `RoomManager` API is usable directly.

pub mod broadcast;
pub mod error;
pub mod http_server;
pub mod llm_client;
pub mod openrouter;
pub mod orchestrator;
pub mod persona;
pub mod scheduler;
pub mod settings;
pub mod types;

pub use broadcast::{Subscriber, SubscriberId};
pub use error::RoomError;
pub use llm_client::{GenerationClient, GenerationRequest};
pub use openrouter::OpenRouterClient;
pub use orchestrator::RoomManager;
pub use settings::Settings;
