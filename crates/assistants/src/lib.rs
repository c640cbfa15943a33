//! Client side of the upstream "thread + run" conversational service.

pub mod openai;
pub mod sse;
pub mod traits;
pub(crate) mod util;

pub use openai::OpenAiAssistants;
pub use sse::{extract_delta, relay_deltas};
pub use traits::AssistantsApi;
pub use util::resolve_api_key;
