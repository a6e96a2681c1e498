//! Translation between the Poe bot protocol and `OpenAI` chat completions.
//!
//! Converts conversation history into completion requests and streamed
//! completion chunks into Poe partial responses. All functions here are pure
//! (no I/O).

pub mod openai_types;
pub mod poe_types;
pub mod request;
pub mod streaming;
