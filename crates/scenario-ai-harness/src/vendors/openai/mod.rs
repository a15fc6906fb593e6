//! OpenAI-compatible chat-completions transport.
//!
//! Works against any server exposing `POST {base_url}/chat/completions` with
//! server-sent-event streaming (OpenAI, OpenRouter, llama.cpp, vLLM, Ollama).
mod adapter;
pub(crate) mod transport;

pub use adapter::OpenAiTransport;
