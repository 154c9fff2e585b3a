//! LLM integration for archforge.
//!
//! This module provides the chat-completion client used by the step agents.
//! All agents talk to an OpenAI-compatible endpoint (a direct provider or a
//! gateway that proxies multiple vendors behind one API), so a single client
//! covers the vision, evaluation, and code-generation models.
//!
//! ```ignore
//! use archforge::llm::{ChatClient, GenerationRequest, Message};
//!
//! let client = ChatClient::from_env()?;
//! let request = GenerationRequest::new(
//!     "gpt-4o",
//!     vec![
//!         Message::system("You are a helpful assistant."),
//!         Message::user("Hello!"),
//!     ],
//! );
//! let response = client.generate(request).await?;
//! ```

pub mod chat;

pub use chat::{
    ChatClient, Choice, ContentPart, GenerationRequest, GenerationResponse, LlmProvider, Message,
    MessageContent, Usage,
};
