// src/chat/mod.rs — Conversations: turn log, session store, chat engine

pub mod engine;
pub mod history;
pub mod sessions;

pub use engine::{ChatEngine, ChatOutcome, ChatSendRequest};
pub use history::{assemble_context, EntryRole, TurnEntry};
pub use sessions::{Conversation, SessionStore};
