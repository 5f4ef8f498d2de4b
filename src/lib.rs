//! Chat relay: forwards browser chat prompts to Gemini and contact forms to SMTP.

pub mod api;
pub mod chat;
pub mod config;
pub mod contact;
pub mod error;
pub mod guard;
pub mod llm;
pub mod mail;
pub mod relay;
