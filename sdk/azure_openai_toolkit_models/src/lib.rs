#![doc = include_str!("../README.md")]

pub mod api;
pub mod batch;
pub mod chat;
pub mod responses;
pub mod session;

pub use api::ModelApi;
pub use session::{batch_chat, quick_chat, ChatOptions, ChatSession};
