pub mod generator;
pub mod sentiment;

pub use generator::{
    sanitize_buyer_message, sanitize_template_value, ChatApi, ChatError, ChatRequest,
    DialogueGenerator, DialogueResponse, NimClient,
};
pub use sentiment::{detect_exit_intent, ExitIntent};
