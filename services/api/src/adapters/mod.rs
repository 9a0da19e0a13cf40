pub mod claude_chat;
pub mod db;
pub mod openai_chat;
pub mod openai_embedding;

pub use claude_chat::ClaudeChatAdapter;
pub use db::PgStore;
pub use openai_chat::OpenAiChatAdapter;
pub use openai_embedding::OpenAiEmbeddingAdapter;
