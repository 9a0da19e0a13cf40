pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the handlers to make them easily accessible
// to the binary that builds the web server router.
pub use middleware::require_tenant;
pub use rest::{
    add_document_handler, delete_document_handler, list_documents_handler, widget_chat_handler,
    widget_config_handler,
};
pub use ws_handler::console_ws_handler;
