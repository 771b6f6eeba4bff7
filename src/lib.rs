pub mod config;
pub mod lsp;
pub mod parser;
pub mod update;
pub mod version;
