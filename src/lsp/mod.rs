//! LSP (Language Server Protocol) implementation layer
//!
//! This module connects editors to the refresh cycle: documents are parsed,
//! refreshed in batches and rendered as inlay hints, diagnostics and code
//! actions.
//!
//! # Modules
//!
//! - [`backend`]: Main LSP backend implementing `LanguageServer` trait
//! - [`code_action`]: Single and bulk update actions plus their commands
//! - [`diagnostics`]: Maps update classifications to diagnostics
//! - [`refresh`]: Per-document refresh cycle and stale cache refresh
//! - [`resolver`]: Groups parser and registry per environment
//! - [`server`]: LSP server initialization and lifecycle

pub mod backend;
pub mod code_action;
pub mod diagnostics;
pub mod refresh;
pub mod resolver;
pub mod server;
