use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Deserialize;
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, error, info, warn};

use crate::config::{FETCH_BATCH_SIZE, HISTORY_LIMIT, LspConfig, data_dir, db_path};
use crate::lsp::code_action::{
    ALL_COMMANDS, HISTORY_COMMAND, RECORD_UPDATES_COMMAND, REFRESH_COMMAND, RecordUpdatesArgs,
    generate_code_actions,
};
use crate::lsp::diagnostics::generate_diagnostics;
use crate::lsp::refresh::{DocumentSession, RefreshObserver, refresh_stale_packages};
use crate::lsp::resolver::{PackageResolver, create_default_resolvers};
use crate::parser::traits::ParseError;
use crate::parser::types::RegistryType;
use crate::update::view::{DocumentView, RefreshSummary};
use crate::version::cache::MetadataCache;
use crate::version::client::RegistryClient;
use crate::version::history::{UpdateEvent, UpdateHistory};
use crate::version::store::{KeyValueStore, SqliteStore};
use crate::version::types::now_ms;

/// Capability table and cache-backed client of one enabled environment
struct Environment<S: KeyValueStore> {
    resolver: PackageResolver,
    client: Arc<RegistryClient<S>>,
}

struct OpenDocument {
    content: String,
    session: Arc<DocumentSession>,
}

#[derive(Debug, Deserialize)]
struct RefreshArgs {
    uri: Url,
}

pub struct Backend<S: KeyValueStore> {
    client: Client,
    store: Option<Arc<S>>,
    history: Option<Arc<UpdateHistory<S>>>,
    // Injected resolvers, consumed on initialize
    resolvers: Mutex<Option<HashMap<RegistryType, PackageResolver>>>,
    environments: RwLock<HashMap<RegistryType, Arc<Environment<S>>>>,
    documents: RwLock<HashMap<Url, OpenDocument>>,
}

impl Backend<SqliteStore> {
    pub fn new(client: Client) -> Self {
        let store = Self::initialize_store();
        Self::with_parts(client, store, None)
    }

    fn initialize_store() -> Option<Arc<SqliteStore>> {
        let data_dir = data_dir();
        let db_path = db_path();

        if let Err(e) = std::fs::create_dir_all(&data_dir) {
            error!("Failed to create data directory {:?}: {}", data_dir, e);
            return None;
        }

        match SqliteStore::new(&db_path) {
            Ok(store) => {
                info!("Store initialized at {:?}", db_path);
                Some(Arc::new(store))
            }
            Err(e) => {
                error!("Failed to initialize store: {}", e);
                None
            }
        }
    }
}

impl<S: KeyValueStore> Backend<S> {
    /// Build a Backend with a custom store and resolvers
    pub fn build(
        client: Client,
        store: Arc<S>,
        resolvers: HashMap<RegistryType, PackageResolver>,
    ) -> Self {
        Self::with_parts(client, Some(store), Some(resolvers))
    }

    fn with_parts(
        client: Client,
        store: Option<Arc<S>>,
        resolvers: Option<HashMap<RegistryType, PackageResolver>>,
    ) -> Self {
        let history = store
            .as_ref()
            .map(|store| Arc::new(UpdateHistory::new(store.clone())));
        Self {
            client,
            store,
            history,
            resolvers: Mutex::new(resolvers),
            environments: RwLock::new(HashMap::new()),
            documents: RwLock::new(HashMap::new()),
        }
    }

    pub fn server_capabilities() -> ServerCapabilities {
        ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Options(
                TextDocumentSyncOptions {
                    open_close: Some(true),
                    change: Some(TextDocumentSyncKind::FULL),
                    save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                        include_text: Some(true),
                    })),
                    ..Default::default()
                },
            )),
            inlay_hint_provider: Some(OneOf::Left(true)),
            code_action_provider: Some(CodeActionProviderCapability::Simple(true)),
            execute_command_provider: Some(ExecuteCommandOptions {
                commands: ALL_COMMANDS.iter().map(|c| c.to_string()).collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Wire every enabled environment to the shared metadata cache
    fn initialize_environments(&self, config: &LspConfig) {
        let Some(store) = self.store.clone() else {
            warn!("Store not available, no environment will be refreshed");
            return;
        };

        let injected = self
            .resolvers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let resolvers = match injected {
            Some(resolvers) => resolvers
                .into_iter()
                .filter(|(registry_type, _)| config.registries.get(*registry_type).enabled)
                .collect(),
            None => create_default_resolvers(&config.registries)
                .inspect_err(|e| error!("Failed to create registries: {}", e))
                .unwrap_or_default(),
        };

        let cache = Arc::new(MetadataCache::new(store, config.cache.refresh_interval));
        let environments = resolvers
            .into_iter()
            .map(|(registry_type, resolver)| {
                let client = RegistryClient::new(resolver.registry().clone(), cache.clone());
                let environment = Environment {
                    resolver,
                    client: Arc::new(client),
                };
                (registry_type, Arc::new(environment))
            })
            .collect();

        *self
            .environments
            .write()
            .unwrap_or_else(PoisonError::into_inner) = environments;
    }

    /// The enabled environment whose parser handles `uri`
    fn detect_environment(&self, uri: &Url) -> Option<(RegistryType, Arc<Environment<S>>)> {
        self.environments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(_, environment)| environment.resolver.detect(uri.as_str()))
            .map(|(registry_type, environment)| (*registry_type, environment.clone()))
    }

    fn environment(&self, registry_type: RegistryType) -> Option<Arc<Environment<S>>> {
        self.environments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&registry_type)
            .cloned()
    }

    fn spawn_background_refresh(&self) {
        let clients: Vec<_> = self
            .environments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|environment| environment.client.clone())
            .collect();

        for client in clients {
            tokio::spawn(async move {
                let refreshed = refresh_stale_packages(&client, FETCH_BATCH_SIZE).await;
                if refreshed > 0 {
                    info!(
                        "Refreshed {} stale packages for {}",
                        refreshed,
                        client.registry_type().as_str()
                    );
                }
            });
        }
    }

    /// Store the latest content and submit a refresh task for it
    fn submit_refresh(&self, uri: Url, content: String) {
        let Some((registry_type, environment)) = self.detect_environment(&uri) else {
            debug!("No environment enabled for {}", uri);
            return;
        };

        let session = {
            let mut documents = self
                .documents
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let document = documents.entry(uri.clone()).or_insert_with(|| OpenDocument {
                content: String::new(),
                session: Arc::new(DocumentSession::new(registry_type)),
            });
            document.content = content.clone();
            document.session.clone()
        };

        let observer = LspRefreshObserver {
            client: self.client.clone(),
            uri,
        };

        tokio::spawn(async move {
            session
                .refresh(
                    &content,
                    &**environment.resolver.parser(),
                    &environment.client,
                    &observer,
                    FETCH_BATCH_SIZE,
                )
                .await;
        });
    }

    fn document(&self, uri: &Url) -> Option<(String, Arc<DocumentSession>)> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .map(|document| (document.content.clone(), document.session.clone()))
    }

    async fn record_updates(&self, args: RecordUpdatesArgs) -> Result<()> {
        let Some((_, session)) = self.document(&args.uri) else {
            return Err(Error::invalid_params(format!(
                "Document not open: {}",
                args.uri
            )));
        };
        let environment_id = session.registry_type().as_str();

        let mut events = Vec::with_capacity(args.updates.len());
        for update in args.updates {
            if !session.mark_updated(&update.name, update.section, &update.to_constraint) {
                warn!("{} is no longer declared in {}", update.name, args.uri);
            }
            events.push(UpdateEvent {
                package_name: update.name,
                environment_id: environment_id.to_string(),
                from_constraint: update.from_constraint,
                to_version: update.to_constraint,
                classification: update.classification,
                applied_at: now_ms(),
            });
        }

        if let Some(history) = &self.history {
            let count = events.len();
            match history.append_all(events) {
                Ok(()) => info!("Recorded {} updates for {}", count, args.uri),
                Err(e) => error!("Failed to record update history: {}", e),
            }
        }

        let view = session.view();
        self.client
            .publish_diagnostics(args.uri, generate_diagnostics(&view), None)
            .await;
        spawn_inlay_hint_refresh(&self.client);
        Ok(())
    }

    fn recent_history(&self) -> Result<serde_json::Value> {
        let Some(history) = &self.history else {
            return Ok(serde_json::Value::Array(Vec::new()));
        };

        let events = history.recent(HISTORY_LIMIT).map_err(|e| {
            error!("Failed to read update history: {}", e);
            Error::internal_error()
        })?;
        serde_json::to_value(events).map_err(|_| Error::internal_error())
    }
}

fn parse_argument<T: for<'de> Deserialize<'de>>(arguments: Vec<serde_json::Value>) -> Result<T> {
    let argument = arguments
        .into_iter()
        .next()
        .ok_or_else(|| Error::invalid_params("Missing command argument"))?;
    serde_json::from_value(argument).map_err(|e| Error::invalid_params(e.to_string()))
}

/// Ask the client to re-request inlay hints without waiting for the answer
fn spawn_inlay_hint_refresh(client: &Client) {
    let client = client.clone();
    tokio::spawn(async move {
        if let Err(e) = client.inlay_hint_refresh().await {
            debug!("Inlay hint refresh failed: {}", e);
        }
    });
}

/// Publishes refresh progress for one document to the editor
struct LspRefreshObserver {
    client: Client,
    uri: Url,
}

#[async_trait::async_trait]
impl RefreshObserver for LspRefreshObserver {
    async fn on_batch_complete(&self, batch: usize, total: usize, view: &DocumentView) {
        debug!("Batch {}/{} settled for {}", batch, total, self.uri);
        self.client
            .publish_diagnostics(self.uri.clone(), generate_diagnostics(view), None)
            .await;
        spawn_inlay_hint_refresh(&self.client);
    }

    async fn on_settled(&self, summary: &RefreshSummary, view: &DocumentView) {
        self.client
            .publish_diagnostics(self.uri.clone(), generate_diagnostics(view), None)
            .await;
        self.client
            .log_message(MessageType::INFO, format!("{}: {}", self.uri, summary))
            .await;
        spawn_inlay_hint_refresh(&self.client);
    }

    async fn on_parse_error(&self, error: &ParseError) {
        self.client
            .publish_diagnostics(self.uri.clone(), Vec::new(), None)
            .await;
        self.client
            .show_message(
                MessageType::WARNING,
                format!("Failed to parse {}: {}", self.uri, error),
            )
            .await;
    }
}

#[tower_lsp::async_trait]
impl<S: KeyValueStore> LanguageServer for Backend<S> {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let config = params
            .initialization_options
            .map(serde_json::from_value::<LspConfig>)
            .transpose()
            .inspect_err(|e| warn!("Invalid initialization options, using defaults: {}", e))
            .ok()
            .flatten()
            .unwrap_or_default();
        info!("Configuration: {:?}", config);

        self.initialize_environments(&config);

        Ok(InitializeResult {
            capabilities: Self::server_capabilities(),
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "LSP server initialized")
            .await;
        self.spawn_background_refresh();
    }

    async fn shutdown(&self) -> Result<()> {
        info!("LSP server shutting down");
        for document in self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            document.session.cancel();
        }
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        debug!("Document opened: {}", params.text_document.uri);
        self.submit_refresh(params.text_document.uri, params.text_document.text);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // With FULL sync mode, the last content change contains the full document text
        let Some(content) = params.content_changes.into_iter().last().map(|c| c.text) else {
            return;
        };

        debug!("Document changed: {}", params.text_document.uri);
        self.submit_refresh(params.text_document.uri, content);
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        let content = match params.text {
            Some(text) => text,
            None => match self.document(&uri) {
                Some((content, _)) => content,
                None => return,
            },
        };

        debug!("Document saved: {}", uri);
        self.submit_refresh(uri, content);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        debug!("Document closed: {}", uri);

        let removed = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&uri);
        if let Some(document) = removed {
            document.session.cancel();
        }

        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn inlay_hint(&self, params: InlayHintParams) -> Result<Option<Vec<InlayHint>>> {
        let Some((_, session)) = self.document(&params.text_document.uri) else {
            return Ok(None);
        };

        let range = params.range;
        let hints = session
            .view()
            .annotations()
            .into_iter()
            .filter(|a| {
                let line = a.line as u32;
                line >= range.start.line && line <= range.end.line
            })
            .map(|a| InlayHint {
                // Past the closing quote of the version value
                position: Position {
                    line: a.line as u32,
                    character: a.end_column as u32 + 1,
                },
                label: InlayHintLabel::String(a.title),
                kind: None,
                text_edits: None,
                tooltip: Some(InlayHintTooltip::String(a.tooltip)),
                padding_left: Some(true),
                padding_right: None,
                data: None,
            })
            .collect();

        Ok(Some(hints))
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let uri = params.text_document.uri;
        let Some((content, session)) = self.document(&uri) else {
            return Ok(None);
        };
        let Some(environment) = self.environment(session.registry_type()) else {
            return Ok(None);
        };

        let actions = generate_code_actions(
            &uri,
            &content,
            &environment.resolver,
            &session.view(),
            params.range.start,
        );

        if actions.is_empty() {
            return Ok(None);
        }

        Ok(Some(
            actions
                .into_iter()
                .map(CodeActionOrCommand::CodeAction)
                .collect(),
        ))
    }

    async fn execute_command(
        &self,
        params: ExecuteCommandParams,
    ) -> Result<Option<serde_json::Value>> {
        match params.command.as_str() {
            RECORD_UPDATES_COMMAND => {
                let args: RecordUpdatesArgs = parse_argument(params.arguments)?;
                self.record_updates(args).await?;
                Ok(None)
            }
            REFRESH_COMMAND => {
                let args: RefreshArgs = parse_argument(params.arguments)?;
                let Some((content, _)) = self.document(&args.uri) else {
                    return Err(Error::invalid_params(format!(
                        "Document not open: {}",
                        args.uri
                    )));
                };
                self.submit_refresh(args.uri, content);
                Ok(None)
            }
            HISTORY_COMMAND => self.recent_history().map(Some),
            _ => {
                warn!("Unknown command: {}", params.command);
                Err(Error::method_not_found())
            }
        }
    }
}
