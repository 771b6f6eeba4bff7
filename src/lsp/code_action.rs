//! Code action generation for applying updates

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::{
    CodeAction, CodeActionKind, Command, Position, Range, TextEdit, Url, WorkspaceEdit,
};
use tracing::warn;

use crate::lsp::resolver::PackageResolver;
use crate::parser::types::DependencySection;
use crate::update::mutator::{Replacement, UpdateFilter};
use crate::update::view::{DependencyView, DocumentView, UpdateAction};
use crate::version::classifier::UpdateClassification;

/// Records applied updates in the history and reclassifies the view
pub const RECORD_UPDATES_COMMAND: &str = "manifest-lens.recordUpdates";
/// Starts a refresh of the given document
pub const REFRESH_COMMAND: &str = "manifest-lens.refresh";
/// Returns the most recent update history entries
pub const HISTORY_COMMAND: &str = "manifest-lens.history";

pub const ALL_COMMANDS: [&str; 3] = [RECORD_UPDATES_COMMAND, REFRESH_COMMAND, HISTORY_COMMAND];

/// One update carried by a code action, recorded once the edit is applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedUpdate {
    pub name: String,
    pub section: DependencySection,
    pub from_constraint: String,
    pub to_constraint: String,
    pub classification: UpdateClassification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdatesArgs {
    pub uri: Url,
    pub updates: Vec<AppliedUpdate>,
}

/// Index of dependencies grouped by line number for efficient lookup
pub struct PackageIndex<'a> {
    by_line: HashMap<u32, Vec<&'a DependencyView>>,
}

impl<'a> PackageIndex<'a> {
    /// Build an index from a slice of dependencies
    pub fn new(dependencies: &'a [DependencyView]) -> Self {
        let mut by_line: HashMap<u32, Vec<&'a DependencyView>> = HashMap::new();
        for dependency in dependencies {
            by_line
                .entry(dependency.package.line as u32)
                .or_default()
                .push(dependency);
        }
        Self { by_line }
    }

    /// Find the dependency whose version value contains the cursor
    pub fn find_at_position(&self, position: Position) -> Option<&'a DependencyView> {
        let on_line = self.by_line.get(&position.line)?;

        on_line.iter().copied().find(|dependency| {
            let start_col = dependency.package.column as u32;
            let end_col = start_col + dependency.package.version.len() as u32;
            position.character >= start_col && position.character <= end_col
        })
    }
}

/// Generate the update actions available at `position`
///
/// Returns the single-package action for the dependency under the cursor
/// followed by the bulk actions that apply to the whole document.
pub fn generate_code_actions(
    uri: &Url,
    content: &str,
    resolver: &PackageResolver,
    view: &DocumentView,
    position: Position,
) -> Vec<CodeAction> {
    let mut actions = Vec::new();

    let index = PackageIndex::new(view.dependencies());
    if let Some(dependency) = index.find_at_position(position)
        && let Some(action) = dependency.update_action()
    {
        match resolver.plan_update(content, &action.name, action.section, &action.version) {
            Ok(replacement) => actions.push(create_update_action(
                &format!("Update {} to {}", action.name, action.version),
                uri,
                view,
                vec![replacement],
                true,
            )),
            Err(e) => warn!("Cannot offer update for {}: {}", action.name, e),
        }
    }

    let bulk = [
        ("Update all dependencies", UpdateFilter::all()),
        ("Update all compatible dependencies", UpdateFilter::compatible()),
    ];
    for (title, filter) in bulk {
        let targets: Vec<UpdateAction> = view
            .update_targets(|c| filter.accepts(c))
            .into_iter()
            .map(|(action, _)| action)
            .collect();
        if targets.is_empty() {
            continue;
        }

        let plan = resolver.plan_bulk_update(content, &targets);
        if plan.replacements.is_empty() {
            continue;
        }
        actions.push(create_update_action(
            title,
            uri,
            view,
            plan.replacements,
            false,
        ));
    }

    actions
}

fn create_update_action(
    title: &str,
    uri: &Url,
    view: &DocumentView,
    replacements: Vec<Replacement>,
    preferred: bool,
) -> CodeAction {
    let edits = replacements.iter().map(create_text_edit).collect();
    let updates = replacements
        .into_iter()
        .filter_map(|r| {
            let classification = view.get(&r.name, r.section)?.classification?;
            Some(AppliedUpdate {
                name: r.name,
                section: r.section,
                from_constraint: r.old_text,
                to_constraint: r.new_text,
                classification,
            })
        })
        .collect();

    let mut changes = HashMap::new();
    changes.insert(uri.clone(), edits);

    let args = RecordUpdatesArgs {
        uri: uri.clone(),
        updates,
    };

    CodeAction {
        title: title.to_string(),
        kind: Some(CodeActionKind::QUICKFIX),
        edit: Some(WorkspaceEdit {
            changes: Some(changes),
            ..Default::default()
        }),
        command: serde_json::to_value(&args).ok().map(|arg| Command {
            title: title.to_string(),
            command: RECORD_UPDATES_COMMAND.to_string(),
            arguments: Some(vec![arg]),
        }),
        is_preferred: preferred.then_some(true),
        ..Default::default()
    }
}

fn create_text_edit(replacement: &Replacement) -> TextEdit {
    TextEdit {
        range: Range {
            start: Position {
                line: replacement.line as u32,
                character: replacement.column as u32,
            },
            end: Position {
                line: replacement.line as u32,
                character: replacement.end_column() as u32,
            },
        },
        new_text: replacement.new_text.clone(),
    }
}
