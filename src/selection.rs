//! Active file / version / view mode, and the view model derived from them.

use chrono::{DateTime, Utc};

use crate::errors::ClientError;
use crate::ledger::{diff_against_latest, render_diff, version_label, versions_of, DiffLine};
use crate::models::{ComposeMode, Message, Session};

const DEFAULT_CHAT_TITLE: &str = "General Chat";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewMode {
    #[default]
    Chat,
    Diff,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Chat => ViewMode::Diff,
            ViewMode::Diff => ViewMode::Chat,
        }
    }
}

/// Which based file is shown, its working copy, and the diff selection.
/// An empty `file_name` means nothing is selected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    file_name: String,
    content: String,
    view_mode: ViewMode,
    version_id: Option<String>,
}

impl Selection {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn version_id(&self) -> Option<&str> {
        self.version_id.as_deref()
    }

    pub fn has_file(&self) -> bool {
        !self.file_name.is_empty()
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.has_file() && self.file_name == name
    }

    /// Points the editor at `name`. Changing the file clears the version.
    pub fn show(&mut self, name: &str, content: &str) {
        if self.file_name != name {
            self.version_id = None;
            self.file_name = name.to_string();
        }
        self.content = content.to_string();
    }

    pub fn clear(&mut self) {
        self.show("", "");
    }

    pub fn toggle_view(&mut self) -> ViewMode {
        self.view_mode = self.view_mode.toggled();
        self.view_mode
    }

    /// Local edit of the working copy; never saved.
    pub fn edit_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    /// Selects the based file `name` from the explorer.
    pub fn select_file(&mut self, session: &Session, name: &str) -> Result<(), ClientError> {
        let file = session
            .based_file(name)
            .ok_or_else(|| ClientError::UnknownFile { name: name.to_string() })?;
        self.show(&file.name, &file.latest_content);
        Ok(())
    }

    /// Chooses a version of the selected file for the diff pane.
    pub fn select_version(&mut self, session: &Session, version_id: &str) -> Result<(), ClientError> {
        let known = session
            .based_file(&self.file_name)
            .is_some_and(|f| f.version(version_id).is_some());
        if !known {
            return Err(ClientError::UnknownVersion {
                file_name: self.file_name.clone(),
                version_id: version_id.to_string(),
            });
        }
        self.version_id = Some(version_id.to_string());
        Ok(())
    }
}

// ── Derived view ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorPane {
    pub file_name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    pub version_id: String,
    pub label: String,
    pub timestamp: DateTime<Utc>,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffPane {
    pub file_name: String,
    /// Newest first.
    pub versions: Vec<VersionEntry>,
    /// Empty when the file has no version history.
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MainPane {
    Conversation(Vec<Message>),
    Diff(DiffPane),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewModel {
    pub title: String,
    pub models: Vec<String>,
    pub selected_model: String,
    pub compose_mode: ComposeMode,
    pub based_files: Vec<(String, String)>,
    pub context_files: Vec<(String, String)>,
    pub editor: EditorPane,
    pub main: MainPane,
}

impl Default for ViewModel {
    fn default() -> Self {
        derive_view(&Session::default(), &Selection::default())
    }
}

/// Everything the read-only surfaces render, recomputed from state.
pub fn derive_view(session: &Session, selection: &Selection) -> ViewModel {
    let title = if session.chat_title.is_empty() {
        DEFAULT_CHAT_TITLE.to_string()
    } else {
        session.chat_title.clone()
    };

    let main = match selection.view_mode() {
        ViewMode::Chat => MainPane::Conversation(session.conversation.clone()),
        ViewMode::Diff => MainPane::Diff(diff_pane(session, selection)),
    };

    ViewModel {
        title,
        models: session.available_models.clone(),
        selected_model: session.selected_model.clone(),
        compose_mode: session.compose_mode,
        based_files: session.based_files.iter().map(|f| (f.id.clone(), f.name.clone())).collect(),
        context_files: session.context_files.iter().map(|f| (f.id.clone(), f.name.clone())).collect(),
        editor: EditorPane {
            file_name: selection.file_name().to_string(),
            content: selection.content().to_string(),
        },
        main,
    }
}

fn diff_pane(session: &Session, selection: &Selection) -> DiffPane {
    let Some(file) = session.based_file(selection.file_name()) else {
        return DiffPane { file_name: selection.file_name().to_string(), versions: vec![], lines: vec![] };
    };

    let sorted = versions_of(file);
    let total = sorted.len();
    let versions = sorted
        .iter()
        .enumerate()
        .map(|(index, v)| VersionEntry {
            version_id: v.version_id.clone(),
            label: version_label(index, total),
            timestamp: v.timestamp,
            selected: selection.version_id() == Some(v.version_id.as_str()),
        })
        .collect();

    let lines = if total == 0 {
        vec![]
    } else {
        let diff = selection.version_id().and_then(|id| diff_against_latest(file, id));
        render_diff(selection.content(), diff)
    };

    DiffPane { file_name: file.name.clone(), versions, lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::DiffLineKind;
    use crate::models::BasedFile;

    fn session_with(files: &[(&str, &str)]) -> Session {
        let mut session = Session::new("chat-1");
        for (name, content) in files {
            session.based_files.push(BasedFile::seeded(*name, *name, content, Utc::now()));
        }
        session
    }

    #[test]
    fn changing_file_clears_version() {
        let session = session_with(&[("a.py", "a"), ("b.py", "b")]);
        let mut selection = Selection::default();
        selection.select_file(&session, "a.py").unwrap();
        let version = session.based_files[0].versions[0].version_id.clone();
        selection.select_version(&session, &version).unwrap();
        assert_eq!(selection.version_id(), Some(version.as_str()));

        selection.select_file(&session, "a.py").unwrap();
        assert!(selection.version_id().is_some());

        selection.select_file(&session, "b.py").unwrap();
        assert_eq!(selection.version_id(), None);
        assert_eq!(selection.content(), "b");
    }

    #[test]
    fn unknown_file_and_version_are_rejected() {
        let session = session_with(&[("a.py", "a")]);
        let mut selection = Selection::default();
        assert!(selection.select_file(&session, "nope.py").unwrap_err().is_validation());
        selection.select_file(&session, "a.py").unwrap();
        assert!(matches!(
            selection.select_version(&session, "missing"),
            Err(ClientError::UnknownVersion { .. })
        ));
    }

    #[test]
    fn toggling_switches_main_pane() {
        let session = session_with(&[("a.py", "line")]);
        let mut selection = Selection::default();
        selection.select_file(&session, "a.py").unwrap();

        assert!(matches!(derive_view(&session, &selection).main, MainPane::Conversation(_)));
        assert_eq!(selection.toggle_view(), ViewMode::Diff);

        let MainPane::Diff(pane) = derive_view(&session, &selection).main else {
            panic!("expected diff pane");
        };
        assert_eq!(pane.versions.len(), 1);
        assert_eq!(pane.versions[0].label, "Latest");
        assert_eq!(pane.lines.len(), 1);
        assert_eq!(pane.lines[0].kind, DiffLineKind::Normal);
    }

    #[test]
    fn selected_version_renders_its_diff_against_working_copy() {
        let mut session = session_with(&[("a.py", "one")]);
        session.based_files[0].record("-one\n+two", Utc::now() + chrono::Duration::seconds(1));
        let mut selection = Selection::default();
        selection.select_file(&session, "a.py").unwrap();
        selection.toggle_view();
        let newest = versions_of(&session.based_files[0])[0].version_id.clone();
        selection.select_version(&session, &newest).unwrap();

        let MainPane::Diff(pane) = derive_view(&session, &selection).main else {
            panic!("expected diff pane");
        };
        assert!(pane.versions[0].selected);
        assert_eq!(pane.lines.iter().map(|l| l.kind).collect::<Vec<_>>(), vec![
            DiffLineKind::Deletion,
            DiffLineKind::Addition
        ]);
    }

    #[test]
    fn default_title_and_local_edits() {
        let session = session_with(&[("a.py", "a")]);
        let mut selection = Selection::default();
        selection.select_file(&session, "a.py").unwrap();
        selection.edit_content("a edited");
        let view = derive_view(&session, &selection);
        assert_eq!(view.title, "General Chat");
        assert_eq!(view.editor.content, "a edited");
        assert_eq!(session.based_files[0].latest_content, "a");
    }
}
