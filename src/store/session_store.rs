use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::codec::{FilePayload, InboundEvent, OutboundCommand, SessionSnapshot};
use crate::errors::ClientError;
use crate::models::{BasedFile, ComposeMode, ContextFile, Message, MessageRole, Session};
use crate::selection::{derive_view, Selection, ViewModel};

/// What a single `apply` changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    pub conversation_changed: bool,
    pub files_changed: bool,
    pub selection_changed: bool,
    pub metadata_changed: bool,
    /// The event carried generated file content.
    pub delivered_file: bool,
}

impl Applied {
    pub fn changed(&self) -> bool {
        self.conversation_changed || self.files_changed || self.selection_changed || self.metadata_changed
    }
}

/// Sole writer of [`Session`]. Every mutation is one merge step applied in
/// arrival order; re-applying an identical snapshot changes nothing.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    session: Session,
    selection: Selection,
}

impl SessionStore {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self { session: Session::new(chat_id), selection: Selection::default() }
    }

    /// Store pre-seeded with the models offered at login.
    pub fn with_models(chat_id: impl Into<String>, models: Vec<String>) -> Self {
        let mut store = Self::new(chat_id);
        store.replace_models(models);
        store
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn view(&self) -> ViewModel {
        derive_view(&self.session, &self.selection)
    }

    pub fn apply(&mut self, event: InboundEvent) -> Applied {
        self.apply_at(event, Utc::now())
    }

    pub fn apply_at(&mut self, event: InboundEvent, now: DateTime<Utc>) -> Applied {
        let before_selection = self.selection.clone();
        let mut applied = Applied::default();

        match event {
            InboundEvent::BareText(text) => {
                self.session.conversation.push(Message::text(MessageRole::Assistant, text));
                applied.conversation_changed = true;
            }
            InboundEvent::AgentResponse { message, chat_name } => {
                if let Some(name) = chat_name {
                    applied.metadata_changed |= self.replace_title(name);
                }
                self.session.conversation.push(message.to_message());
                applied.conversation_changed = true;
                if let Some(payload) = message.file_payload() {
                    self.upsert_based_file(payload, now);
                    applied.files_changed = true;
                    applied.delivered_file = true;
                }
            }
            InboundEvent::RevertComplete { message } => {
                self.session.conversation.push(message.to_message());
                applied.conversation_changed = true;
                if let Some(payload) = message.file_payload() {
                    self.upsert_based_file(payload, now);
                    applied.files_changed = true;
                    applied.delivered_file = true;
                }
            }
            InboundEvent::FileDeleted { file_id } => {
                applied.files_changed = self.remove_file(&file_id);
            }
            InboundEvent::FileUploaded { file_id, filename, path } => {
                applied.files_changed = self.register_context_file(ContextFile { id: file_id, name: filename, path });
            }
            InboundEvent::Snapshot(snapshot) => {
                applied = self.replace_snapshot(snapshot);
            }
        }

        applied.selection_changed = self.selection != before_selection;
        applied
    }

    // ── Merge rules ──────────────────────────────────────────────────────────

    /// Looks the file up by name; appends a version or seeds a new file.
    fn upsert_based_file(&mut self, payload: &FilePayload, now: DateTime<Utc>) {
        let FilePayload { based_filename: name, based_content: content } = payload;

        match self.session.based_file_mut(name) {
            Some(file) => {
                file.record(content, now);
                debug!(file = %name, versions = file.versions.len(), "Recorded new version");
            }
            None => {
                // No stable id on this path; the name stands in until a snapshot.
                self.session.based_files.push(BasedFile::seeded(name.clone(), name.clone(), content, now));
                info!(file = %name, "Created based file");
            }
        }

        if !self.selection.has_file() || self.selection.is_selected(name) {
            self.selection.show(name, content);
        }
    }

    /// Removes `file_id` from both file sets. Returns whether anything went.
    pub fn remove_file(&mut self, file_id: &str) -> bool {
        let removed_name = self
            .session
            .based_files
            .iter()
            .find(|f| f.id == file_id)
            .map(|f| f.name.clone());

        let before = self.session.based_files.len() + self.session.context_files.len();
        self.session.based_files.retain(|f| f.id != file_id);
        self.session.context_files.retain(|f| f.id != file_id);
        let removed = before != self.session.based_files.len() + self.session.context_files.len();

        if let Some(name) = removed_name {
            if self.selection.is_selected(&name) {
                self.select_first_or_clear();
            }
        }
        if !removed {
            debug!(file_id, "Delete for unknown file id ignored");
        }
        removed
    }

    fn register_context_file(&mut self, file: ContextFile) -> bool {
        match self.session.context_files.iter_mut().find(|f| f.id == file.id) {
            Some(existing) if *existing == file => false,
            Some(existing) => {
                *existing = file;
                true
            }
            None => {
                info!(file = %file.name, "Context file registered");
                self.session.context_files.push(file);
                true
            }
        }
    }

    fn replace_snapshot(&mut self, snapshot: SessionSnapshot) -> Applied {
        let mut applied = Applied::default();
        if snapshot.is_empty() {
            return applied;
        }

        if let Some(name) = snapshot.chat_name {
            applied.metadata_changed |= self.replace_title(name);
        }
        if let Some(conversation) = snapshot.conversation {
            if self.session.conversation != conversation {
                self.session.conversation = conversation;
                applied.conversation_changed = true;
            }
        }
        if let Some(models) = snapshot.models {
            applied.metadata_changed |= self.replace_models(models);
        }

        let files_replaced = snapshot.based_files.is_some() || snapshot.context_files.is_some();
        if let Some(files) = snapshot.based_files {
            let files = dedupe_based(files);
            if self.session.based_files != files {
                self.session.based_files = files;
                applied.files_changed = true;
            }
        }
        if let Some(files) = snapshot.context_files {
            let mut unique: Vec<ContextFile> = Vec::with_capacity(files.len());
            for file in files {
                if !unique.iter().any(|f| f.id == file.id) {
                    unique.push(file);
                }
            }
            if self.session.context_files != unique {
                self.session.context_files = unique;
                applied.files_changed = true;
            }
        }
        // a selection naming a file the snapshot dropped falls back too
        let selection_lost = self.session.based_file(self.selection.file_name()).is_none();
        if files_replaced && selection_lost {
            if self.selection.has_file() {
                info!(file = %self.selection.file_name(), "Selected file gone from snapshot");
            }
            self.select_first_or_clear();
        }
        applied
    }

    fn replace_title(&mut self, name: String) -> bool {
        if self.session.chat_title == name {
            return false;
        }
        self.session.chat_title = name;
        true
    }

    /// Keeps the selected model if still offered, else falls back to the first.
    fn replace_models(&mut self, models: Vec<String>) -> bool {
        let mut changed = self.session.available_models != models;
        self.session.available_models = models;
        if !self.session.available_models.contains(&self.session.selected_model) {
            let fallback = self.session.available_models.first().cloned().unwrap_or_default();
            changed |= fallback != self.session.selected_model;
            self.session.selected_model = fallback;
        }
        changed
    }

    fn select_first_or_clear(&mut self) {
        match self.session.based_files.first() {
            Some(first) => {
                let (name, content) = (first.name.clone(), first.latest_content.clone());
                self.selection.show(&name, &content);
            }
            None => self.selection.clear(),
        }
    }

    // ── Local user actions ───────────────────────────────────────────────────

    /// Derived at send time, before the optimistic append.
    pub fn is_first_prompt(&self) -> bool {
        self.session.based_files.is_empty() || self.session.conversation.is_empty()
    }

    /// Builds a `new_message` command and optimistically appends the prompt.
    pub fn submit_prompt(&mut self, prompt: &str) -> Result<OutboundCommand, ClientError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ClientError::EmptyPrompt);
        }

        let command = OutboundCommand::NewMessage {
            prompt: prompt.to_string(),
            model: self.session.selected_model.clone(),
            is_first_prompt: self.is_first_prompt(),
            is_chat_or_composer: self.session.compose_mode == ComposeMode::Composer,
            selected_filename: self.selection.file_name().to_string(),
            chat_files_based: self.session.based_files.iter().map(|f| f.id.clone()).collect(),
            chat_files_text: self.session.context_files.iter().map(|f| f.id.clone()).collect(),
        };

        self.session.conversation.push(Message::text(MessageRole::User, prompt));
        Ok(command)
    }

    pub fn select_model(&mut self, model: &str) -> Result<(), ClientError> {
        if !self.session.available_models.iter().any(|m| m == model) {
            return Err(ClientError::UnknownModel { model: model.to_string() });
        }
        self.session.selected_model = model.to_string();
        Ok(())
    }

    pub fn toggle_compose_mode(&mut self) -> ComposeMode {
        self.session.compose_mode = self.session.compose_mode.toggled();
        self.session.compose_mode
    }

    pub fn select_file(&mut self, name: &str) -> Result<(), ClientError> {
        self.selection.select_file(&self.session, name)
    }

    pub fn select_version(&mut self, version_id: &str) -> Result<(), ClientError> {
        self.selection.select_version(&self.session, version_id)
    }

    pub fn toggle_view(&mut self) {
        self.selection.toggle_view();
    }

    pub fn edit_selected_content(&mut self, content: impl Into<String>) {
        self.selection.edit_content(content);
    }
}

/// Keeps the first file for each id and each name.
fn dedupe_based(files: Vec<BasedFile>) -> Vec<BasedFile> {
    let mut unique: Vec<BasedFile> = Vec::with_capacity(files.len());
    for file in files {
        if unique.iter().any(|f| f.id == file.id || f.name == file.name) {
            warn!(file = %file.name, "Duplicate based file in snapshot dropped");
            continue;
        }
        unique.push(file);
    }
    unique
}
