//! Terminal surface: slash-command parsing and plain-text rendering.

use std::path::PathBuf;

use crate::ledger::DiffLine;
use crate::models::{Message, MessageRole};
use crate::selection::{MainPane, ViewModel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Prompt(String),
    Files,
    Select(String),
    ToggleView,
    Version(String),
    Delete(String),
    Upload(PathBuf),
    Model(String),
    Mode,
    Show,
    Quit,
}

/// `None` for blank lines and malformed commands.
pub fn parse_line(line: &str) -> Option<CliCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(CliCommand::Prompt(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let with_arg = |build: fn(String) -> CliCommand| (!arg.is_empty()).then(|| build(arg.to_string()));

    match name {
        "files" => Some(CliCommand::Files),
        "select" => with_arg(CliCommand::Select),
        "diff" | "chat" => Some(CliCommand::ToggleView),
        "version" => with_arg(CliCommand::Version),
        "delete" => with_arg(CliCommand::Delete),
        "upload" => (!arg.is_empty()).then(|| CliCommand::Upload(PathBuf::from(arg))),
        "model" => with_arg(CliCommand::Model),
        "mode" => Some(CliCommand::Mode),
        "show" => Some(CliCommand::Show),
        "quit" | "exit" => Some(CliCommand::Quit),
        _ => None,
    }
}

pub const HELP: &str = "commands: /files /select <name> /diff /version <id|label> /delete <id> \
                        /upload <path> /model <name> /mode /show /quit; any other line is sent as a prompt";

pub fn render_header(view: &ViewModel) -> String {
    format!(
        "── {} · model {} · {} ──",
        view.title,
        if view.selected_model.is_empty() { "-" } else { &view.selected_model },
        view.compose_mode.label()
    )
}

pub fn render_files(view: &ViewModel) -> String {
    let mut out = String::from("BASED\n");
    for (id, name) in &view.based_files {
        let marker = if *name == view.editor.file_name { '*' } else { ' ' };
        out.push_str(&format!(" {marker} {name} ({id})\n"));
    }
    out.push_str("CONTEXT\n");
    for (id, name) in &view.context_files {
        out.push_str(&format!("   {name} ({id})\n"));
    }
    out
}

pub fn render_main(view: &ViewModel) -> String {
    match &view.main {
        MainPane::Conversation(messages) => messages.iter().map(render_message).collect::<Vec<_>>().join("\n"),
        MainPane::Diff(pane) => {
            if pane.versions.is_empty() {
                return format!("{}: no version history", pane.file_name);
            }
            let mut out = format!("versions of {}\n", pane.file_name);
            for v in &pane.versions {
                let marker = if v.selected { '>' } else { ' ' };
                out.push_str(&format!(" {marker} {:<7} {} {}\n", v.label, v.timestamp.format("%Y-%m-%d %H:%M:%S"), v.version_id));
            }
            out.push_str(&render_diff_lines(&pane.lines));
            out
        }
    }
}

pub fn render_message(message: &Message) -> String {
    let who = match message.role {
        MessageRole::User => "you",
        MessageRole::Assistant => "agent",
    };
    format!("{who}> {}", message.display_text())
}

fn render_diff_lines(lines: &[DiffLine]) -> String {
    lines.iter().map(|l| format!("{} {}", l.kind.marker(), l.text)).collect::<Vec<_>>().join("\n")
}

/// Resolves a `/version` argument given as a label (`Latest`, `v2`) or id.
pub fn resolve_version(view: &ViewModel, arg: &str) -> Option<String> {
    let MainPane::Diff(pane) = &view.main else {
        return None;
    };
    pane.versions
        .iter()
        .find(|v| v.label.eq_ignore_ascii_case(arg) || v.version_id == arg)
        .map(|v| v.version_id.clone())
}

/// Conversation lines already on screen, so only new entries are printed.
#[derive(Debug, Default)]
pub struct Transcript {
    printed: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct TranscriptUpdate {
    /// The conversation no longer starts with what was printed.
    pub replaced: bool,
    pub lines: Vec<String>,
}

impl Transcript {
    pub fn update(&mut self, messages: &[Message]) -> TranscriptUpdate {
        let rendered: Vec<String> = messages.iter().map(render_message).collect();
        let replaced = !rendered.starts_with(&self.printed);
        let from = if replaced { 0 } else { self.printed.len() };
        let lines = rendered[from..].to_vec();
        self.printed = rendered;
        TranscriptUpdate { replaced, lines }
    }

    pub fn reset(&mut self) {
        self.printed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_frame;
    use crate::store::SessionStore;

    #[test]
    fn parses_prompts_and_commands() {
        assert_eq!(parse_line("  write a parser "), Some(CliCommand::Prompt("write a parser".to_string())));
        assert_eq!(parse_line("/select a.py"), Some(CliCommand::Select("a.py".to_string())));
        assert_eq!(parse_line("/upload ./notes.txt"), Some(CliCommand::Upload(PathBuf::from("./notes.txt"))));
        assert_eq!(parse_line("/diff"), Some(CliCommand::ToggleView));
        assert_eq!(parse_line("/select"), None);
        assert_eq!(parse_line("/bogus"), None);
        assert_eq!(parse_line("   "), None);
    }

    #[test]
    fn renders_conversation_and_versions() {
        let mut store = SessionStore::new("c1");
        store.apply(decode_frame(r#"{"chat_files_based":[{"file_id":"f1","name":"a.py","latest_content":"x"}]}"#));
        store.apply(decode_frame(
            r#"{"action":"agent_response","message":{"role":"assistant","type":"file","content":{"based_filename":"a.py","based_content":"y"}}}"#,
        ));
        let view = store.view();
        assert_eq!(render_main(&view), "agent> [file] a.py");
        assert!(render_files(&view).contains(" * a.py (f1)"));

        store.toggle_view();
        let view = store.view();
        let latest = resolve_version(&view, "latest").unwrap();
        assert!(render_main(&view).contains(&latest));
        assert!(resolve_version(&view, "v9").is_none());
    }

    #[test]
    fn transcript_reprints_when_snapshot_rewrites_history() {
        let mut store = SessionStore::new("c1");
        let mut transcript = Transcript::default();
        store.submit_prompt("first").unwrap();
        let update = transcript.update(&store.session().conversation);
        assert_eq!(update, TranscriptUpdate { replaced: false, lines: vec!["you> first".to_string()] });

        store.apply(decode_frame("working on it"));
        let update = transcript.update(&store.session().conversation);
        assert_eq!(update.lines, vec!["agent> working on it".to_string()]);

        // same length, different entries
        store.apply(decode_frame(
            r#"{"conversation":[{"role":"user","type":"text","content":"first!"},{"role":"assistant","type":"text","content":"done"}]}"#,
        ));
        let update = transcript.update(&store.session().conversation);
        assert!(update.replaced);
        assert_eq!(update.lines, vec!["you> first!".to_string(), "agent> done".to_string()]);

        assert!(transcript.update(&store.session().conversation).lines.is_empty());
    }
}
