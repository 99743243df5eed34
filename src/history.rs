//! Conversation memory persisted between invocations.
//!
//! The history file is a pretty-printed JSON array of `{role, content}`
//! objects.  System messages are never stored, and the file holds at most
//! `2 * max_history` messages (one turn is a user message plus its reply).

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::message::{Message, Role, decode_messages, encode_messages};
use crate::observability::{HISTORY_CORRUPT, HISTORY_LOADS, HISTORY_SAVES};

/// Messages longer than this are cut when shown.
pub const MAX_DISPLAY_CHARS: usize = 500;

/// Marker appended to a message cut for display.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

const RULE: &str = "-----------------------------------------";

/// On-disk conversation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationStore {
    path: PathBuf,
}

impl ConversationStore {
    /// A store backed by the file at `path`.  Nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The history file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored history.
    ///
    /// Returns `Ok(None)` when there is no history file.  A file that is not
    /// a JSON array of messages is [`Error::CorruptHistory`].
    pub fn load(&self) -> Result<Option<Vec<Message>>> {
        HISTORY_LOADS.click();
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(Error::io(
                    format!("failed to open history file {}", self.path.display()),
                    err,
                ));
            }
        };
        let value: Value = serde_json::from_reader(BufReader::new(file)).map_err(|err| {
            HISTORY_CORRUPT.click();
            Error::corrupt_history(&self.path, "not valid JSON", Some(Box::new(err)))
        })?;
        let messages = decode_messages(&value).map_err(|err| {
            HISTORY_CORRUPT.click();
            Error::corrupt_history(&self.path, err.to_string(), Some(Box::new(err)))
        })?;
        Ok(Some(messages))
    }

    /// Persist the newest `max_history` turns of `messages`.
    ///
    /// System messages are dropped first; the oldest messages go next.
    /// Parent directories are created as needed.
    pub fn save(&self, messages: &[Message], max_history: usize) -> Result<()> {
        let retained = retain_recent(messages, max_history);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                Error::io(
                    format!("failed to create history directory {}", parent.display()),
                    err,
                )
            })?;
        }
        let file = File::create(&self.path).map_err(|err| {
            Error::io(
                format!("failed to create history file {}", self.path.display()),
                err,
            )
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &encode_messages(&retained)).map_err(|err| {
            Error::serialization("failed to serialize history", Some(Box::new(err)))
        })?;
        writer.flush().map_err(|err| {
            Error::io(
                format!("failed to write history file {}", self.path.display()),
                err,
            )
        })?;
        HISTORY_SAVES.click();
        log::debug!(
            "saved {} message(s) to {}",
            retained.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Delete the history file.  Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(Error::io(
                format!("failed to remove history file {}", self.path.display()),
                err,
            )),
        }
    }

    /// Write a human-readable dump of the stored history to `out`.
    ///
    /// A corrupt history file is shown as empty, with a warning logged.
    pub fn show<W: Write>(&self, out: &mut W) -> Result<()> {
        let messages = match self.load() {
            Ok(messages) => messages.unwrap_or_default(),
            Err(err) if err.is_corrupt_history() => {
                log::warn!("ignoring conversation history: {err}");
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        out.write_all(format_history(&messages).as_bytes())?;
        Ok(())
    }
}

/// The non-system tail of `messages` holding at most `max_history` turns.
pub fn retain_recent(messages: &[Message], max_history: usize) -> Vec<Message> {
    let capacity = max_history.saturating_mul(2);
    let conversational: Vec<&Message> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .collect();
    let skip = conversational.len().saturating_sub(capacity);
    conversational.into_iter().skip(skip).cloned().collect()
}

/// Render `messages` for display, cutting long contents.
pub fn format_history(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "No conversation history found.\n".to_string();
    }
    let mut out = String::new();
    out.push_str("Conversation History:\n");
    out.push_str(RULE);
    out.push('\n');
    for message in messages {
        out.push_str(&format!("[{}]:\n", message.role.display_name()));
        out.push_str(&truncate_for_display(&message.content));
        out.push_str("\n\n");
    }
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("Total messages: {}\n", messages.len()));
    out
}

fn truncate_for_display(content: &str) -> String {
    match content.char_indices().nth(MAX_DISPLAY_CHARS) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &content[..cut]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(turns: usize) -> Vec<Message> {
        let mut messages = vec![Message::system("system prompt")];
        for i in 0..turns {
            messages.push(Message::user(format!("question {i}")));
            messages.push(Message::assistant(format!("answer {i}")));
        }
        messages
    }

    fn store_in(dir: &tempfile::TempDir) -> ConversationStore {
        ConversationStore::new(dir.path().join("lc").join("conversation_memory.json"))
    }

    #[test]
    fn load_absent_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store_in(&dir).load().unwrap(), None);
    }

    #[test]
    fn save_then_load_keeps_recent_turns() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let messages = conversation(5);
        store.save(&messages, 2).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, messages[7..].to_vec());
        assert_eq!(loaded[0], Message::user("question 3"));
        assert!(loaded.iter().all(|m| m.role != Role::System));
    }

    #[test]
    fn save_keeps_everything_under_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let messages = conversation(2);
        store.save(&messages, 10).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), messages[1..].to_vec());
    }

    #[test]
    fn zero_history_saves_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&conversation(3), 0).unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "[]");
        assert_eq!(store.load().unwrap(), Some(Vec::new()));
    }

    #[test]
    fn file_is_pretty_printed_with_two_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&[Message::user("hi")], 1).unwrap();
        let text = fs::read_to_string(store.path()).unwrap();
        assert_eq!(
            text,
            "[\n  {\n    \"role\": \"user\",\n    \"content\": \"hi\"\n  }\n]"
        );
    }

    #[test]
    fn odd_tail_is_kept_in_order() {
        let messages = vec![
            Message::user("a"),
            Message::system("late system"),
            Message::assistant("b"),
            Message::user("c"),
        ];
        assert_eq!(
            retain_recent(&messages, 1),
            vec![Message::assistant("b"), Message::user("c")]
        );
    }

    #[test]
    fn corrupt_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();

        fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().unwrap_err().is_corrupt_history());

        fs::write(store.path(), r#"{"role":"user","content":"x"}"#).unwrap();
        assert!(store.load().unwrap_err().is_corrupt_history());

        fs::write(store.path(), r#"[{"role":"user"}]"#).unwrap();
        assert!(store.load().unwrap_err().is_corrupt_history());
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(!store.clear().unwrap());
        store.save(&conversation(1), 1).unwrap();
        assert!(store.clear().unwrap());
        assert!(!store.path().exists());
        assert!(!store.clear().unwrap());
    }

    #[test]
    fn show_truncates_long_messages() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let long = "é".repeat(MAX_DISPLAY_CHARS + 20);
        store
            .save(&[Message::user("short"), Message::assistant(long)], 1)
            .unwrap();
        let before = fs::read_to_string(store.path()).unwrap();

        let mut out = Vec::new();
        store.show(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Conversation History:\n"));
        assert!(text.contains("[User]:\nshort\n\n"));
        let expected = format!("[Assistant]:\n{}{TRUNCATION_MARKER}\n", "é".repeat(MAX_DISPLAY_CHARS));
        assert!(text.contains(&expected));
        assert!(text.ends_with("Total messages: 2\n"));
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn show_without_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();
        store_in(&dir).show(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No conversation history found.\n");
    }

    #[test]
    fn show_treats_corrupt_history_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{ not json").unwrap();

        let mut out = Vec::new();
        store.show(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No conversation history found.\n");
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "{ not json");
    }

    #[test]
    fn exactly_limit_is_not_truncated() {
        let content = "x".repeat(MAX_DISPLAY_CHARS);
        assert_eq!(truncate_for_display(&content), content);
    }
}
