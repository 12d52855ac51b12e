//! Device action dispatch
//!
//! The chat server can attach an action to a reply (`todo_add`,
//! `note_create`, `app_open`, ...). Dispatch is fire and forget: the
//! session controller hands the action off and moves on, and every failure
//! is contained here as a log line. A bad action never disturbs the
//! conversation flow.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::api::ServerAction;
use crate::{Error, Result};

/// Receives server-requested actions; object-safe so tests can record them
#[async_trait]
pub trait ActionSink: Send + Sync {
    /// Execute `action`, swallowing failures internally
    async fn dispatch(&self, action: ServerAction);
}

/// Desktop rendition of the action set
///
/// Todos, reminders and notes land as plain files under the data
/// directory; `app_open` spawns a process. Telephony actions have no
/// desktop equivalent and are acknowledged in the log only.
pub struct DesktopActions {
    data_dir: PathBuf,
}

impl DesktopActions {
    #[must_use]
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    async fn execute(&self, action: &ServerAction) -> Result<String> {
        match action.kind.as_str() {
            "todo_add" => {
                let task = require_param(action, "task")?;
                self.append_line("todo.md", &format!("- [ ] {task}")).await?;
                Ok(format!("added todo: {task}"))
            }
            "reminder_set" => {
                let text = require_param(action, "text")?;
                let time = param(action, "time").unwrap_or_else(|| "unspecified".to_string());
                self.append_line("reminders.md", &format!("- {time}: {text}"))
                    .await?;
                Ok(format!("reminder set: {text} at {time}"))
            }
            "note_create" => {
                let content = require_param(action, "content")?;
                let title = param(action, "title").unwrap_or_else(|| {
                    chrono::Local::now().format("note-%Y%m%d-%H%M%S").to_string()
                });
                let path = self.notes_dir().join(format!("{}.md", sanitize(&title)));
                tokio::fs::create_dir_all(self.notes_dir()).await?;
                tokio::fs::write(&path, format!("{content}\n")).await?;
                Ok(format!("note saved: {}", path.display()))
            }
            "app_open" => {
                let program = require_param(action, "app_name")?;
                // Spawned detached; exit status is not our concern
                std::process::Command::new(&program)
                    .spawn()
                    .map_err(|e| Error::Action(format!("failed to launch {program}: {e}")))?;
                Ok(format!("launched {program}"))
            }
            "call_make" => {
                let number = require_param(action, "number")?;
                Ok(format!("call requested to {number} (no telephony on this device)"))
            }
            "message_send" => {
                let recipient = require_param(action, "recipient")?;
                let body = param(action, "body").unwrap_or_default();
                Ok(format!(
                    "message to {recipient} requested (no telephony on this device): {body}"
                ))
            }
            other => Err(Error::Action(format!("unknown action type: {other}"))),
        }
    }

    fn notes_dir(&self) -> PathBuf {
        self.data_dir.join("notes")
    }

    async fn append_line(&self, file: &str, line: &str) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        tokio::fs::create_dir_all(&self.data_dir).await?;
        let path = self.data_dir.join(file);
        let mut handle = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        handle.write_all(format!("{line}\n").as_bytes()).await?;
        Ok(())
    }
}

#[async_trait]
impl ActionSink for DesktopActions {
    async fn dispatch(&self, action: ServerAction) {
        tracing::info!(kind = %action.kind, "dispatching action");
        match self.execute(&action).await {
            Ok(outcome) => tracing::info!(kind = %action.kind, %outcome, "action complete"),
            Err(e) => tracing::warn!(kind = %action.kind, error = %e, "action failed"),
        }
    }
}

/// String parameter lookup; numbers are accepted and stringified
fn param(action: &ServerAction, key: &str) -> Option<String> {
    match action.params.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn require_param(action: &ServerAction, key: &str) -> Result<String> {
    param(action, key).ok_or_else(|| {
        Error::Action(format!(
            "action {} missing required param {key}",
            action.kind
        ))
    })
}

/// Keep filenames portable
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(kind: &str, params: serde_json::Value) -> ServerAction {
        serde_json::from_value(serde_json::json!({ "type": kind, "params": params }))
            .expect("valid action")
    }

    #[tokio::test]
    async fn todo_add_appends_to_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let actions = DesktopActions::new(dir.path().to_path_buf());

        actions.dispatch(action("todo_add", serde_json::json!({"task": "buy milk"}))).await;
        actions.dispatch(action("todo_add", serde_json::json!({"task": "call mom"}))).await;

        let content = std::fs::read_to_string(dir.path().join("todo.md")).expect("read");
        assert_eq!(content, "- [ ] buy milk\n- [ ] call mom\n");
    }

    #[tokio::test]
    async fn note_create_writes_named_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let actions = DesktopActions::new(dir.path().to_path_buf());

        actions
            .dispatch(action(
                "note_create",
                serde_json::json!({"title": "shopping list", "content": "eggs"}),
            ))
            .await;

        let content =
            std::fs::read_to_string(dir.path().join("notes/shopping_list.md")).expect("read");
        assert_eq!(content, "eggs\n");
    }

    #[tokio::test]
    async fn unknown_action_is_swallowed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let actions = DesktopActions::new(dir.path().to_path_buf());

        // Must not panic or create anything
        actions.dispatch(action("self_destruct", serde_json::json!({}))).await;
        assert!(!dir.path().join("todo.md").exists());
    }

    #[tokio::test]
    async fn missing_param_is_swallowed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let actions = DesktopActions::new(dir.path().to_path_buf());

        actions.dispatch(action("todo_add", serde_json::json!({}))).await;
        assert!(!dir.path().join("todo.md").exists());
    }

    #[test]
    fn numeric_params_are_stringified() {
        let a = action("call_make", serde_json::json!({"number": 5551234}));
        assert_eq!(param(&a, "number").as_deref(), Some("5551234"));
    }
}
