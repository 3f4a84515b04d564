//! Conversation save and load.
//!
//! Files hold a pretty-printed JSON array of `{role, content}` records.

use anyhow::{Context, Result};
use lrepl_llm::Conversation;
use std::path::Path;

pub fn save_conversation(path: &Path, conversation: &Conversation) -> Result<()> {
    let json = conversation.to_json_string()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
    tracing::info!("Saved {} messages to {:?}", conversation.len(), path);
    Ok(())
}

pub fn load_conversation(path: &Path) -> Result<Conversation> {
    let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let conversation =
        Conversation::from_json_str(&json).with_context(|| format!("Invalid conversation file {:?}", path))?;

    tracing::info!("Loaded {} messages from {:?}", conversation.len(), path);
    Ok(conversation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("chat.json");

        let mut conversation = Conversation::with_system_prompt("S");
        conversation.add_user("question");
        conversation.add_assistant("answer");

        save_conversation(&path, &conversation).unwrap();
        assert_eq!(load_conversation(&path).unwrap(), conversation);
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json");
        let err = load_conversation(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("missing.json"));
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not a list").unwrap();
        assert!(load_conversation(&path).is_err());
    }
}
