//! Slash commands for the REPL.
//!
//! A line starting with `/` is a command rather than a prompt. This module
//! parses those lines; the REPL executes them.

pub mod session;

use std::path::PathBuf;

/// File used by `/save` when no path is given.
pub const DEFAULT_SAVE_FILE: &str = "conversation.json";

pub const HELP_TEXT: &str = "\
Commands:
  /help              Show this help
  /clear             Start a new conversation
  /history           Show the current conversation
  /save [file]       Save the conversation (default: conversation.json)
  /load <file>       Load a saved conversation
  /model [id]        Switch model, or list known models
  /system <prompt>   Replace the system prompt
  /exit              Quit (also /quit)

Press Ctrl-C to interrupt a response.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Clear,
    History,
    Save(PathBuf),
    Load(PathBuf),
    /// `None` lists the catalog
    Model(Option<String>),
    /// `None` shows the current prompt
    System(Option<String>),
    Exit,
    /// A command that needs an argument was given none
    MissingArgument(&'static str),
    Unknown(String),
}

impl SlashCommand {
    /// Parse an input line; `None` if it is not a command.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let body = line.strip_prefix('/')?;

        let (name, arg) = match body.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, Some(rest.trim()).filter(|s| !s.is_empty())),
            None => (body, None),
        };

        let command = match name.to_lowercase().as_str() {
            "help" | "?" => Self::Help,
            "clear" => Self::Clear,
            "history" => Self::History,
            "save" => Self::Save(PathBuf::from(arg.unwrap_or(DEFAULT_SAVE_FILE))),
            "load" => match arg {
                Some(path) => Self::Load(PathBuf::from(path)),
                None => Self::MissingArgument("/load <file>"),
            },
            "model" => Self::Model(arg.map(str::to_string)),
            "system" => Self::System(arg.map(str::to_string)),
            "exit" | "quit" => Self::Exit,
            other => Self::Unknown(other.to_string()),
        };

        Some(command)
    }
}
