//! Interactive read-eval-print loop.
//!
//! Reads lines from stdin, dispatches slash commands, and sends everything
//! else to the model. Ctrl-C while a response is pending abandons that
//! request and returns to the prompt; Ctrl-C at the prompt prints a hint.

use crate::commands::{session, SlashCommand, HELP_TEXT};
use crate::history::History;
use lrepl_core::config::{expand_path, AppConfig, ReplConfig};
use lrepl_core::AppResult;
use lrepl_llm::{CompletionResult, Conversation, LlmService, DEFAULT_KEEP_RECENT};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Whether the loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Repl {
    service: LlmService,
    conversation: Conversation,
    history: Option<History>,
    settings: ReplConfig,
    /// Parent of every per-request token
    cancel: CancellationToken,
}

impl Repl {
    pub fn new(service: LlmService, config: &AppConfig) -> Self {
        let settings = config.repl.clone();
        let history = match History::load(expand_path(&settings.history_file), settings.max_history) {
            Ok(history) => Some(history),
            Err(e) => {
                tracing::warn!("History disabled: {:#}", e);
                None
            }
        };

        Self {
            conversation: Conversation::with_system_prompt(service.system_prompt()),
            service,
            history,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub async fn run(mut self) -> AppResult<()> {
        if !self.service.is_available().await {
            eprintln!(
                "Warning: {} is not reachable right now; requests may fail.",
                self.service.provider_name()
            );
        }

        println!(
            "lrepl {} | provider: {} | model: {}",
            env!("CARGO_PKG_VERSION"),
            self.service.provider_name(),
            self.service.current_model()
        );
        println!("Type /help for commands, /exit to quit.\n");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("{}", self.settings.prompt_prefix);
            flush_stdout();

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    println!("\n(Use /exit to quit)");
                    continue;
                }
            };

            // EOF
            let Some(line) = line else {
                println!();
                break;
            };

            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            if let Some(history) = self.history.as_mut() {
                history.add(input);
            }

            if let Some(command) = SlashCommand::parse(input) {
                if self.execute(command) == Flow::Exit {
                    break;
                }
                continue;
            }

            self.chat(input).await;
        }

        self.cancel.cancel();
        if let Some(ref history) = self.history {
            if let Err(e) = history.save() {
                tracing::warn!("Failed to save history: {:#}", e);
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Send one user message and print the reply.
    ///
    /// The user message stays in the conversation even when the request
    /// fails or is interrupted; only a successful reply is appended.
    async fn chat(&mut self, input: &str) {
        self.conversation.add_user(input);
        self.conversation
            .truncate_to_token_limit(self.service.context_budget(), DEFAULT_KEEP_RECENT);

        let request = self.cancel.child_token();
        let watcher = {
            let request = request.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    request.cancel();
                }
            })
        };

        let outcome = self.request(&request).await;
        watcher.abort();

        match outcome {
            None => {
                println!("\n[interrupted]");
                tracing::info!("Request interrupted by user");
            }
            Some(result) if result.success => {
                tracing::debug!(tokens = result.tokens_used, model = %result.model_used, "Completion received");
                self.conversation.add_assistant(result.content);
            }
            Some(result) => {
                eprintln!("Error: {}", result.error_message);
            }
        }
    }

    /// Run the completion; `None` if `cancel` fired first.
    async fn request(&self, cancel: &CancellationToken) -> Option<CompletionResult> {
        print!("{}", self.settings.ai_prefix);
        flush_stdout();

        if self.settings.streaming {
            let completion = self.service.stream_complete(&self.conversation, |chunk, done| {
                if cancel.is_cancelled() {
                    return;
                }
                let mut out = std::io::stdout().lock();
                let _ = if done { writeln!(out) } else { write!(out, "{}", chunk) };
                let _ = out.flush();
            });

            tokio::select! {
                result = completion => Some(result),
                _ = cancel.cancelled() => None,
            }
        } else {
            let handle = self.service.complete_async(self.conversation.clone());
            let abort = handle.abort_handle();

            tokio::select! {
                joined = handle => {
                    let result = CompletionResult::from_join(joined);
                    if result.success {
                        println!("{}", result.content);
                    } else {
                        println!();
                    }
                    Some(result)
                }
                _ = cancel.cancelled() => {
                    abort.abort();
                    None
                }
            }
        }
    }

    /// Execute a slash command.
    pub fn execute(&mut self, command: SlashCommand) -> Flow {
        match command {
            SlashCommand::Help => println!("{}", HELP_TEXT),
            SlashCommand::Clear => {
                self.conversation = Conversation::with_system_prompt(self.service.system_prompt());
                println!("Conversation cleared.");
            }
            SlashCommand::History => {
                if self.conversation.is_empty() {
                    println!("(empty conversation)");
                } else {
                    println!("{}", self.conversation.to_transcript());
                }
            }
            SlashCommand::Save(path) => match session::save_conversation(&path, &self.conversation) {
                Ok(()) => println!("Saved conversation to {}", path.display()),
                Err(e) => eprintln!("Error: {:#}", e),
            },
            SlashCommand::Load(path) => match session::load_conversation(&path) {
                Ok(conversation) => {
                    println!("Loaded {} messages from {}", conversation.len(), path.display());
                    self.conversation = conversation;
                }
                Err(e) => eprintln!("Error: {:#}", e),
            },
            SlashCommand::Model(None) => {
                let current = self.service.current_model();
                println!("Models for {}:", self.service.provider_name());
                for model in self.service.available_models() {
                    let marker = if model.id == current { "*" } else { " " };
                    println!(
                        " {} {:<45} {} ({} tokens)",
                        marker, model.id, model.display_name, model.context_length
                    );
                }
                println!("Current: {}", current);
            }
            SlashCommand::Model(Some(id)) => {
                self.service.set_model(&id);
                println!("Model: {}", self.service.current_model());
            }
            SlashCommand::System(None) => match self.conversation.system_prompt() {
                Some(prompt) => println!("System prompt: {}", prompt),
                None => println!("No system prompt set."),
            },
            SlashCommand::System(Some(prompt)) => {
                self.conversation.set_system_prompt(prompt.clone());
                self.service.set_system_prompt(prompt);
                println!("System prompt updated.");
            }
            SlashCommand::MissingArgument(usage) => println!("Usage: {}", usage),
            SlashCommand::Unknown(name) => {
                println!("Unknown command: /{}. Type /help for commands.", name)
            }
            SlashCommand::Exit => return Flow::Exit,
        }

        Flow::Continue
    }
}

fn flush_stdout() {
    let _ = std::io::stdout().flush();
}
