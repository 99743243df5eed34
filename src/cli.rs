//! The `lc` command line.
//!
//! Argument parsing via `arrrg`, plus the steps of one invocation: config
//! commands, memory commands, and finally a streamed completion.

use std::io::{self, Write};

use arrrg_derive::CommandLine;

use crate::client::Client;
use crate::completion::ChatCompletionResult;
use crate::config::{Config, Paths, parse_assignment};
use crate::error::Result;
use crate::history::ConversationStore;
use crate::message::Message;
use crate::render::StreamRenderer;

/// Usage line handed to `arrrg`.
pub const USAGE: &str = "lc [OPTIONS] <query>";

/// Printed when there is nothing to ask.
pub const HELP: &str = "\
Linux command-line AI assistant

Usage: lc [OPTIONS] <query>
       <command> | lc [OPTIONS] [query]

Options:
  --query TEXT        Specify the query for the AI
  --memory            Enable conversation memory
  --clear-memory      Clear the conversation memory
  --show-memory       Show the conversation memory
  --set KEY=VALUE     Set a configuration value
  --show-config       Show the current configuration
  --reset-config      Reset the configuration to default values
  --model NAME        Override the default model for this request
  --no-system-prompt  Disable the system prompt for this request
  --debug             Enable debug logging
";

/// Command-line arguments for `lc`.  Free arguments form the query.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct LcArgs {
    /// Query text; takes precedence over free arguments.
    #[arrrg(optional, "Specify the query for the AI", "TEXT")]
    pub query: Option<String>,

    #[arrrg(flag, "Enable conversation memory")]
    pub memory: bool,

    #[arrrg(flag, "Clear the conversation memory")]
    pub clear_memory: bool,

    #[arrrg(flag, "Show the conversation memory")]
    pub show_memory: bool,

    /// A `key=value` assignment to persist.
    #[arrrg(optional, "Set a configuration value (key=value)", "KEY=VALUE")]
    pub set: Option<String>,

    #[arrrg(flag, "Show the current configuration")]
    pub show_config: bool,

    #[arrrg(flag, "Reset the configuration to default values")]
    pub reset_config: bool,

    /// Model for this request only.
    #[arrrg(optional, "Override the default model for this request", "NAME")]
    pub model: Option<String>,

    #[arrrg(flag, "Disable the system prompt for this request")]
    pub no_system_prompt: bool,

    #[arrrg(flag, "Enable debug logging")]
    pub debug: bool,
}

/// The `Query: ...` part of the user message, if any.
///
/// `--query` wins over free arguments; free arguments are joined by spaces.
pub fn build_query(args: &LcArgs, free: &[String]) -> Option<String> {
    let text = match &args.query {
        Some(query) => query.clone(),
        None => free.join(" "),
    };
    if text.is_empty() {
        None
    } else {
        Some(format!("Query: {text}"))
    }
}

/// The `Input: ...` part of the user message built from piped stdin.
pub fn build_input(piped: &str) -> Option<String> {
    let trimmed = piped.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("Input: {trimmed}"))
    }
}

/// Join query and input into one user message body, separated by a blank line.
pub fn user_content(query: Option<String>, input: Option<String>) -> Option<String> {
    match (query, input) {
        (Some(query), Some(input)) => Some(format!("{query}\n\n{input}")),
        (Some(text), None) | (None, Some(text)) => Some(text),
        (None, None) => None,
    }
}

/// The message list sent to the API: system prompt, stored history, then
/// the new user message.
pub fn assemble_messages(
    config: &Config,
    use_system_prompt: bool,
    history: Vec<Message>,
    user: Option<String>,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if use_system_prompt && config.use_system_prompt {
        messages.push(Message::system(config.system_prompt.clone()));
    }
    messages.extend(history);
    if let Some(user) = user {
        messages.push(Message::user(user));
    }
    messages
}

/// Run one invocation of `lc`.
///
/// `piped` is the raw text read from a non-terminal stdin.
pub async fn run(args: LcArgs, free: Vec<String>, paths: &Paths, piped: Option<String>) -> Result<()> {
    let config_file = paths.config_file();
    let mut config = Config::load(&config_file)?;
    log::debug!("loaded configuration from {}", config_file.display());

    if args.show_config {
        print!("{}", config.summary());
        return Ok(());
    }
    if args.reset_config {
        Config::reset(&config_file)?;
        println!("Configuration has been reset to default values.");
        return Ok(());
    }
    if let Some(assignment) = &args.set {
        let (key, value) = parse_assignment(assignment)?;
        config.set_value(key, value)?;
        config.save(&config_file)?;
        println!("{key} set successfully.");
        return Ok(());
    }

    let store = ConversationStore::new(paths.memory_file());
    if args.clear_memory {
        if store.clear()? {
            println!("Conversation memory has been cleared.");
        } else {
            println!("No conversation memory found.");
        }
        return Ok(());
    }
    if args.show_memory {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        store.show(&mut out)?;
        out.flush()?;
        return Ok(());
    }

    let query = build_query(&args, &free);
    let input = piped.as_deref().and_then(build_input);
    log::debug!("query: {query:?}");
    log::debug!("input: {input:?}");
    if query.is_none() && input.is_none() && !args.memory {
        print!("{HELP}");
        return Ok(());
    }

    let history = if args.memory {
        load_history(&store)
    } else {
        Vec::new()
    };
    let messages = assemble_messages(
        &config,
        !args.no_system_prompt,
        history,
        user_content(query, input),
    );
    log::debug!("total messages to send: {}", messages.len());

    let client = Client::new(&config)?;
    let mut renderer = StreamRenderer::stdout();
    let result: ChatCompletionResult = client
        .chat_completion_stream(&messages, args.model.as_deref(), &mut renderer)
        .await;
    let reply = result.into_result()?;
    renderer.finish_response();

    if args.memory {
        let mut messages = messages;
        messages.push(Message::assistant(reply));
        if let Err(err) = store.save(&messages, config.max_history) {
            log::warn!("failed to save conversation history: {err}");
        }
    }
    Ok(())
}

/// Stored history, or nothing if it is missing or unreadable.
fn load_history(store: &ConversationStore) -> Vec<Message> {
    match store.load() {
        Ok(Some(messages)) => {
            log::debug!("loaded {} previous message(s)", messages.len());
            messages
        }
        Ok(None) => Vec::new(),
        Err(err) => {
            log::warn!("ignoring conversation history: {err}");
            Vec::new()
        }
    }
}
