use crate::config::MODEL_OPTIONS;
use crate::session::ChatSession;
use colored::Colorize;

mod chat;
mod document;
mod report;
mod settings;
mod system;

pub use report::print_metrics;
pub use system::print_help;

/// What the REPL loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Exit,
}

pub struct CommandHandler {
    session: ChatSession,
}

fn on_off(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("Expected on or off, got '{}'", other)),
    }
}

impl CommandHandler {
    pub fn new(session: ChatSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub async fn handle_command(&mut self, input: &str) -> Result<CommandOutcome, String> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(CommandOutcome::Continue);
        }

        let (command, rest) = match input.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (input, ""),
        };

        let continue_with = |result: Result<(), String>| result.map(|_| CommandOutcome::Continue);

        match (command.to_lowercase().as_str(), rest) {
            ("help", "") => system::handle_command("help"),
            ("exit" | "quit", "") => system::handle_command("exit"),

            // Document commands
            ("load", "") => Err("Usage: load <path/to/file.pdf>".to_string()),
            ("load", path) if looks_like_path(path) => continue_with(document::load(&mut self.session, path).await),
            ("info", "") => continue_with(document::info(&self.session)),
            ("cache", "clear") => continue_with(document::clear_cache(&self.session)),

            // Chat commands
            ("ask", "") => Err("Usage: ask <question>".to_string()),
            ("ask", question) => continue_with(chat::ask(&mut self.session, question).await),
            ("quick", choice) if choice.is_empty() || choice.parse::<usize>().is_ok() => {
                continue_with(chat::quick(&mut self.session, choice).await)
            }
            ("history", "") => continue_with(chat::history(&self.session)),
            ("clear", "") => continue_with(chat::clear(&mut self.session)),

            // Settings commands
            ("models", "") => continue_with(settings::list_models(&self.session)),
            ("model", name) if is_model_id(name) => continue_with(settings::model(&mut self.session, name)),
            ("temp", value) if value.parse::<f32>().is_ok() => {
                continue_with(settings::temperature(&mut self.session, value))
            }
            ("tokens", value) if value.parse::<u32>().is_ok() => {
                continue_with(settings::max_tokens(&mut self.session, value))
            }
            ("memory", value) if on_off(value).is_ok() => {
                let enabled = on_off(value)?;
                continue_with(settings::toggle(&mut self.session, |s| s.use_memory = enabled, "Memory", enabled))
            }
            ("stream", value) if on_off(value).is_ok() => {
                let enabled = on_off(value)?;
                continue_with(settings::toggle(&mut self.session, |s| s.use_streaming = enabled, "Streaming", enabled))
            }
            ("ping", "") => continue_with(settings::ping(&self.session).await),

            // Report commands
            ("metrics", "") => continue_with(report::metrics(&self.session)),
            ("report", dir) if dir.is_empty() || looks_like_path(dir) => continue_with(report::export(&self.session, dir)),

            // Anything else is a question about the document
            _ => continue_with(chat::ask(&mut self.session, input).await),
        }
    }
}

/// A `.pdf` file name, or a single token that reads as a file system path
/// rather than a word.
fn looks_like_path(arg: &str) -> bool {
    arg.to_lowercase().ends_with(".pdf")
        || (!arg.is_empty()
            && !arg.contains(char::is_whitespace)
            && (arg.contains(['/', '\\']) || arg.starts_with('.') || arg.starts_with('~')))
}

/// Empty (show the current model), a list number, a suggested model or a
/// `vendor/model` id.
fn is_model_id(arg: &str) -> bool {
    arg.is_empty()
        || arg.parse::<usize>().is_ok()
        || MODEL_OPTIONS.contains(&arg)
        || (!arg.contains(char::is_whitespace) && arg.contains('/'))
}

pub(crate) fn print_answer(answer: &str) {
    println!("{}", answer.truecolor(255, 236, 179));
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{loaded_session, scripted_session};

    #[tokio::test]
    async fn exit_and_help_are_recognised() {
        let dir = tempfile::tempdir().unwrap();
        let mut handler = CommandHandler::new(scripted_session(dir.path(), &["hi"]));
        assert_eq!(handler.handle_command("help").await, Ok(CommandOutcome::Continue));
        assert_eq!(handler.handle_command("  QUIT ").await, Ok(CommandOutcome::Exit));
        assert_eq!(handler.handle_command("").await, Ok(CommandOutcome::Continue));
    }

    #[tokio::test]
    async fn questions_need_a_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut handler = CommandHandler::new(scripted_session(dir.path(), &["hi"]));
        let err = handler.handle_command("What is this?").await.unwrap_err();
        assert!(err.contains("No document loaded"));
    }

    #[tokio::test]
    async fn bare_text_is_asked_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut handler = CommandHandler::new(loaded_session(dir.path(), &["Two ", "years."]).await);

        handler.handle_command("How long is the warranty?").await.unwrap();
        handler.handle_command("stream off").await.unwrap();
        handler.handle_command("quick 1").await.unwrap();

        let history = handler.session().chat_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].answer, "Two years.");
        assert_eq!(history[1].question, crate::session::QUICK_QUESTIONS[0]);
    }

    #[tokio::test]
    async fn settings_commands_update_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut handler = CommandHandler::new(loaded_session(dir.path(), &["ok"]).await);

        handler.handle_command("temp 0.2").await.unwrap();
        handler.handle_command("tokens 256").await.unwrap();
        handler.handle_command("memory off").await.unwrap();
        handler.handle_command("model 2").await.unwrap();

        let settings = handler.session().settings();
        assert!((settings.temperature - 0.2).abs() < 1e-6);
        assert_eq!(settings.max_tokens, 256);
        assert!(!settings.use_memory);
        assert_eq!(settings.model, crate::config::MODEL_OPTIONS[1]);

        assert!(handler.handle_command("temp 5").await.is_err());
        assert!(handler.handle_command("model vendor/unknown model").await.is_ok());
        assert_eq!(handler.session().settings().model, crate::config::MODEL_OPTIONS[1]);
    }

    #[tokio::test]
    async fn questions_starting_with_a_command_word_are_asked() {
        let dir = tempfile::tempdir().unwrap();
        let mut handler = CommandHandler::new(loaded_session(dir.path(), &["Page 3."]).await);
        let model = handler.session().settings().model.clone();

        for question in [
            "Model numbers are listed on which page?",
            "Clear instructions for returns?",
            "Memory requirements of the device?",
            "Report the warranty terms",
            "History of the product?",
            "Load capacity of the shelf?",
            "Temp range for storage?",
        ] {
            assert_eq!(handler.handle_command(question).await, Ok(CommandOutcome::Continue));
        }

        assert_eq!(handler.session().settings().model, model);
        assert!(handler.session().settings().use_memory);
        let history = handler.session().chat_history();
        assert_eq!(history.len(), 7);
        assert_eq!(history[1].question, "Clear instructions for returns?");
        assert!(std::fs::read_dir(&handler.session().config().report_dir)
            .map(|entries| entries.count() == 0)
            .unwrap_or(true));
    }

    #[tokio::test]
    async fn report_command_writes_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut handler = CommandHandler::new(loaded_session(dir.path(), &["ok"]).await);
        let reports = dir.path().join("out");

        handler
            .handle_command(&format!("report {}", reports.display()))
            .await
            .unwrap();
        assert_eq!(std::fs::read_dir(&reports).unwrap().count(), 1);
    }
}
