use super::{is_exit, CommandHandler, CommandResult};

/// Repeats every transcript back; an exit phrase ends the session
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl CommandHandler for EchoHandler {
    fn handle(&mut self, text: &str) -> CommandResult {
        if is_exit(text) {
            tracing::info!(text, "exit phrase heard in echo mode");
            CommandResult::finish(format!(
                "You said: {text}. Goodbye! Voice assistant is shutting down."
            ))
        } else {
            CommandResult::reply(format!("You said: {text}"))
        }
    }
}
