//! services/api/src/adapters/console_notifier.rs
//!
//! A `Notifier` for the command-line client: notices go to the terminal, errors
//! and warnings to stderr.

use smartcart_core::ports::{NoticeLevel, Notifier};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

/// The terminal line for a notice.
pub fn format_notice(level: NoticeLevel, message: &str) -> String {
    let tag = match level {
        NoticeLevel::Success => "ok",
        NoticeLevel::Info => "info",
        NoticeLevel::Warning => "warning",
        NoticeLevel::Error => "error",
    };
    format!("[{}] {}", tag, message)
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        debug!(?level, %message, "Notice");
        let line = format_notice(level, message);
        match level {
            NoticeLevel::Warning | NoticeLevel::Error => eprintln!("{}", line),
            NoticeLevel::Success | NoticeLevel::Info => println!("{}", line),
        }
    }
}
