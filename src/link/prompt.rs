//! User interaction collaborator.
//!
//! The protocol core never touches a UI toolkit. Anything that needs a
//! human decision or should be shown to the user goes through this trait;
//! adapters implement it for a console, a TUI or anything else.

use std::path::PathBuf;

use async_trait::async_trait;

/// Questions and notices the link raises while running.
#[async_trait]
pub trait UiPrompt: Send + Sync {
    /// Ask a yes/no question. `false` on any failure to ask.
    async fn confirm(&self, question: &str) -> bool;

    /// Show an error notice.
    fn notify_error(&self, message: &str);

    /// Show an informational notice, including received chat messages.
    fn notify_info(&self, message: &str);

    /// Ask where to save a received file. `None` skips the save.
    async fn choose_save_destination(&self, suggested_name: &str) -> Option<PathBuf>;

    /// Ask for a file to send. `None` cancels.
    async fn choose_source_file(&self) -> Option<PathBuf>;
}
