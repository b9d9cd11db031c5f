//! Transport-agnostic message router.
//!
//! A chat transport converts its updates into [`InboundEvent`]s and sends
//! back the [`Reply`]s produced here. Text is classified into commands,
//! links and small talk; media goes to the analysis dispatcher; button
//! presses arrive as callbacks. Commands and callbacks are closed enums so
//! every variant has exactly one handler.
//!
//! Replies carry only user-facing text. Error detail is logged.

use crate::config::MediaflowConfig;
use crate::history::{
    FilesystemHistoryStore, HistoryStore, history_stats, render_history, render_stats,
};
use crate::models::{OwnerId, TransferOutcome};
use crate::services::analysis::AnalysisDispatcher;
use crate::services::download::{DownloadService, extract_locators};
use crate::storage::{DeferredCleanup, StorageConfig, StorageManager};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

/// Records shown by `/history`.
const HISTORY_PAGE: usize = 10;

/// Words treated as a greeting.
const GREETINGS: &[&str] = &[
    "hi", "hello", "hey", "hola", "buenas", "good morning", "good evening",
];

const HELP_TEXT: &str = "Available commands:\n\
/start - Start the bot\n\
/help - Show this help\n\
/history [kind] - Show recent downloads and results\n\
/clear - Clear your history\n\
/stats - History statistics\n\n\
Send a link to download it, or a photo to analyze it.";

/// An event delivered by the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A text message.
    Text {
        /// Sender.
        owner: OwnerId,
        /// Transport message identity.
        message_id: i64,
        /// Message text.
        text: String,
    },
    /// A media message already saved to a local temporary file.
    Media {
        /// Sender.
        owner: OwnerId,
        /// Transport message identity.
        message_id: i64,
        /// Temporary local copy; deleted after the configured TTL.
        path: PathBuf,
    },
    /// A button press.
    Callback {
        /// Sender.
        owner: OwnerId,
        /// Message the button belongs to.
        message_id: i64,
        /// Opaque button data.
        data: String,
    },
}

impl InboundEvent {
    /// Sender of the event.
    #[must_use]
    pub const fn owner(&self) -> OwnerId {
        match self {
            Self::Text { owner, .. } | Self::Media { owner, .. } | Self::Callback { owner, .. } => {
                *owner
            },
        }
    }
}

/// A button attached to a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Label shown to the user.
    pub label: String,
    /// Action triggered on press.
    pub action: CallbackAction,
}

impl Button {
    /// Creates a button.
    #[must_use]
    pub fn new(label: impl Into<String>, action: CallbackAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// A response for the transport to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// Status text.
    pub text: String,
    /// File to attach.
    pub attachment: Option<PathBuf>,
    /// Buttons to show under the message.
    pub buttons: Vec<Button>,
}

impl Reply {
    /// A text-only reply.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Attaches a file.
    #[must_use]
    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachment = Some(path.into());
        self
    }

    /// Adds a button.
    #[must_use]
    pub fn with_button(mut self, button: Button) -> Self {
        self.buttons.push(button);
        self
    }
}

/// Slash commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start`
    Start,
    /// `/help`
    Help,
    /// `/history [kind]`
    History(Option<String>),
    /// `/clear`
    Clear,
    /// `/stats`
    Stats,
    /// Anything else starting with `/`.
    Unknown(String),
}

impl Command {
    /// Parses a message starting with `/`. Returns `None` for other text.
    ///
    /// A `@botname` suffix on the command word is ignored.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut words = text.trim().split_whitespace();
        let word = words.next()?.strip_prefix('/')?;
        let name = word.split('@').next().unwrap_or_default().to_lowercase();
        Some(match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "history" => Self::History(words.next().map(str::to_lowercase)),
            "clear" => Self::Clear,
            "stats" => Self::Stats,
            _ => Self::Unknown(name),
        })
    }
}

/// Actions carried by buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// Delete the owner's history.
    ClearHistory,
    /// Show per-kind history counts.
    HistoryStats,
    /// Send the full report of an earlier analysis.
    FullReport(String),
}

impl CallbackAction {
    const FULL_REPORT_PREFIX: &'static str = "full_report:";

    /// Encodes the action as button data.
    #[must_use]
    pub fn to_data(&self) -> String {
        match self {
            Self::ClearHistory => "clear_history".to_string(),
            Self::HistoryStats => "history_stats".to_string(),
            Self::FullReport(id) => format!("{}{id}", Self::FULL_REPORT_PREFIX),
        }
    }

    /// Decodes button data.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "clear_history" => Some(Self::ClearHistory),
            "history_stats" => Some(Self::HistoryStats),
            _ => data
                .strip_prefix(Self::FULL_REPORT_PREFIX)
                .filter(|id| !id.is_empty())
                .map(|id| Self::FullReport(id.to_string())),
        }
    }
}

/// Routes inbound events to the download, analysis and history services.
pub struct Router {
    downloads: Arc<DownloadService>,
    analysis: Arc<AnalysisDispatcher>,
    history: Arc<dyn HistoryStore>,
    cleanup: DeferredCleanup,
    report_dir: PathBuf,
    /// Written reports by button id, with the owner they were written for.
    reports: Mutex<HashMap<String, (OwnerId, PathBuf)>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("downloads", &self.downloads)
            .field("analysis", &self.analysis)
            .field("report_dir", &self.report_dir)
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Creates a router from its services.
    #[must_use]
    pub fn new(
        downloads: Arc<DownloadService>,
        analysis: Arc<AnalysisDispatcher>,
        history: Arc<dyn HistoryStore>,
        cleanup: DeferredCleanup,
        report_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            downloads,
            analysis,
            history,
            cleanup,
            report_dir: report_dir.into(),
            reports: Mutex::new(HashMap::new()),
        }
    }

    /// Wires every service from configuration, sharing one storage manager
    /// and one history store.
    ///
    /// # Errors
    ///
    /// Returns an error if a service cannot be initialized.
    pub fn from_config(config: &MediaflowConfig) -> Result<Self> {
        let storage = Arc::new(StorageManager::new(StorageConfig::from_config(config)));
        let history: Arc<dyn HistoryStore> =
            Arc::new(FilesystemHistoryStore::new(config.history_dir())?);
        let downloads = DownloadService::from_parts(config, storage, Arc::clone(&history))?;
        let analysis = AnalysisDispatcher::from_config(config, Arc::clone(&history))?;
        Ok(Self::new(
            Arc::new(downloads),
            Arc::new(analysis),
            history,
            DeferredCleanup::new(config.storage.temp_file_ttl),
            config.temp_dir(),
        ))
    }

    /// Handles one event. Always yields at least one reply.
    #[instrument(skip(self, event), fields(owner = %event.owner()))]
    pub async fn handle(&self, event: InboundEvent) -> Vec<Reply> {
        match event {
            InboundEvent::Text { owner, text, .. } => self.on_text(owner, &text).await,
            InboundEvent::Media { owner, path, .. } => vec![self.on_media(owner, path).await],
            InboundEvent::Callback { owner, data, .. } => {
                let reply = match CallbackAction::parse(&data) {
                    Some(action) => self.on_callback(owner, action),
                    None => {
                        warn!(data = %data, "Unrecognized callback data");
                        Reply::text("That button is no longer available.")
                    },
                };
                vec![reply]
            },
        }
    }

    async fn on_text(&self, owner: OwnerId, text: &str) -> Vec<Reply> {
        if let Some(command) = Command::parse(text) {
            return vec![self.on_command(owner, command)];
        }

        let locators = extract_locators(text);
        if !locators.is_empty() {
            info!(count = locators.len(), "Downloading links");
            let outcomes = self.downloads.fetch_many(&locators, owner).await;
            return outcomes.into_iter().flat_map(outcome_replies).collect();
        }

        if is_greeting(text) {
            return vec![Reply::text(
                "Hello! Send me a link to download or a photo to analyze.",
            )];
        }
        vec![Reply::text(
            "I didn't understand that. Send a link, a photo, or /help.",
        )]
    }

    fn on_command(&self, owner: OwnerId, command: Command) -> Reply {
        match command {
            Command::Start => Reply::text(
                "Welcome! Send me a link and I'll download it, or a photo and I'll analyze it.\n\
                 Use /help to see every command.",
            ),
            Command::Help => Reply::text(HELP_TEXT),
            Command::History(kind) => self.show_history(owner, kind.as_deref()),
            Command::Clear => self.clear_history(owner),
            Command::Stats => self.show_stats(owner),
            Command::Unknown(name) => {
                Reply::text(format!("Unknown command /{name}. Send /help to see what I can do."))
            },
        }
    }

    fn on_callback(&self, owner: OwnerId, action: CallbackAction) -> Reply {
        match action {
            CallbackAction::ClearHistory => self.clear_history(owner),
            CallbackAction::HistoryStats => self.show_stats(owner),
            CallbackAction::FullReport(id) => self.full_report(owner, &id),
        }
    }

    async fn on_media(&self, owner: OwnerId, path: PathBuf) -> Reply {
        self.cleanup.schedule(path.clone());
        let summary = self.analysis.analyze(&path, owner).await;
        let reply = Reply::text(summary.render());
        if summary.secondary_count() == 0 {
            return reply;
        }

        match summary.write_report(&self.report_dir).await {
            Ok(report) => {
                self.cleanup.schedule(report.clone());
                let id = uuid::Uuid::new_v4().simple().to_string();
                if let Ok(mut reports) = self.reports.lock() {
                    reports.retain(|_, (_, path)| path.exists());
                    reports.insert(id.clone(), (owner, report));
                }
                reply.with_button(Button::new("Full report", CallbackAction::FullReport(id)))
            },
            Err(e) => {
                warn!(error = %e, "Could not write analysis report");
                reply
            },
        }
    }

    fn show_history(&self, owner: OwnerId, kind: Option<&str>) -> Reply {
        match self.history.query(owner, kind, Some(HISTORY_PAGE)) {
            Ok(records) if records.is_empty() => Reply::text(render_history(&records)),
            Ok(records) => Reply::text(render_history(&records))
                .with_button(Button::new("Clear", CallbackAction::ClearHistory))
                .with_button(Button::new("Statistics", CallbackAction::HistoryStats)),
            Err(e) => failure_reply(&e, "Failed to read history"),
        }
    }

    fn clear_history(&self, owner: OwnerId) -> Reply {
        match self.history.clear(owner) {
            Ok(0) => Reply::text("Your history is already empty."),
            Ok(removed) => Reply::text(format!("History cleared ({removed} records removed).")),
            Err(e) => failure_reply(&e, "Failed to clear history"),
        }
    }

    fn show_stats(&self, owner: OwnerId) -> Reply {
        match self.history.query(owner, None, None) {
            Ok(records) => Reply::text(render_stats(&history_stats(&records))),
            Err(e) => failure_reply(&e, "Failed to read history"),
        }
    }

    /// Only the owner a report was written for can fetch it.
    fn full_report(&self, owner: OwnerId, id: &str) -> Reply {
        let path = self
            .reports
            .lock()
            .ok()
            .and_then(|reports| reports.get(id).cloned())
            .filter(|(written_for, _)| *written_for == owner)
            .map(|(_, path)| path)
            .filter(|path| path.exists());
        match path {
            Some(path) => Reply::text("Full analysis report").with_attachment(path),
            None => Reply::text("That report has expired. Send the file again."),
        }
    }
}

fn outcome_replies(outcome: TransferOutcome) -> Vec<Reply> {
    let mut replies = Vec::with_capacity(1 + outcome.secondary.len());
    let primary = Reply::text(outcome.message);
    replies.push(match outcome.local_path {
        Some(path) => primary.with_attachment(path),
        None => primary,
    });
    replies.extend(outcome.secondary.into_iter().map(|path| {
        let name = path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        Reply::text(name).with_attachment(path)
    }));
    replies
}

fn failure_reply(error: &Error, context: &str) -> Reply {
    warn!(error = %error, "{context}");
    Reply::text(error.user_message())
}

fn is_greeting(text: &str) -> bool {
    let normalized = text
        .trim()
        .trim_end_matches(['!', '.', '?'])
        .to_lowercase();
    GREETINGS.contains(&normalized.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("/start", Some(Command::Start); "start")]
    #[test_case("/HELP", Some(Command::Help); "uppercase help")]
    #[test_case("/history@media_bot video", Some(Command::History(Some("video".into()))); "history with bot suffix")]
    #[test_case("/history", Some(Command::History(None)); "history without kind")]
    #[test_case("/game", Some(Command::Unknown("game".into())); "unknown")]
    #[test_case("hello", None; "not a command")]
    fn test_command_parse(text: &str, expected: Option<Command>) {
        assert_eq!(Command::parse(text), expected);
    }

    #[test]
    fn test_callback_data() {
        for action in [
            CallbackAction::ClearHistory,
            CallbackAction::HistoryStats,
            CallbackAction::FullReport("abc123".to_string()),
        ] {
            assert_eq!(CallbackAction::parse(&action.to_data()), Some(action));
        }
        assert_eq!(CallbackAction::parse("full_report:"), None);
        assert_eq!(CallbackAction::parse("manga_search"), None);
    }

    #[test_case("Hello!", true; "english")]
    #[test_case("  hola ", true; "spanish")]
    #[test_case("hello there friend", false; "sentence")]
    fn test_is_greeting(text: &str, expected: bool) {
        assert_eq!(is_greeting(text), expected);
    }

    #[test]
    fn test_outcome_replies() {
        let mut outcome = TransferOutcome::failure(
            "https://example.com/a.mp4",
            "The download failed. Try again later.",
            std::time::Duration::ZERO,
        );
        let replies = outcome_replies(outcome.clone());
        assert_eq!(replies.len(), 1);
        assert!(replies[0].attachment.is_none());

        outcome.local_path = Some(PathBuf::from("/data/videos/a.mp4"));
        outcome.secondary = vec![PathBuf::from("/data/audio/a.mp3")];
        let replies = outcome_replies(outcome);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[1].text, "a.mp3");
    }
}
