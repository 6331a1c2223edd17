//! Chat and search panel state machines.
//!
//! The host page shows two overlay panels: the chat box and the
//! similar-problems box. Each is an explicitly owned component (one
//! instance per session, constructed by whoever drives the UI) with the
//! same visibility contract: Hidden becomes Visible on the hotkey or the
//! open button, Visible becomes Hidden on Escape, an overlay click, or the
//! hotkey toggling back. The search panel additionally carries an
//! is-loading flag that gates a transient "working" placeholder message.
//!
//! Panels hold no I/O. Submitting input returns a [`SearchAction`] (or, for
//! chat, the assembled query) for the caller to execute against the relays;
//! the outcome is fed back through `finish`/`fail`. That keeps every state
//! transition directly testable.

use chrono::{DateTime, Utc};

use crate::models::{ChatMessage, MessageRole, ProblemContext, SearchMatch};
use crate::relay::RelayError;

/// UI inputs that drive panel visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelEvent {
    Hotkey,
    OpenButton,
    Escape,
    OverlayClick,
}

/// Who a rendered panel line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelSender {
    User,
    System,
}

/// One rendered panel line.
#[derive(Debug, Clone)]
pub struct PanelMessage {
    pub sender: PanelSender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Marks the transient "working" placeholder so it can be removed when
    /// loading finishes.
    loading: bool,
}

impl PanelMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            sender: PanelSender::System,
            content: content.into(),
            timestamp: Utc::now(),
            loading: false,
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            sender: PanelSender::User,
            content: content.into(),
            timestamp: Utc::now(),
            loading: false,
        }
    }
}

fn apply_visibility(visible: &mut bool, event: PanelEvent) {
    match event {
        PanelEvent::Hotkey => *visible = !*visible,
        PanelEvent::OpenButton => *visible = true,
        PanelEvent::Escape | PanelEvent::OverlayClick => *visible = false,
    }
}

// ============ Chat panel ============

pub const CHAT_GREETING: &str = "Hello! How can I help you today?";

/// The chat box: a message log over the query relay.
pub struct ChatPanel {
    visible: bool,
    messages: Vec<PanelMessage>,
}

impl ChatPanel {
    pub fn new() -> Self {
        Self {
            visible: false,
            messages: vec![PanelMessage::system(CHAT_GREETING)],
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn handle(&mut self, event: PanelEvent) {
        apply_visibility(&mut self.visible, event);
    }

    /// Replace the log with stored history, keeping the greeting on top.
    /// Called when the panel opens so prior messages round-trip in their
    /// original append order.
    pub fn hydrate(&mut self, history: &[ChatMessage]) {
        self.messages = vec![PanelMessage::system(CHAT_GREETING)];
        for message in history {
            self.messages.push(PanelMessage {
                sender: match message.role {
                    MessageRole::User => PanelSender::User,
                    MessageRole::Model => PanelSender::System,
                },
                content: message.text.clone(),
                timestamp: message.timestamp,
                loading: false,
            });
        }
    }

    /// Append the user's input. Blank input is ignored; returns whether a
    /// message was appended (and should be sent).
    pub fn push_user(&mut self, content: &str) -> bool {
        let content = content.trim();
        if content.is_empty() {
            return false;
        }
        self.messages.push(PanelMessage::user(content));
        true
    }

    pub fn push_reply(&mut self, content: &str) {
        self.messages.push(PanelMessage::system(content));
    }

    pub fn push_error(&mut self, error: &RelayError) {
        self.messages
            .push(PanelMessage::system(format!("Error: {}", error)));
    }

    pub fn messages(&self) -> &[PanelMessage] {
        &self.messages
    }

    pub fn render_lines(&self) -> Vec<String> {
        render(&self.messages)
    }
}

impl Default for ChatPanel {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Search panel ============

pub const NO_RESULTS_NOTICE: &str = "No results found for your query.";
pub const NO_QUERY_ID_NOTICE: &str = "No query ID available to fetch data.";
pub const SEARCH_FAILED_NOTICE: &str = "Something went wrong. Please try again later.";
const SEARCHING_PLACEHOLDER: &str = "Searching...";

/// A search the caller should run against the search relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchAction {
    Query(String),
    QueryById(String),
}

/// The similar-problems box: ranked matches over the search relay.
pub struct SearchPanel {
    visible: bool,
    loading: bool,
    messages: Vec<PanelMessage>,
    results: Vec<SearchMatch>,
}

impl SearchPanel {
    pub fn new() -> Self {
        Self {
            visible: false,
            loading: false,
            messages: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn handle(&mut self, event: PanelEvent) {
        apply_visibility(&mut self.visible, event);
    }

    /// A context just became resident: auto-trigger a by-id lookup for it.
    /// A context without a usable id renders a notice instead.
    pub fn on_context_resident(&mut self, ctx: &ProblemContext) -> Option<SearchAction> {
        if ctx.id == 0 {
            self.messages.push(PanelMessage::system(NO_QUERY_ID_NOTICE));
            return None;
        }
        self.set_loading(true);
        Some(SearchAction::QueryById(ctx.id.to_string()))
    }

    /// The user typed a query. Clears previous results, logs the input, and
    /// hands back the search to run. Blank input does nothing. Manual
    /// queries show no loading placeholder, matching the page behavior.
    pub fn begin_query(&mut self, query: &str) -> Option<SearchAction> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        self.clear();
        self.messages.push(PanelMessage::user(query));
        Some(SearchAction::Query(query.to_string()))
    }

    /// Ranked results arrived. An empty set renders exactly one "no
    /// results" notice, never an empty panel.
    pub fn finish(&mut self, results: Vec<SearchMatch>) {
        self.set_loading(false);

        if results.is_empty() {
            self.messages.push(PanelMessage::system(NO_RESULTS_NOTICE));
        } else {
            for result in &results {
                let title = extract_title(&result.metadata.text)
                    .unwrap_or_else(|| "Untitled".to_string());
                self.messages.push(PanelMessage::system(format!(
                    "Title: {}\nSimilarity Score: {:.2}",
                    title, result.score
                )));
            }
        }

        self.results = results;
    }

    /// The search failed; one generic notice, nothing else changes.
    pub fn fail(&mut self, _error: &RelayError) {
        self.set_loading(false);
        self.messages.push(PanelMessage::system(SEARCH_FAILED_NOTICE));
    }

    fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
        if loading {
            let mut placeholder = PanelMessage::system(SEARCHING_PLACEHOLDER);
            placeholder.loading = true;
            self.messages.push(placeholder);
        } else {
            self.messages.retain(|message| !message.loading);
        }
    }

    fn clear(&mut self) {
        self.messages.clear();
        self.results.clear();
        self.loading = false;
    }

    pub fn messages(&self) -> &[PanelMessage] {
        &self.messages
    }

    pub fn results(&self) -> &[SearchMatch] {
        &self.results
    }

    pub fn render_lines(&self) -> Vec<String> {
        render(&self.messages)
    }
}

impl Default for SearchPanel {
    fn default() -> Self {
        Self::new()
    }
}

fn render(messages: &[PanelMessage]) -> Vec<String> {
    messages
        .iter()
        .map(|message| match message.sender {
            PanelSender::User => format!("> {}", message.content),
            PanelSender::System => message.content.clone(),
        })
        .collect()
}

/// Display title for a match: the metadata text up to its first line break.
pub fn extract_title(metadata_text: &str) -> Option<String> {
    let first_line = match metadata_text.find('\n') {
        Some(index) => &metadata_text[..index],
        None => metadata_text,
    };
    let trimmed = first_line.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchMetadata;

    fn search_match(id: &str, score: f64, text: &str) -> SearchMatch {
        SearchMatch {
            id: id.to_string(),
            score,
            metadata: MatchMetadata {
                text: text.to_string(),
            },
        }
    }

    fn resident(id: u64) -> ProblemContext {
        ProblemContext {
            id,
            title: "Two Sum".to_string(),
            description: "d".to_string(),
            constraints: "c".to_string(),
            input_format: "i".to_string(),
            output_format: "o".to_string(),
            hints: Vec::new(),
            samples: Vec::new(),
            supported_languages: Vec::new(),
            editorial_solution: "e".to_string(),
            user_code: None,
        }
    }

    #[test]
    fn test_visibility_transitions() {
        let mut panel = ChatPanel::new();
        assert!(!panel.is_visible());

        panel.handle(PanelEvent::Hotkey);
        assert!(panel.is_visible());
        panel.handle(PanelEvent::Escape);
        assert!(!panel.is_visible());

        panel.handle(PanelEvent::OpenButton);
        assert!(panel.is_visible());
        panel.handle(PanelEvent::OverlayClick);
        assert!(!panel.is_visible());

        // Hotkey toggles both ways.
        panel.handle(PanelEvent::Hotkey);
        panel.handle(PanelEvent::Hotkey);
        assert!(!panel.is_visible());
    }

    #[test]
    fn test_escape_on_hidden_panel_stays_hidden() {
        let mut panel = SearchPanel::new();
        panel.handle(PanelEvent::Escape);
        assert!(!panel.is_visible());
    }

    #[test]
    fn test_chat_opens_with_greeting() {
        let panel = ChatPanel::new();
        assert_eq!(panel.render_lines(), vec![CHAT_GREETING.to_string()]);
    }

    #[test]
    fn test_chat_hydrate_preserves_append_order() {
        let mut panel = ChatPanel::new();
        panel.push_user("stale");

        let history = vec![
            ChatMessage {
                role: MessageRole::User,
                text: "first".to_string(),
                timestamp: Utc::now(),
            },
            ChatMessage {
                role: MessageRole::Model,
                text: "second".to_string(),
                timestamp: Utc::now(),
            },
        ];
        panel.hydrate(&history);

        assert_eq!(
            panel.render_lines(),
            vec![
                CHAT_GREETING.to_string(),
                "> first".to_string(),
                "second".to_string()
            ]
        );
    }

    #[test]
    fn test_chat_ignores_blank_input() {
        let mut panel = ChatPanel::new();
        assert!(!panel.push_user("   "));
        assert_eq!(panel.messages().len(), 1);
    }

    #[test]
    fn test_chat_renders_relay_errors() {
        let mut panel = ChatPanel::new();
        panel.push_error(&RelayError::MissingContext);
        assert_eq!(
            panel.render_lines().last().unwrap(),
            "Error: No context available"
        );
    }

    #[test]
    fn test_auto_trigger_sets_loading_and_returns_action() {
        let mut panel = SearchPanel::new();
        let action = panel.on_context_resident(&resident(7));
        assert_eq!(action, Some(SearchAction::QueryById("7".to_string())));
        assert!(panel.is_loading());
        assert_eq!(panel.messages().len(), 1); // the placeholder
    }

    #[test]
    fn test_auto_trigger_without_id_renders_notice() {
        let mut panel = SearchPanel::new();
        let action = panel.on_context_resident(&resident(0));
        assert_eq!(action, None);
        assert!(!panel.is_loading());
        assert_eq!(panel.render_lines(), vec![NO_QUERY_ID_NOTICE.to_string()]);
    }

    #[test]
    fn test_loading_placeholder_removed_on_finish() {
        let mut panel = SearchPanel::new();
        panel.on_context_resident(&resident(7));
        panel.finish(vec![search_match("7", 0.91, "Two Sum\nbody text")]);

        assert!(!panel.is_loading());
        let lines = panel.render_lines();
        assert_eq!(lines, vec!["Title: Two Sum\nSimilarity Score: 0.91"]);
    }

    #[test]
    fn test_empty_results_render_single_notice() {
        let mut panel = SearchPanel::new();
        panel.begin_query("graphs");
        panel.finish(Vec::new());

        let notices = panel
            .messages()
            .iter()
            .filter(|message| message.content == NO_RESULTS_NOTICE)
            .count();
        assert_eq!(notices, 1);
        // One user line + the notice, nothing else.
        assert_eq!(panel.messages().len(), 2);
    }

    #[test]
    fn test_new_query_clears_previous_results() {
        let mut panel = SearchPanel::new();
        panel.begin_query("first");
        panel.finish(vec![search_match("1", 0.5, "One\nbody")]);

        let action = panel.begin_query("second");
        assert_eq!(action, Some(SearchAction::Query("second".to_string())));
        assert_eq!(panel.messages().len(), 1);
        assert!(panel.results().is_empty());
    }

    #[test]
    fn test_failure_renders_generic_notice() {
        let mut panel = SearchPanel::new();
        panel.begin_query("graphs");
        panel.fail(&RelayError::Remote("boom".to_string()));
        assert_eq!(
            panel.render_lines().last().unwrap(),
            SEARCH_FAILED_NOTICE
        );
    }

    #[test]
    fn test_blank_search_input_is_ignored() {
        let mut panel = SearchPanel::new();
        assert_eq!(panel.begin_query("  "), None);
        assert!(panel.messages().is_empty());
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title("Two Sum\nGiven an array..."),
            Some("Two Sum".to_string())
        );
        assert_eq!(extract_title("Single line"), Some("Single line".to_string()));
        assert_eq!(extract_title("\nbody"), None);
        assert_eq!(extract_title(""), None);
    }
}
