use augur_core::message::Message;
use augur_core::provider::Usage;
use augur_core::SessionId;
use chrono::{DateTime, Utc};

/// One interactive conversation.
///
/// The history is append-only while the session lives; only [`Session::clear`]
/// discards it. The loop is the only writer and takes `&mut Session`.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub model: String,
    pub system_prompt: String,
    pub verbose: bool,
    /// Token usage across every turn of this session
    pub usage: Usage,
    pub created_at: DateTime<Utc>,
    history: Vec<Message>,
}

impl Session {
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            model: model.into(),
            system_prompt: system_prompt.into(),
            verbose: false,
            usage: Usage::default(),
            created_at: Utc::now(),
            history: Vec::new(),
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn push(&mut self, message: Message) {
        self.history.push(message);
    }

    /// Drop everything past `len`. Used to undo an aborted turn.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.history.truncate(len);
    }

    /// Forget the conversation. Usage counters survive.
    pub fn clear(&mut self) {
        self.history.clear();
    }
}
