//! Gateway session
//!
//! Resume state owned by one shard task.

/// Resume state of a shard
///
/// `session_id` is set by READY and cleared when the platform reports the
/// session cannot be resumed. Without it the next connection identifies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    session_id: Option<String>,
    sequence: Option<u64>,
    resume_url: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session from a READY dispatch
    pub fn start(&mut self, session_id: String, resume_url: Option<String>, sequence: Option<u64>) {
        self.session_id = Some(session_id);
        self.resume_url = resume_url;
        if sequence.is_some() {
            self.sequence = sequence;
        }
    }

    /// Record the sequence of a dispatch frame
    pub fn record(&mut self, sequence: u64) {
        self.sequence = Some(sequence);
    }

    /// Forget everything; the next connection identifies
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_resumable(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn resume_url(&self) -> Option<&str> {
        self.resume_url.as_deref()
    }
}
