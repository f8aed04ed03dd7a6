use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;

/// One listing entry as rendered by the inbox.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InboxRow {
    /// Relative receive time, e.g. "a few seconds ago".
    pub received_label: String,
    /// Display sender, e.g. `No Reply <noreply@example.com>`.
    pub sender: String,
    pub subject: String,
}

/// Decides whether a row's receive label counts as freshly delivered.
///
/// The mailbox is shared across runs, so a stale message with the same
/// sender and subject must not be picked up.
pub trait RecencyRule: Send + Sync {
    fn is_recent(&self, label: &str) -> bool;
}

impl<F> RecencyRule for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_recent(&self, label: &str) -> bool {
        self(label)
    }
}

/// Matches the relative-time phrases webmail listings render for new mail.
#[derive(Debug, Clone)]
pub struct RelativeLabel {
    phrases: Vec<String>,
    keyword: String,
}

impl Default for RelativeLabel {
    fn default() -> Self {
        Self {
            phrases: vec!["a few seconds ago".into(), "just now".into()],
            keyword: "seconds".into(),
        }
    }
}

impl RelativeLabel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an additional exact phrase (case-insensitive).
    pub fn phrase(mut self, phrase: impl Into<String>) -> Self {
        self.phrases.push(phrase.into());
        self
    }

    /// Word that marks a label as recent wherever it appears.
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = keyword.into();
        self
    }
}

impl RecencyRule for RelativeLabel {
    fn is_recent(&self, label: &str) -> bool {
        let label = label.trim().to_lowercase();
        if self.phrases.iter().any(|p| p.to_lowercase() == label) {
            return true;
        }
        let keyword = self.keyword.to_lowercase();
        label
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == keyword)
    }
}

/// Treats the label as an absolute timestamp (RFC 3339 or RFC 2822) and
/// accepts it when no older than `max_age`.
#[derive(Debug, Clone)]
pub struct MaxAge {
    max_age: Duration,
}

impl MaxAge {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    pub fn is_recent_at(&self, label: &str, now: DateTime<Utc>) -> bool {
        let label = label.trim();
        let parsed = DateTime::parse_from_rfc3339(label)
            .or_else(|_| DateTime::parse_from_rfc2822(label));
        match parsed {
            Ok(ts) => now.signed_duration_since(ts.with_timezone(&Utc)) <= self.max_age,
            Err(_) => false,
        }
    }
}

impl RecencyRule for MaxAge {
    fn is_recent(&self, label: &str) -> bool {
        self.is_recent_at(label, Utc::now())
    }
}

/// Sender substring + exact subject + recency.
#[derive(Clone)]
pub struct MessageFilter {
    pub sender_contains: String,
    pub subject_equals: String,
    recency: Arc<dyn RecencyRule>,
}

impl MessageFilter {
    pub fn new(sender_contains: impl Into<String>, subject_equals: impl Into<String>) -> Self {
        Self {
            sender_contains: sender_contains.into(),
            subject_equals: subject_equals.into(),
            recency: Arc::new(RelativeLabel::default()),
        }
    }

    /// Swap the recency rule.
    pub fn recency(mut self, rule: impl RecencyRule + 'static) -> Self {
        self.recency = Arc::new(rule);
        self
    }

    pub fn matches(&self, row: &InboxRow) -> bool {
        row.sender.contains(&self.sender_contains)
            && row.subject == self.subject_equals
            && self.recency.is_recent(&row.received_label)
    }
}

impl fmt::Debug for MessageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageFilter")
            .field("sender_contains", &self.sender_contains)
            .field("subject_equals", &self.subject_equals)
            .finish_non_exhaustive()
    }
}
