use crate::{Error, Result};
use std::time::Duration;
use url::Url;

/// CSS selectors for the inbox listing and message view.
#[derive(Debug, Clone)]
pub struct InboxSelectors {
    /// One element per listed message, most recent first.
    pub rows: String,
    /// Relative receive time, relative to a row.
    pub received: String,
    /// Sender display text, relative to a row.
    pub sender: String,
    /// Subject text, relative to a row.
    pub subject: String,
    /// Container of an opened message's body.
    pub body: String,
}

impl Default for InboxSelectors {
    fn default() -> Self {
        Self {
            rows: "table.email tbody tr.emailheader".into(),
            received: "td:nth-child(1) time".into(),
            sender: "td:nth-child(2) a.email".into(),
            subject: "td:nth-child(4) a.email".into(),
            body: "#emailbody".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Overall bound for one retrieval.
    pub timeout: Duration,
    /// How long to wait for at least one row before reloading.
    pub row_wait: Duration,
    /// How long to wait for an opened message body.
    pub body_wait: Duration,
    /// Pause after a pass with no matching row.
    pub poll_interval: Duration,
    /// Listing URL prefix; the mailbox is appended as a path segment.
    pub inbox_base_url: String,
    pub selectors: InboxSelectors,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            row_wait: Duration::from_secs(5),
            body_wait: Duration::from_secs(5),
            poll_interval: Duration::from_secs(3),
            inbox_base_url: "https://mailnesia.com/mailbox/".into(),
            selectors: InboxSelectors::default(),
        }
    }
}

impl RetrieverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with every sub-wait capped at half of `timeout`.
    pub fn fitted_to(timeout: Duration) -> Self {
        let cap = timeout / 2;
        let defaults = Self::default();
        Self {
            timeout,
            row_wait: defaults.row_wait.min(cap),
            body_wait: defaults.body_wait.min(cap),
            poll_interval: defaults.poll_interval.min(cap),
            ..defaults
        }
    }

    pub fn timeout(mut self, v: Duration) -> Self {
        self.timeout = v;
        self
    }

    pub fn row_wait(mut self, v: Duration) -> Self {
        self.row_wait = v;
        self
    }

    pub fn body_wait(mut self, v: Duration) -> Self {
        self.body_wait = v;
        self
    }

    pub fn poll_interval(mut self, v: Duration) -> Self {
        self.poll_interval = v;
        self
    }

    pub fn inbox_base_url(mut self, v: impl Into<String>) -> Self {
        self.inbox_base_url = v.into();
        self
    }

    pub fn selectors(mut self, v: InboxSelectors) -> Self {
        self.selectors = v;
        self
    }

    /// Every sub-wait must be strictly shorter than the overall timeout so a
    /// single stuck wait cannot starve the deadline check.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".into()));
        }
        for (name, wait) in [
            ("row_wait", self.row_wait),
            ("body_wait", self.body_wait),
            ("poll_interval", self.poll_interval),
        ] {
            if wait >= self.timeout {
                return Err(Error::Config(format!(
                    "{} ({}ms) must be shorter than timeout ({}ms)",
                    name,
                    wait.as_millis(),
                    self.timeout.as_millis()
                )));
            }
        }
        let s = &self.selectors;
        if [&s.rows, &s.received, &s.sender, &s.subject, &s.body]
            .iter()
            .any(|sel| sel.trim().is_empty())
        {
            return Err(Error::Config("inbox selectors must not be empty".into()));
        }
        Ok(())
    }

    /// Listing URL for `mailbox`.
    pub fn inbox_url(&self, mailbox: &str) -> Result<String> {
        let mailbox = mailbox.trim();
        if mailbox.is_empty() {
            return Err(Error::Config("mailbox is required".into()));
        }
        let mut url = Url::parse(&self.inbox_base_url).map_err(|e| {
            Error::Config(format!("invalid inbox url '{}': {}", self.inbox_base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                Error::Config(format!(
                    "inbox url '{}' cannot take a mailbox path",
                    self.inbox_base_url
                ))
            })?
            .pop_if_empty()
            .push(mailbox);
        Ok(url.into())
    }
}

/// Local part of an email address; a bare mailbox name passes through.
pub fn mailbox_of(address: &str) -> &str {
    let address = address.trim();
    address.split_once('@').map(|(local, _)| local).unwrap_or(address)
}
