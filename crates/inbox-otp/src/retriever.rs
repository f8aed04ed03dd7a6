use crate::config::RetrieverConfig;
use crate::filter::{InboxRow, MessageFilter};
use crate::otp::{MessageBody, Otp};
use crate::page::{InboxPage, PageError, PageResult};
use crate::{Error, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const OPERATION: &str = "retrieve_otp";

/// Per-call polling state; lives for one retrieval.
#[derive(Debug)]
pub struct PollState<'a> {
    pub started: Instant,
    pub deadline: Instant,
    pub mailbox: &'a str,
    pub filter: &'a MessageFilter,
}

impl<'a> PollState<'a> {
    pub fn new(mailbox: &'a str, filter: &'a MessageFilter, timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + timeout,
            mailbox,
            filter,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Where a retrieval stands.
///
/// `Polling` and `MatchedPendingExtraction` loop; the rest are terminal.
#[derive(Debug)]
pub enum Phase<R> {
    Polling,
    MatchedPendingExtraction(R),
    Succeeded(Otp),
    FailedTimeout,
    FailedMalformed,
}

impl<R> Phase<R> {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded(_) | Self::FailedTimeout | Self::FailedMalformed
        )
    }
}

/// How to refresh the listing before the next pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    /// Load the listing URL (first pass, or after leaving the listing).
    Navigate,
    Reload,
}

/// Outcome of one pass over the listing.
enum Scan<R> {
    Empty,
    NoMatch,
    Matched(R),
}

/// Polls an inbox listing until a fresh OTP email arrives.
#[derive(Debug, Clone)]
pub struct OtpRetriever {
    config: RetrieverConfig,
}

impl OtpRetriever {
    pub fn new(config: RetrieverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Wait for a message in `mailbox` matching `filter` and return its code.
    ///
    /// Fails with [`Error::Timeout`] if nothing matches before the deadline
    /// and with [`Error::NotFound`] if the first match carries no code. A
    /// malformed match is not retried.
    pub async fn retrieve_otp<P: InboxPage>(
        &self,
        page: &P,
        mailbox: &str,
        filter: &MessageFilter,
    ) -> Result<Otp> {
        let url = self.config.inbox_url(mailbox)?;
        let state = PollState::new(mailbox, filter, self.config.timeout);
        info!(
            "Waiting for OTP email in '{}' (timeout: {}ms)",
            state.mailbox,
            self.config.timeout.as_millis()
        );

        let mut phase = Phase::Polling;
        let mut refresh = Refresh::Navigate;
        let mut last_error: Option<PageError> = None;
        let mut passes = 0u32;

        loop {
            phase = match phase {
                Phase::Polling if state.expired() => Phase::FailedTimeout,
                Phase::Polling => {
                    passes += 1;
                    match self.scan_listing(page, &url, refresh, &state).await {
                        Ok(Scan::Matched(row)) => {
                            last_error = None;
                            Phase::MatchedPendingExtraction(row)
                        }
                        Ok(Scan::Empty) => {
                            debug!("pass {}: inbox empty, reloading", passes);
                            last_error = None;
                            refresh = Refresh::Reload;
                            Phase::Polling
                        }
                        Ok(Scan::NoMatch) => {
                            debug!("pass {}: no matching message yet", passes);
                            last_error = None;
                            refresh = Refresh::Reload;
                            Phase::Polling
                        }
                        Err(e) => {
                            debug!("pass {}: inbox not ready: {}", passes, e);
                            last_error = Some(e);
                            refresh = Refresh::Navigate;
                            page.sleep(self.config.poll_interval.min(state.remaining()))
                                .await;
                            Phase::Polling
                        }
                    }
                }
                Phase::MatchedPendingExtraction(row) => match self.open_message(page, &row).await {
                    Ok(body) => match Otp::extract(&body) {
                        Some(otp) => Phase::Succeeded(otp),
                        None => Phase::FailedMalformed,
                    },
                    Err(e) => {
                        warn!("Failed to open matching message, polling again: {}", e);
                        last_error = Some(e);
                        refresh = Refresh::Navigate;
                        page.sleep(self.config.poll_interval.min(state.remaining()))
                            .await;
                        Phase::Polling
                    }
                },
                Phase::Succeeded(otp) => {
                    info!(
                        "OTP received after {} pass(es) in {}ms",
                        passes,
                        state.started.elapsed().as_millis()
                    );
                    return Ok(otp);
                }
                Phase::FailedTimeout => {
                    return Err(Error::Timeout {
                        operation: OPERATION,
                        bound: self.config.timeout,
                        elapsed: state.started.elapsed(),
                        last_error: last_error.map(|e| e.to_string()),
                    });
                }
                Phase::FailedMalformed => {
                    warn!("Matching message in '{}' has no OTP", state.mailbox);
                    return Err(Error::NotFound);
                }
            };
        }
    }

    async fn scan_listing<P: InboxPage>(
        &self,
        page: &P,
        url: &str,
        refresh: Refresh,
        state: &PollState<'_>,
    ) -> PageResult<Scan<P::Row>> {
        match refresh {
            Refresh::Navigate => page.goto(url).await?,
            Refresh::Reload => page.reload().await?,
        }

        let sel = &self.config.selectors;
        let row_wait = self.config.row_wait.min(state.remaining());
        if let Err(e) = page.wait_for_selector(&sel.rows, row_wait).await {
            debug!("no rows within {}ms: {}", row_wait.as_millis(), e);
            return Ok(Scan::Empty);
        }

        let rows = page.query_all(&sel.rows).await?;
        debug!("scanning {} row(s)", rows.len());
        for handle in rows {
            let row = InboxRow {
                received_label: page.read_field(&handle, &sel.received).await?.trim().to_string(),
                sender: page.read_field(&handle, &sel.sender).await?.trim().to_string(),
                subject: page.read_field(&handle, &sel.subject).await?.trim().to_string(),
            };
            if state.filter.matches(&row) {
                debug!(
                    "matched '{}' from '{}' ({})",
                    row.subject, row.sender, row.received_label
                );
                return Ok(Scan::Matched(handle));
            }
        }

        page.sleep(self.config.poll_interval.min(state.remaining()))
            .await;
        Ok(Scan::NoMatch)
    }

    async fn open_message<P: InboxPage>(&self, page: &P, row: &P::Row) -> PageResult<MessageBody> {
        let body = &self.config.selectors.body;
        page.click(row).await?;
        page.wait_for_selector(body, self.config.body_wait).await?;
        page.read_text(body).await
    }
}

/// Retrieve an OTP with default selectors.
///
/// The default sub-waits are capped at half of `timeout`, so any positive
/// timeout is accepted.
pub async fn retrieve_otp<P: InboxPage>(
    page: &P,
    mailbox: &str,
    sender_filter: &str,
    subject_filter: &str,
    timeout: Duration,
) -> Result<Otp> {
    let retriever = OtpRetriever::new(RetrieverConfig::fitted_to(timeout))?;
    let filter = MessageFilter::new(sender_filter, subject_filter);
    retriever.retrieve_otp(page, mailbox, &filter).await
}
