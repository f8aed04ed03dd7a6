//! Browser side of OTP retrieval: an [`InboxPage`] over an eoka tab.

use crate::config::actions::RetrieveOtpAction;
use crate::Result;
use eoka::{Browser, Page};
use inbox_otp::{
    mailbox_of, InboxPage, MessageFilter, Otp, OtpRetriever, PageError, PageResult,
    RetrieverConfig,
};
use std::time::Duration;
use tracing::{info, warn};

/// Text of the first `__FIELD__` inside the `__INDEX__`th `__ROWS__` match.
const READ_FIELD_JS: &str = r#"(() => {
    const row = document.querySelectorAll(__ROWS__)[__INDEX__];
    if (!row) return null;
    const el = row.querySelector(__FIELD__);
    return el ? (el.textContent || '') : '';
})()"#;

/// Follow the row's message link, or click the row itself.
const CLICK_ROW_JS: &str = r#"(() => {
    const row = document.querySelectorAll(__ROWS__)[__INDEX__];
    if (!row) return false;
    (row.querySelector('a[href]') || row).click();
    return true;
})()"#;

/// A listed row: its position among the rows matched by `rows`.
#[derive(Debug, Clone)]
pub struct RowRef {
    rows: String,
    index: usize,
}

impl RowRef {
    fn script(&self, template: &str) -> PageResult<String> {
        Ok(template
            .replace("__ROWS__", &literal(&self.rows)?)
            .replace("__INDEX__", &self.index.to_string()))
    }
}

/// Inbox listing shown in a browser tab.
pub struct BrowserInbox<'a> {
    page: &'a Page,
}

impl<'a> BrowserInbox<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page }
    }
}

fn literal(s: &str) -> PageResult<String> {
    serde_json::to_string(s).map_err(PageError::new)
}

fn millis(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}

impl InboxPage for BrowserInbox<'_> {
    type Row = RowRef;

    async fn goto(&self, url: &str) -> PageResult<()> {
        self.page.goto(url).await.map_err(PageError::new)
    }

    async fn reload(&self) -> PageResult<()> {
        self.page.reload().await.map_err(PageError::new)
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> PageResult<()> {
        self.page
            .wait_for(selector, millis(timeout))
            .await
            .map(|_| ())
            .map_err(PageError::new)
    }

    async fn query_all(&self, selector: &str) -> PageResult<Vec<RowRef>> {
        let js = format!("document.querySelectorAll({}).length", literal(selector)?);
        let count: usize = self.page.evaluate(&js).await.map_err(PageError::new)?;
        Ok((0..count)
            .map(|index| RowRef {
                rows: selector.to_string(),
                index,
            })
            .collect())
    }

    async fn read_field(&self, row: &RowRef, selector: &str) -> PageResult<String> {
        let js = row
            .script(READ_FIELD_JS)?
            .replace("__FIELD__", &literal(selector)?);
        let text: Option<String> = self.page.evaluate(&js).await.map_err(PageError::new)?;
        text.ok_or_else(|| PageError::new(format!("row {} detached", row.index)))
    }

    async fn click(&self, row: &RowRef) -> PageResult<()> {
        let clicked: bool = self
            .page
            .evaluate(&row.script(CLICK_ROW_JS)?)
            .await
            .map_err(PageError::new)?;
        if clicked {
            Ok(())
        } else {
            Err(PageError::new(format!("row {} detached", row.index)))
        }
    }

    async fn read_text(&self, selector: &str) -> PageResult<String> {
        let js = format!(
            "(() => {{ const el = document.querySelector({}); return el ? (el.textContent || '') : null; }})()",
            literal(selector)?
        );
        let text: Option<String> = self.page.evaluate(&js).await.map_err(PageError::new)?;
        text.ok_or_else(|| PageError::new(format!("'{}' not found", selector)))
    }

    async fn sleep(&self, duration: Duration) {
        self.page.wait(millis(duration)).await;
    }
}

/// Retriever settings for a `retrieve_otp` action.
pub fn retriever_config(action: &RetrieveOtpAction) -> RetrieverConfig {
    let mut config = RetrieverConfig::default()
        .timeout(Duration::from_millis(action.timeout_ms))
        .poll_interval(Duration::from_millis(action.poll_interval_ms));
    if let Some(ref url) = action.inbox_url {
        config = config.inbox_base_url(url.clone());
    }
    config
}

/// Open the inbox in a new tab, wait for the code, then return focus to
/// `return_to`. The inbox tab is closed whatever the outcome.
pub async fn retrieve_otp(
    browser: &Browser,
    return_to: &Page,
    action: &RetrieveOtpAction,
    address: &str,
) -> Result<Otp> {
    let retriever = OtpRetriever::new(retriever_config(action))?;
    let filter = MessageFilter::new(action.sender.as_str(), action.subject.as_str());
    let mailbox = mailbox_of(address);

    let inbox_page = browser.new_page("about:blank").await?;
    let inbox_tab = inbox_page.target_id().to_string();
    info!("retrieve_otp: polling mailbox '{}' in tab {}", mailbox, inbox_tab);

    let outcome = retriever
        .retrieve_otp(&BrowserInbox::new(&inbox_page), mailbox, &filter)
        .await;
    drop(inbox_page);

    if let Err(e) = browser.close_tab(&inbox_tab).await {
        warn!("Failed to close inbox tab {}: {}", inbox_tab, e);
    }
    browser.activate_tab(return_to.target_id()).await?;

    Ok(outcome?)
}
