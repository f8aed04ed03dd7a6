use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// Failure reported by an [`InboxPage`] implementation.
///
/// The retriever never inspects it beyond its message: any page failure
/// during a poll means "inbox not ready yet".
#[derive(Debug)]
pub struct PageError(Box<dyn StdError + Send + Sync>);

impl PageError {
    pub fn new(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl StdError for PageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

pub type PageResult<T> = std::result::Result<T, PageError>;

/// Browser tab showing the webmail inbox.
///
/// Calls are sequential; the retriever awaits each before issuing the next.
#[allow(async_fn_in_trait)]
pub trait InboxPage {
    /// Handle to one listed row, valid until the next reload.
    type Row;

    async fn goto(&self, url: &str) -> PageResult<()>;

    async fn reload(&self) -> PageResult<()>;

    /// Wait until `selector` matches at least one element.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> PageResult<()>;

    /// All elements matching `selector`, in document order.
    async fn query_all(&self, selector: &str) -> PageResult<Vec<Self::Row>>;

    /// Text of the first element matching `selector` inside `row`.
    async fn read_field(&self, row: &Self::Row, selector: &str) -> PageResult<String>;

    /// Open the message behind `row`.
    async fn click(&self, row: &Self::Row) -> PageResult<()>;

    /// Full text of the first element matching `selector`.
    async fn read_text(&self, selector: &str) -> PageResult<String>;

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_error_from_message() {
        let err = PageError::new("row 3 detached");
        assert_eq!(err.to_string(), "row 3 detached");
    }

    #[test]
    fn page_error_wraps_source_error() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "cdp timed out");
        let err = PageError::new(io);
        assert_eq!(err.to_string(), "cdp timed out");
    }
}
