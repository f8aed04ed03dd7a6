//! # inbox-otp
//!
//! Poll a webmail inbox listing until a fresh OTP email shows up, open it and
//! pull the passcode out of the body.
//!
//! The browser is abstracted behind [`InboxPage`], so the polling loop runs
//! unchanged against a real browser tab or a scripted fake.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use inbox_otp::{InboxPage, MessageFilter, OtpRetriever, RetrieverConfig};
//!
//! # async fn example(page: &impl InboxPage) -> inbox_otp::Result<()> {
//! let retriever = OtpRetriever::new(RetrieverConfig::default())?;
//! let filter = MessageFilter::new(
//!     "noreply-staging@wastenot-official.com",
//!     "[No-Reply]OTP Login Verification",
//! );
//! let otp = retriever.retrieve_otp(page, "wastenot-user-automation", &filter).await?;
//! println!("code: {}", otp);
//! # Ok(())
//! # }
//! ```

mod config;
mod filter;
mod otp;
mod page;
mod retriever;

pub use config::{mailbox_of, InboxSelectors, RetrieverConfig};
pub use filter::{InboxRow, MaxAge, MessageFilter, RecencyRule, RelativeLabel};
pub use otp::{extract_code, MessageBody, Otp};
pub use page::{InboxPage, PageError, PageResult};
pub use retriever::{retrieve_otp, OtpRetriever, Phase, PollState};

use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The deadline passed without a matching message.
    #[error(
        "timeout: {operation} received no OTP email within {}ms (elapsed {}ms){}",
        .bound.as_millis(),
        .elapsed.as_millis(),
        .last_error.as_ref().map(|e| format!("; last error: {e}")).unwrap_or_default()
    )]
    Timeout {
        operation: &'static str,
        bound: Duration,
        elapsed: Duration,
        last_error: Option<String>,
    },
    /// A matching message was opened but carried no passcode.
    #[error("malformed OTP email: OTP not found in message body")]
    NotFound,
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_operation_and_bound() {
        let err = Error::Timeout {
            operation: "retrieve_otp",
            bound: Duration::from_secs(10),
            elapsed: Duration::from_millis(10_250),
            last_error: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("retrieve_otp"), "{}", msg);
        assert!(msg.contains("10000ms"), "{}", msg);
        assert!(!msg.contains("last error"), "{}", msg);
    }

    #[test]
    fn timeout_message_carries_last_error() {
        let err = Error::Timeout {
            operation: "retrieve_otp",
            bound: Duration::from_secs(10),
            elapsed: Duration::from_secs(11),
            last_error: Some("net::ERR_CONNECTION_RESET".into()),
        };
        assert!(err
            .to_string()
            .ends_with("; last error: net::ERR_CONNECTION_RESET"));
    }
}
