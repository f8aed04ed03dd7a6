use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Four ASCII digits with a non-digit (or the string edge) on both sides.
const OTP_PATTERN: &str = r"(?:^|[^0-9])([0-9]{4})(?:[^0-9]|$)";

fn otp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(OTP_PATTERN).expect("OTP pattern is valid"))
}

/// Free text of an opened message.
pub type MessageBody = String;

/// A 4-digit one-time passcode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Otp(String);

impl Otp {
    /// Number of digits in a passcode.
    pub const LEN: usize = 4;

    /// First run of exactly four digits in `body`.
    ///
    /// Longer digit runs (order numbers, dates) never yield a partial match.
    pub fn extract(body: &str) -> Option<Self> {
        extract_code(body, otp_regex()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Otp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Otp {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Otp> for String {
    fn from(otp: Otp) -> Self {
        otp.0
    }
}

/// Extract a code with a caller-supplied pattern.
///
/// Returns capture group 1 when the pattern has one, else the whole match.
pub fn extract_code(hay: &str, regex: &Regex) -> Option<String> {
    regex
        .captures(hay)
        .and_then(|c| c.get(1).or_else(|| c.get(0)))
        .map(|m| m.as_str().to_string())
}
