use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// A target element - either by CSS selector or visible text.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Target {
    /// CSS selector.
    pub selector: Option<String>,
    /// Visible text to find.
    pub text: Option<String>,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.selector, &self.text) {
            (Some(s), _) => write!(f, "selector '{}'", s),
            (_, Some(t)) => write!(f, "text '{}'", t),
            _ => write!(f, "unknown"),
        }
    }
}

/// An action to execute in the browser.
#[derive(Debug, Clone)]
pub enum Action {
    // Navigation
    Goto(GotoAction),
    Reload,

    // Waiting
    Wait(WaitAction),
    WaitForNetworkIdle(WaitForNetworkIdleAction),
    WaitFor(WaitForAction),
    WaitForVisible(WaitForAction),
    WaitForHidden(WaitForAction),
    WaitForText(WaitForTextAction),
    WaitForUrl(WaitForUrlAction),

    // Input
    Click(ClickAction),
    Fill(FillAction),
    Clear(TargetAction),
    PressKey(PressKeyAction),

    // Assertions
    AssertVisible(AssertTargetAction),
    AssertHidden(AssertTargetAction),
    AssertEnabled(AssertTargetAction),
    AssertDisabled(AssertTargetAction),
    AssertAttribute(AssertAttributeAction),
    AssertClass(AssertClassAction),
    AssertText(AssertTextAction),
    AssertUrl(AssertUrlAction),

    // OTP
    RetrieveOtp(RetrieveOtpAction),
    WatchResponse(WatchResponseAction),
    CaptureResponse(CaptureResponseAction),

    // Debug
    Screenshot(ScreenshotAction),
    Log(LogAction),

    // Composition
    Include(IncludeAction),
}

impl Action {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Goto(_) => "goto",
            Self::Reload => "reload",
            Self::Wait(_) => "wait",
            Self::WaitForNetworkIdle(_) => "wait_for_network_idle",
            Self::WaitFor(_) => "wait_for",
            Self::WaitForVisible(_) => "wait_for_visible",
            Self::WaitForHidden(_) => "wait_for_hidden",
            Self::WaitForText(_) => "wait_for_text",
            Self::WaitForUrl(_) => "wait_for_url",
            Self::Click(_) => "click",
            Self::Fill(_) => "fill",
            Self::Clear(_) => "clear",
            Self::PressKey(_) => "press_key",
            Self::AssertVisible(_) => "assert_visible",
            Self::AssertHidden(_) => "assert_hidden",
            Self::AssertEnabled(_) => "assert_enabled",
            Self::AssertDisabled(_) => "assert_disabled",
            Self::AssertAttribute(_) => "assert_attribute",
            Self::AssertClass(_) => "assert_class",
            Self::AssertText(_) => "assert_text",
            Self::AssertUrl(_) => "assert_url",
            Self::RetrieveOtp(_) => "retrieve_otp",
            Self::WatchResponse(_) => "watch_response",
            Self::CaptureResponse(_) => "capture_response",
            Self::Screenshot(_) => "screenshot",
            Self::Log(_) => "log",
            Self::Include(_) => "include",
        }
    }
}

const ACTION_NAMES: &[&str] = &[
    "goto",
    "reload",
    "wait",
    "wait_for_network_idle",
    "wait_for",
    "wait_for_visible",
    "wait_for_hidden",
    "wait_for_text",
    "wait_for_url",
    "click",
    "fill",
    "clear",
    "press_key",
    "assert_visible",
    "assert_hidden",
    "assert_enabled",
    "assert_disabled",
    "assert_attribute",
    "assert_class",
    "assert_text",
    "assert_url",
    "retrieve_otp",
    "watch_response",
    "capture_response",
    "screenshot",
    "log",
    "include",
];

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ActionVisitor)
    }
}

struct ActionVisitor;

impl<'de> Visitor<'de> for ActionVisitor {
    type Value = Action;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an action (string for unit variants, or map with single key)")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match value {
            "reload" => Ok(Action::Reload),
            other => Err(de::Error::unknown_variant(other, &["reload"])),
        }
    }

    fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected action type key"))?;

        let action = match key.as_str() {
            "goto" => Action::Goto(map.next_value()?),
            "reload" => {
                let _: serde_yaml::Value = map.next_value()?;
                Action::Reload
            }
            "wait" => Action::Wait(map.next_value()?),
            "wait_for_network_idle" => Action::WaitForNetworkIdle(map.next_value()?),
            "wait_for" => Action::WaitFor(map.next_value()?),
            "wait_for_visible" => Action::WaitForVisible(map.next_value()?),
            "wait_for_hidden" => Action::WaitForHidden(map.next_value()?),
            "wait_for_text" => Action::WaitForText(map.next_value()?),
            "wait_for_url" => Action::WaitForUrl(map.next_value()?),
            "click" => Action::Click(map.next_value()?),
            "fill" => Action::Fill(map.next_value()?),
            "clear" => Action::Clear(map.next_value()?),
            "press_key" => Action::PressKey(map.next_value()?),
            "assert_visible" => Action::AssertVisible(map.next_value()?),
            "assert_hidden" => Action::AssertHidden(map.next_value()?),
            "assert_enabled" => Action::AssertEnabled(map.next_value()?),
            "assert_disabled" => Action::AssertDisabled(map.next_value()?),
            "assert_attribute" => Action::AssertAttribute(map.next_value()?),
            "assert_class" => Action::AssertClass(map.next_value()?),
            "assert_text" => Action::AssertText(map.next_value()?),
            "assert_url" => Action::AssertUrl(map.next_value()?),
            "retrieve_otp" => Action::RetrieveOtp(map.next_value()?),
            "watch_response" => Action::WatchResponse(map.next_value()?),
            "capture_response" => Action::CaptureResponse(map.next_value()?),
            "screenshot" => Action::Screenshot(map.next_value()?),
            "log" => Action::Log(map.next_value()?),
            "include" => Action::Include(map.next_value()?),
            other => return Err(de::Error::unknown_variant(other, ACTION_NAMES)),
        };

        Ok(action)
    }
}

// --- Action payloads ---

#[derive(Debug, Clone, Deserialize)]
pub struct GotoAction {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaitAction {
    pub ms: u64,
}

fn default_idle_ms() -> u64 {
    500
}
fn default_timeout_ms() -> u64 {
    10000
}
fn default_assert_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaitForNetworkIdleAction {
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaitForAction {
    pub selector: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaitForTextAction {
    pub text: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaitForUrlAction {
    pub contains: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickAction {
    #[serde(flatten)]
    pub target: Target,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FillAction {
    #[serde(flatten)]
    pub target: Target,
    /// Value to type; `${var}` expands runtime variables such as a captured OTP.
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PressKeyAction {
    pub key: String,
}

/// Generic action that just needs a target element.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetAction {
    #[serde(flatten)]
    pub target: Target,
}

/// Assertion on a single element, retried until `timeout_ms`.
#[derive(Debug, Clone, Deserialize)]
pub struct AssertTargetAction {
    #[serde(flatten)]
    pub target: Target,
    #[serde(default = "default_assert_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssertAttributeAction {
    #[serde(flatten)]
    pub target: Target,
    pub name: String,
    pub value: String,
    #[serde(default = "default_assert_timeout_ms")]
    pub timeout_ms: u64,
}

/// `pattern` is a regex matched against the element's class attribute.
#[derive(Debug, Clone, Deserialize)]
pub struct AssertClassAction {
    #[serde(flatten)]
    pub target: Target,
    pub pattern: String,
    #[serde(default = "default_assert_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssertTextAction {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssertUrlAction {
    pub contains: String,
}

fn default_store_as() -> String {
    "otp".into()
}

/// Fetch an OTP from a webmail inbox opened in a second tab.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrieveOtpAction {
    /// Mailbox address or bare mailbox name.
    pub address: String,
    /// Substring the sender must contain.
    pub sender: String,
    /// Exact subject.
    pub subject: String,
    #[serde(default = "RetrieveOtpAction::default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "RetrieveOtpAction::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Listing URL prefix (defaults to mailnesia).
    pub inbox_url: Option<String>,
    /// Runtime variable receiving the code.
    #[serde(default = "default_store_as")]
    pub store_as: String,
    #[serde(default)]
    pub fill: Option<OtpFillAction>,
}

impl RetrieveOtpAction {
    fn default_timeout_ms() -> u64 {
        60_000
    }

    fn default_poll_interval_ms() -> u64 {
        3_000
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpFillAction {
    pub selector: String,
}

fn default_method() -> String {
    "POST".into()
}

/// Start recording fetch/XHR responses; must precede the action that
/// triggers the request. Recording is lost on full page navigation.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchResponseAction {
    pub url_contains: String,
    #[serde(default = "default_method")]
    pub method: String,
}

/// Wait for a recorded response and store a JSON field from its body.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureResponseAction {
    pub url_contains: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Dotted path into the JSON body, e.g. `data.result.otp`.
    pub json_path: String,
    #[serde(default = "default_store_as")]
    pub store_as: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreenshotAction {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogAction {
    pub message: String,
}

/// Include another config's actions.
#[derive(Debug, Clone, Deserialize)]
pub struct IncludeAction {
    /// Path to the config file to include.
    pub path: String,

    /// Parameters to pass to the included config.
    #[serde(default)]
    pub params: std::collections::HashMap<String, String>,
}
