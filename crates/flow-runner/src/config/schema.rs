use super::params::{self, ParamDef, Params};
use super::Action;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A login flow: where to start, what to do, how to judge the outcome.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Name of this flow.
    pub name: String,

    /// Parameter definitions (optional).
    #[serde(default)]
    pub params: HashMap<String, ParamDef>,

    /// Browser configuration.
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Target URL to navigate to.
    pub target: TargetUrl,

    /// List of actions to execute.
    #[serde(default)]
    pub actions: Vec<Action>,

    /// Success conditions (optional).
    pub success: Option<SuccessCondition>,

    /// Failure handling (optional).
    pub on_failure: Option<OnFailure>,
}

impl Config {
    /// Load config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_params(path, &Params::new())
    }

    /// Load config from a YAML file with parameters.
    pub fn load_with_params<P: AsRef<Path>>(path: P, params: &Params) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse_with_params(&content, params)
    }

    /// Parse config from YAML string (no params).
    pub fn parse(yaml: &str) -> Result<Self> {
        Self::parse_with_params(yaml, &Params::new())
    }

    /// Parse config from YAML string with parameter substitution.
    pub fn parse_with_params(yaml: &str, params: &Params) -> Result<Self> {
        let mut value: serde_yaml::Value = serde_yaml::from_str(yaml)?;

        let defs: HashMap<String, ParamDef> = value
            .get("params")
            .and_then(|v| serde_yaml::from_value(v.clone()).ok())
            .unwrap_or_default();

        params::substitute_value(&mut value, params, &defs)?;

        let config: Config = serde_yaml::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// One config per viewport in `browser.viewports`, or just this one.
    pub fn expand_viewports(&self) -> Vec<Config> {
        if self.browser.viewports.is_empty() {
            return vec![self.clone()];
        }
        self.browser
            .viewports
            .iter()
            .map(|v| {
                let mut config = self.clone();
                config.browser.viewport = Some(*v);
                config.browser.viewports.clear();
                config
            })
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("name is required".into()));
        }
        if self.target.url.is_empty() {
            return Err(Error::Config("target.url is required".into()));
        }
        for v in self.browser.viewport.iter().chain(&self.browser.viewports) {
            if v.width == 0 || v.height == 0 {
                return Err(Error::Config(format!("viewport {} must be non-zero", v)));
            }
        }
        if let Some(ref success) = self.success {
            if success.any.is_some() && success.all.is_some() {
                return Err(Error::Config(
                    "success: specify either 'any' or 'all', not both".into(),
                ));
            }
        }
        if let Some(ref on_failure) = self.on_failure {
            if let Some(ref retry) = on_failure.retry {
                if retry.attempts == 0 {
                    return Err(Error::Config(
                        "on_failure.retry.attempts must be at least 1".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Browser launch configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BrowserConfig {
    /// Run in headless mode.
    #[serde(default)]
    pub headless: bool,

    /// Viewport size.
    pub viewport: Option<Viewport>,

    /// Run the flow once per viewport (responsive checks).
    #[serde(default)]
    pub viewports: Vec<Viewport>,
}

impl BrowserConfig {
    pub fn effective_viewport(&self) -> Viewport {
        self.viewport.unwrap_or_default()
    }
}

/// Viewport dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Viewport {
    type Err = Error;

    /// Parse `WIDTHxHEIGHT`, e.g. `375x812`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Config(format!("invalid viewport '{}', expected WIDTHxHEIGHT", s));
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = w.parse().map_err(|_| invalid())?;
        let height: u32 = h.parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

/// Target URL configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetUrl {
    /// URL to navigate to.
    pub url: String,
}

/// Success condition checking.
#[derive(Debug, Clone, Deserialize)]
pub struct SuccessCondition {
    /// Any of these conditions must be true.
    pub any: Option<Vec<Condition>>,

    /// All of these conditions must be true.
    pub all: Option<Vec<Condition>>,
}

/// Individual condition.
#[derive(Debug, Clone)]
pub enum Condition {
    UrlContains(String),
    TextContains(String),
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(ConditionVisitor)
    }
}

struct ConditionVisitor;

impl<'de> Visitor<'de> for ConditionVisitor {
    type Value = Condition;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a condition map with single key (url_contains or text_contains)")
    }

    fn visit_map<M>(self, mut map: M) -> std::result::Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected condition type key"))?;

        match key.as_str() {
            "url_contains" => Ok(Condition::UrlContains(map.next_value()?)),
            "text_contains" => Ok(Condition::TextContains(map.next_value()?)),
            other => Err(de::Error::unknown_variant(
                other,
                &["url_contains", "text_contains"],
            )),
        }
    }
}

/// Failure handling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OnFailure {
    /// Screenshot path on failure; see [`OnFailure::screenshot_path`].
    pub screenshot: Option<String>,

    /// Retry configuration.
    pub retry: Option<RetryConfig>,
}

impl OnFailure {
    /// Expand `{name}`, `{viewport}` and `{timestamp}` in the screenshot path.
    pub fn screenshot_path(
        &self,
        name: &str,
        viewport: Viewport,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let template = self.screenshot.as_ref()?;
        // Filesystem-safe ISO 8601, e.g. 2024-05-01T12-00-00-123Z
        let timestamp = now.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string();
        Some(
            template
                .replace("{name}", &slug(name))
                .replace("{viewport}", &viewport.to_string())
                .replace("{timestamp}", &timestamp),
        )
    }
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Number of retry attempts.
    pub attempts: u32,

    /// Delay between retries in milliseconds.
    pub delay_ms: u64,
}
