//! Auto-retrying DOM assertions.

use crate::config::Target;
use crate::{Error, Result};
use eoka::Page;
use regex::Regex;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_MS: u64 = 100;

/// Elements a text target resolves up to.
const CONTROLS: &str = r#"a, button, input, select, [role="button"]"#;

/// Locate an element by selector, or by the deepest element whose text
/// contains the given string, and report its state. A text match inside a
/// control (`<button><span>進む</span></button>`) reports the control.
const ELEMENT_STATE_JS: &str = r#"(() => {
    const selector = __SELECTOR__;
    const text = __TEXT__;
    const attr = __ATTR__;
    let el = null;
    if (selector) {
        el = document.querySelector(selector);
    } else if (text) {
        const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_ELEMENT, null);
        while (walker.nextNode()) {
            const node = walker.currentNode;
            if ((node.textContent || '').includes(text)
                && !Array.from(node.children).some(c => (c.textContent || '').includes(text))) {
                el = node.closest(__CONTROLS__) || node;
                break;
            }
        }
    }
    if (!el) return null;
    const style = getComputedStyle(el);
    const rect = el.getBoundingClientRect();
    return {
        visible: style.display !== 'none' && style.visibility !== 'hidden'
            && rect.width > 0 && rect.height > 0,
        enabled: !el.disabled && el.getAttribute('aria-disabled') !== 'true',
        class_name: el.getAttribute('class') || '',
        attribute: attr ? el.getAttribute(attr) : null,
    };
})()"#;

/// Snapshot of an element as seen by the page.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ElementState {
    pub visible: bool,
    pub enabled: bool,
    pub class_name: String,
    pub attribute: Option<String>,
}

/// What an assertion expects of its target.
#[derive(Debug, Clone)]
pub enum Expectation {
    Visible,
    Hidden,
    Enabled,
    Disabled,
    Attribute { name: String, value: String },
    Class(Regex),
}

impl Expectation {
    fn attribute_name(&self) -> Option<&str> {
        match self {
            Self::Attribute { name, .. } => Some(name),
            _ => None,
        }
    }

    /// `Err` carries the reason the state does not satisfy the expectation.
    pub fn check(&self, state: Option<&ElementState>) -> std::result::Result<(), String> {
        let Some(state) = state else {
            return match self {
                Self::Hidden => Ok(()),
                _ => Err("element not found".into()),
            };
        };
        match self {
            Self::Visible if !state.visible => Err("element is not visible".into()),
            Self::Hidden if state.visible => Err("element is visible".into()),
            Self::Enabled if !state.enabled => Err("element is disabled".into()),
            Self::Disabled if state.enabled => Err("element is enabled".into()),
            Self::Attribute { name, value } if state.attribute.as_deref() != Some(value.as_str()) => {
                Err(format!(
                    "attribute '{}' is {:?}, expected '{}'",
                    name, state.attribute, value
                ))
            }
            Self::Class(re) if !re.is_match(&state.class_name) => Err(format!(
                "class '{}' does not match /{}/",
                state.class_name,
                re.as_str()
            )),
            _ => Ok(()),
        }
    }
}

async fn element_state(
    page: &Page,
    target: &Target,
    attribute: Option<&str>,
) -> Result<Option<ElementState>> {
    if target.selector.is_none() && target.text.is_none() {
        return Err(Error::ActionFailed(
            "either selector or text must be provided".into(),
        ));
    }
    let js = ELEMENT_STATE_JS
        .replace("__SELECTOR__", &js_literal(&target.selector)?)
        .replace("__TEXT__", &js_literal(&target.text)?)
        .replace("__ATTR__", &js_literal(&attribute)?)
        .replace("__CONTROLS__", &js_literal(&CONTROLS)?);
    Ok(page.evaluate(&js).await?)
}

/// Poll the target until `expect` holds or `timeout_ms` passes.
pub async fn assert_element(
    page: &Page,
    target: &Target,
    expect: &Expectation,
    timeout_ms: u64,
) -> Result<()> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        let state = element_state(page, target, expect.attribute_name()).await?;
        match expect.check(state.as_ref()) {
            Ok(()) => return Ok(()),
            Err(reason) if Instant::now() >= deadline => {
                return Err(Error::AssertionFailed(format!("{}: {}", target, reason)));
            }
            Err(reason) => debug!("{}: {}, retrying", target, reason),
        }
        page.wait(POLL_MS).await;
    }
}

fn js_literal<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::ActionFailed(format!("encode js: {}", e)))
}
