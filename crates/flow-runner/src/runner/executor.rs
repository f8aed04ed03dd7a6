use super::assertions::{self, Expectation};
use super::{capture, inbox};
use crate::config::actions::Target;
use crate::config::params;
use crate::config::{Action, Config, Params};
use crate::{Error, Result};
use eoka::{Browser, Page};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Maximum include depth to prevent infinite loops.
const MAX_INCLUDE_DEPTH: usize = 10;

/// Context for action execution.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Base path for resolving relative includes.
    pub base_path: PathBuf,
    /// Current include depth.
    pub include_depth: usize,
    /// Values captured during the run (`${otp}` and friends).
    pub vars: Params,
}

impl ExecutionContext {
    /// Create a new context with a base path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            include_depth: 0,
            vars: Params::new(),
        }
    }

    /// Create a child context for an include. Variables are inherited.
    pub fn child(&self, new_base: impl Into<PathBuf>) -> Result<Self> {
        if self.include_depth >= MAX_INCLUDE_DEPTH {
            return Err(Error::Config(format!(
                "maximum include depth ({}) exceeded",
                MAX_INCLUDE_DEPTH
            )));
        }
        Ok(Self {
            base_path: new_base.into(),
            include_depth: self.include_depth + 1,
            vars: self.vars.clone(),
        })
    }

    /// Resolve a relative path against the base path.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    /// Replace `${var}` with runtime variables.
    pub fn expand(&self, template: &str) -> Result<String> {
        params::substitute_vars(template, &self.vars)
    }
}

/// Find element by text - returns CSS selector.
const FIND_BY_TEXT_JS: &str = r#"(() => {
    const text = arguments[0];
    const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_ELEMENT, null);
    while (walker.nextNode()) {
        const el = walker.currentNode;
        if (el.textContent?.trim().toLowerCase().includes(text.toLowerCase())) {
            if (el.matches('a, button, input, select, [role="button"], [onclick]')) {
                if (el.id) return '#' + el.id;
                const path = [];
                let node = el;
                while (node && node !== document.body) {
                    let selector = node.tagName.toLowerCase();
                    if (node.id) {
                        path.unshift('#' + node.id);
                        break;
                    }
                    const siblings = Array.from(node.parentNode?.children || []);
                    const index = siblings.indexOf(node) + 1;
                    if (siblings.length > 1) selector += ':nth-child(' + index + ')';
                    path.unshift(selector);
                    node = node.parentNode;
                }
                return path.join(' > ');
            }
        }
    }
    return null;
})()"#;

/// Execute a single action on the page with context.
///
/// `browser` is only needed by `retrieve_otp`, which opens a second tab.
pub async fn execute_with_context(
    browser: &Browser,
    page: &Page,
    action: &Action,
    ctx: &mut ExecutionContext,
) -> Result<()> {
    match action {
        Action::Goto(a) => {
            let url = ctx.expand(&a.url)?;
            info!("goto: {}", url);
            page.goto(&url).await?;
        }
        Action::Reload => {
            debug!("reload");
            page.reload().await?;
        }
        Action::Wait(a) => {
            debug!("wait: {}ms", a.ms);
            page.wait(a.ms).await;
        }
        Action::WaitForNetworkIdle(a) => {
            debug!(
                "wait_for_network_idle: idle={}ms, timeout={}ms",
                a.idle_ms, a.timeout_ms
            );
            page.wait_for_network_idle(a.idle_ms, a.timeout_ms).await?;
        }
        Action::WaitFor(a) => {
            debug!("wait_for: {}", a.selector);
            page.wait_for(&a.selector, a.timeout_ms).await?;
        }
        Action::WaitForVisible(a) => {
            debug!("wait_for_visible: {}", a.selector);
            page.wait_for_visible(&a.selector, a.timeout_ms).await?;
        }
        Action::WaitForHidden(a) => {
            debug!("wait_for_hidden: {}", a.selector);
            page.wait_for_hidden(&a.selector, a.timeout_ms).await?;
        }
        Action::WaitForText(a) => {
            let text = ctx.expand(&a.text)?;
            debug!("wait_for_text: '{}'", text);
            page.wait_for_text(&text, a.timeout_ms).await?;
        }
        Action::WaitForUrl(a) => {
            debug!("wait_for_url: contains '{}'", a.contains);
            page.wait_for_url_contains(&a.contains, a.timeout_ms)
                .await?;
        }
        Action::Click(a) => {
            let selector = resolve_target(page, &a.target).await?;
            info!("click: {}", a.target);
            page.click(&selector).await?;
        }
        Action::Fill(a) => {
            let value = ctx.expand(&a.value)?;
            // value may be a password
            info!("fill: {} ({} chars)", a.target, value.chars().count());
            let selector = resolve_target(page, &a.target).await?;
            page.fill(&selector, &value).await?;
        }
        Action::Clear(a) => {
            debug!("clear: {}", a.target);
            let selector = resolve_target(page, &a.target).await?;
            page.fill(&selector, "").await?;
        }
        Action::PressKey(a) => {
            debug!("press_key: {}", a.key);
            page.human().press_key(&a.key).await?;
        }
        Action::AssertVisible(a) => {
            debug!("assert_visible: {}", a.target);
            assertions::assert_element(page, &a.target, &Expectation::Visible, a.timeout_ms)
                .await?;
        }
        Action::AssertHidden(a) => {
            debug!("assert_hidden: {}", a.target);
            assertions::assert_element(page, &a.target, &Expectation::Hidden, a.timeout_ms)
                .await?;
        }
        Action::AssertEnabled(a) => {
            debug!("assert_enabled: {}", a.target);
            assertions::assert_element(page, &a.target, &Expectation::Enabled, a.timeout_ms)
                .await?;
        }
        Action::AssertDisabled(a) => {
            debug!("assert_disabled: {}", a.target);
            assertions::assert_element(page, &a.target, &Expectation::Disabled, a.timeout_ms)
                .await?;
        }
        Action::AssertAttribute(a) => {
            let expect = Expectation::Attribute {
                name: a.name.clone(),
                value: ctx.expand(&a.value)?,
            };
            debug!("assert_attribute: {} [{}]", a.target, a.name);
            assertions::assert_element(page, &a.target, &expect, a.timeout_ms).await?;
        }
        Action::AssertClass(a) => {
            let re = Regex::new(&a.pattern).map_err(|e| {
                Error::Config(format!("invalid class pattern '{}': {}", a.pattern, e))
            })?;
            debug!("assert_class: {} /{}/", a.target, a.pattern);
            assertions::assert_element(page, &a.target, &Expectation::Class(re), a.timeout_ms)
                .await?;
        }
        Action::AssertText(a) => {
            let expected = ctx.expand(&a.text)?;
            debug!("assert_text: '{}'", expected);
            let text = page.text().await?;
            if !text.contains(&expected) {
                return Err(Error::AssertionFailed(format!(
                    "text '{}' not found",
                    expected
                )));
            }
        }
        Action::AssertUrl(a) => {
            debug!("assert_url: contains '{}'", a.contains);
            let url = page.url().await?;
            if !url.contains(&a.contains) {
                return Err(Error::AssertionFailed(format!(
                    "url does not contain '{}'",
                    a.contains
                )));
            }
        }
        Action::RetrieveOtp(a) => {
            let address = ctx.expand(&a.address)?;
            let otp = inbox::retrieve_otp(browser, page, a, &address).await?;
            info!("retrieve_otp: stored as ${{{}}}", a.store_as);
            if let Some(ref fill) = a.fill {
                page.fill(&fill.selector, otp.as_str()).await?;
            }
            ctx.vars.insert(a.store_as.clone(), otp);
        }
        Action::WatchResponse(a) => {
            debug!("watch_response: {} {}", a.method, a.url_contains);
            capture::watch(page, &a.url_contains, &a.method).await?;
        }
        Action::CaptureResponse(a) => {
            debug!("capture_response: {} {}", a.method, a.url_contains);
            let response =
                capture::wait_for_response(page, &a.url_contains, &a.method, a.timeout_ms)
                    .await?;
            let value = capture::extract_field(&response, &a.json_path)?;
            info!(
                "capture_response: {} from {} stored as ${{{}}}",
                a.json_path, response.url, a.store_as
            );
            ctx.vars.insert(a.store_as.clone(), value);
        }
        Action::Screenshot(a) => {
            let path = ctx.expand(&a.path)?;
            info!("screenshot: {}", path);
            let data = page.screenshot().await?;
            write_file(Path::new(&path), &data)?;
        }
        Action::Log(a) => {
            info!("[log] {}", ctx.expand(&a.message)?);
        }
        Action::Include(a) => {
            let path = ctx.resolve_path(&a.path);
            info!("include: {}", path.display());

            // Build params from the include action
            let mut params = Params::new();
            for (k, v) in &a.params {
                params.insert(k.clone(), ctx.expand(v)?);
            }

            // Load the included config
            let included_config = Config::load_with_params(&path, &params).map_err(|e| {
                Error::Config(format!(
                    "failed to load include '{}': {}",
                    path.display(),
                    e
                ))
            })?;

            // Create child context with the included file's directory as base
            let child_base = path.parent().unwrap_or(Path::new("."));
            let mut child_ctx = ctx.child(child_base)?;

            // Execute included actions
            for action in &included_config.actions {
                Box::pin(execute_with_context(browser, page, action, &mut child_ctx)).await?;
            }

            // Captured values flow back to the including flow
            ctx.vars = child_ctx.vars;
        }
    }
    Ok(())
}

/// Resolve a Target to a CSS selector.
pub async fn resolve_target(page: &Page, target: &Target) -> Result<String> {
    if let Some(ref sel) = target.selector {
        return Ok(sel.clone());
    }
    if let Some(ref txt) = target.text {
        let literal = serde_json::to_string(txt)
            .map_err(|e| Error::ActionFailed(format!("encode js: {}", e)))?;
        let js = FIND_BY_TEXT_JS.replace("arguments[0]", &literal);
        let result: Option<String> = page.evaluate(&js).await?;
        if let Some(sel) = result {
            return Ok(sel);
        }
        return Err(Error::ActionFailed(format!(
            "element with text '{}' not found",
            txt
        )));
    }
    Err(Error::ActionFailed(
        "either selector or text must be provided".into(),
    ))
}

/// Write `data` to `path`, creating parent directories.
pub(crate) fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_runtime_vars() {
        let mut ctx = ExecutionContext::new(".");
        ctx.vars.insert("otp", "0427");
        assert_eq!(ctx.expand("code=${otp}").unwrap(), "code=0427");
        assert_eq!(ctx.expand("no vars").unwrap(), "no vars");
    }

    #[test]
    fn expand_rejects_unknown_vars() {
        let ctx = ExecutionContext::new(".");
        let err = ctx.expand("${otp}").unwrap_err();
        assert!(err.to_string().contains("unresolved variable: otp"));
    }

    #[test]
    fn child_inherits_vars_and_depth_is_bounded() {
        let mut ctx = ExecutionContext::new("/suites");
        ctx.vars.insert("otp", "1111");
        let child = ctx.child("/suites/flows").unwrap();
        assert_eq!(child.vars.get("otp"), Some("1111"));
        assert_eq!(child.include_depth, 1);
        assert_eq!(
            child.resolve_path("sign_in.yaml"),
            PathBuf::from("/suites/flows/sign_in.yaml")
        );

        let mut deep = ctx;
        for _ in 0..MAX_INCLUDE_DEPTH {
            deep = deep.child("/x").unwrap();
        }
        assert!(deep.child("/x").is_err());
    }

    #[test]
    fn write_file_creates_parent_dirs() {
        let dir = std::env::temp_dir().join(format!("flow-runner-{}", std::process::id()));
        let path = dir.join("shots/nested/fail.png");
        write_file(&path, b"png").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"png");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
