//! In-page recording of fetch/XHR responses, for codes the backend returns
//! directly (e.g. the OTP request endpoint on staging).

use crate::{Error, Result};
use eoka::Page;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// Wraps `fetch` and `XMLHttpRequest` once per document and records every
/// response whose URL and method match a registered watch.
const WATCH_JS: &str = r#"(() => {
    window.__flowWatches = window.__flowWatches || [];
    window.__flowCaptures = window.__flowCaptures || [];
    window.__flowWatches.push({ urlPart: __URL_PART__, method: __METHOD__ });
    if (window.__flowHooked) return;
    window.__flowHooked = true;

    const watched = (url, method) => window.__flowWatches.some(
        w => String(url).includes(w.urlPart) && String(method).toUpperCase() === w.method);
    const record = (url, method, status, body) => window.__flowCaptures.push(
        { url: String(url), method: String(method).toUpperCase(), status, body: String(body) });

    const origFetch = window.fetch;
    window.fetch = async function (input, init) {
        const res = await origFetch.apply(this, arguments);
        try {
            const url = typeof input === 'string' ? input : (input && input.url) || String(input);
            const method = (init && init.method) || (input && input.method) || 'GET';
            if (watched(url, method)) {
                res.clone().text().then(body => record(url, method, res.status, body)).catch(() => {});
            }
        } catch (e) {}
        return res;
    };

    const origOpen = XMLHttpRequest.prototype.open;
    XMLHttpRequest.prototype.open = function (method, url) {
        this.__flowMethod = method;
        this.__flowUrl = url;
        return origOpen.apply(this, arguments);
    };
    const origSend = XMLHttpRequest.prototype.send;
    XMLHttpRequest.prototype.send = function () {
        this.addEventListener('load', () => {
            if (watched(this.__flowUrl, this.__flowMethod)) {
                record(this.__flowUrl, this.__flowMethod, this.status, this.responseText);
            }
        });
        return origSend.apply(this, arguments);
    };
})()"#;

/// Removes and returns the oldest recorded response matching the filter.
const TAKE_JS: &str = r#"(() => {
    const caps = window.__flowCaptures || [];
    const i = caps.findIndex(c => c.url.includes(__URL_PART__) && c.method === __METHOD__);
    return i < 0 ? null : caps.splice(i, 1)[0];
})()"#;

const POLL_MS: u64 = 100;

/// A response recorded in the page.
#[derive(Debug, Clone, Deserialize)]
pub struct CapturedResponse {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub body: String,
}

fn scripts(template: &str, url_part: &str, method: &str) -> Result<String> {
    let url_part = serde_json::to_string(url_part)
        .map_err(|e| Error::ActionFailed(format!("encode js: {}", e)))?;
    let method = serde_json::to_string(&method.to_uppercase())
        .map_err(|e| Error::ActionFailed(format!("encode js: {}", e)))?;
    Ok(template
        .replace("__URL_PART__", &url_part)
        .replace("__METHOD__", &method))
}

/// Start recording responses for `url_part` + `method`.
pub async fn watch(page: &Page, url_part: &str, method: &str) -> Result<()> {
    page.execute(&scripts(WATCH_JS, url_part, method)?).await?;
    Ok(())
}

/// Wait for a recorded response.
pub async fn wait_for_response(
    page: &Page,
    url_part: &str,
    method: &str,
    timeout_ms: u64,
) -> Result<CapturedResponse> {
    let js = scripts(TAKE_JS, url_part, method)?;
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        let captured: Option<CapturedResponse> = page.evaluate(&js).await?;
        if let Some(response) = captured {
            debug!(
                "captured {} {} ({})",
                response.method, response.url, response.status
            );
            return Ok(response);
        }
        if Instant::now() >= deadline {
            return Err(Error::Timeout(format!(
                "no {} response for '{}' within {}ms (watch_response must run before the request)",
                method.to_uppercase(),
                url_part,
                timeout_ms
            )));
        }
        page.wait(POLL_MS).await;
    }
}

/// Look up a dotted path (`data.result.otp`, `items.0.id`) in a JSON value.
///
/// Strings come back as-is, numbers and booleans in their JSON form.
pub fn json_lookup(value: &Value, path: &str) -> Option<String> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse the response body as JSON and extract `path`.
pub fn extract_field(response: &CapturedResponse, path: &str) -> Result<String> {
    let json: Value = serde_json::from_str(&response.body).map_err(|e| {
        Error::ActionFailed(format!("response from {} is not JSON: {}", response.url, e))
    })?;
    json_lookup(&json, path).ok_or_else(|| {
        Error::ActionFailed(format!(
            "'{}' not found in response from {}",
            path, response.url
        ))
    })
}
