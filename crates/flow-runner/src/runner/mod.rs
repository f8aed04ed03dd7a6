mod assertions;
mod capture;
mod executor;
mod inbox;

use crate::config::schema::Condition;
use crate::config::{BrowserConfig, Config, Viewport};
use crate::Result;
use chrono::Utc;
use eoka::{Browser, Page};
use executor::ExecutionContext;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

pub use capture::json_lookup;
pub use inbox::BrowserInbox;

/// Result of running a config.
#[derive(Debug)]
pub struct RunResult {
    /// Whether the run succeeded.
    pub success: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Number of actions executed.
    pub actions_executed: usize,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
    /// Number of retry attempts made.
    pub retries: u32,
    /// Failure screenshot, if one was written.
    pub screenshot: Option<PathBuf>,
}

/// Executes login flows in one browser.
pub struct Runner {
    browser: Browser,
    page: Page,
    viewport: Viewport,
}

impl Runner {
    /// Launch a browser for `config`.
    pub async fn new(config: &BrowserConfig) -> Result<Self> {
        let viewport = config.effective_viewport();
        let stealth = eoka::StealthConfig {
            headless: config.headless,
            viewport_width: viewport.width,
            viewport_height: viewport.height,
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, viewport: {})",
            config.headless, viewport
        );
        let browser = Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            browser,
            page,
            viewport,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Run the config with retry support.
    pub async fn run(&mut self, config: &Config) -> Result<RunResult> {
        self.run_with_base_path(config, ".").await
    }

    /// Run the config with a base path for resolving includes.
    pub async fn run_with_base_path(
        &mut self,
        config: &Config,
        base_path: impl AsRef<Path>,
    ) -> Result<RunResult> {
        let start = Instant::now();
        let retry_config = config.on_failure.as_ref().and_then(|f| f.retry.as_ref());
        let max_attempts = retry_config.map(|r| r.attempts).unwrap_or(1);
        let retry_delay = retry_config.map(|r| r.delay_ms).unwrap_or(0);

        let mut last_error = None;
        let mut last_actions_executed = 0;
        let mut retries = 0;
        let mut screenshot = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                retries += 1;
                info!("Retry attempt {}/{}", attempt, max_attempts);
                if retry_delay > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(retry_delay)).await;
                }
            }

            // Captured values never leak between attempts
            let mut ctx = ExecutionContext::new(base_path.as_ref());
            let (actions_executed, outcome) = self.run_once(config, &mut ctx).await;
            last_actions_executed = actions_executed;
            match outcome {
                Ok(true) => {
                    return Ok(RunResult {
                        success: true,
                        error: None,
                        actions_executed,
                        duration_ms: start.elapsed().as_millis() as u64,
                        retries,
                        screenshot: None,
                    });
                }
                Ok(false) => {
                    warn!("Attempt {}: success conditions not met", attempt);
                    last_error = Some("success conditions not met".to_string());
                }
                Err(e) => {
                    warn!(
                        "Attempt {} failed after {} action(s): {}",
                        attempt, actions_executed, e
                    );
                    last_error = Some(e.to_string());
                }
            }
            if attempt == max_attempts {
                screenshot = self.handle_failure(config).await;
            }
        }

        Ok(RunResult {
            success: false,
            error: last_error,
            actions_executed: last_actions_executed,
            duration_ms: start.elapsed().as_millis() as u64,
            retries,
            screenshot,
        })
    }

    async fn handle_failure(&self, config: &Config) -> Option<PathBuf> {
        let path = config
            .on_failure
            .as_ref()?
            .screenshot_path(&config.name, self.viewport, Utc::now())?;
        info!("Saving failure screenshot to: {}", path);
        let data = match self.page.screenshot().await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to capture screenshot: {}", e);
                return None;
            }
        };
        let path = PathBuf::from(path);
        match executor::write_file(&path, &data) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Failed to save screenshot: {}", e);
                None
            }
        }
    }

    /// Returns how many actions completed, and whether the success
    /// conditions held.
    async fn run_once(
        &mut self,
        config: &Config,
        ctx: &mut ExecutionContext,
    ) -> (usize, Result<bool>) {
        info!("Navigating to: {}", config.target.url);
        if let Err(e) = self.page.goto(&config.target.url).await {
            return (0, Err(e.into()));
        }

        let mut actions_executed = 0;
        for (i, action) in config.actions.iter().enumerate() {
            debug!("Executing action {}: {}", i + 1, action.name());
            if let Err(e) =
                executor::execute_with_context(&self.browser, &self.page, action, ctx).await
            {
                return (actions_executed, Err(e));
            }
            actions_executed += 1;
        }

        let success = self.check_success(config).await;
        debug!("Success check: {:?}", success);
        (actions_executed, success)
    }

    async fn check_success(&self, config: &Config) -> Result<bool> {
        let Some(ref success) = config.success else {
            return Ok(true);
        };

        if let Some(ref any) = success.any {
            for cond in any {
                if self.check_condition(cond).await? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        if let Some(ref all) = success.all {
            for cond in all {
                if !self.check_condition(cond).await? {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    async fn check_condition(&self, condition: &Condition) -> Result<bool> {
        match condition {
            Condition::UrlContains(pattern) => {
                let url = self.page.url().await?;
                Ok(url.contains(pattern))
            }
            Condition::TextContains(pattern) => {
                let text = self.page.text().await?;
                Ok(text.contains(pattern))
            }
        }
    }

    /// Close the browser.
    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}
