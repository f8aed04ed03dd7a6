//! # flow-runner
//!
//! YAML-defined login flows for the admin panel. A flow navigates to the
//! sign-in page, drives the form, asserts on the DOM and picks up one-time
//! passcodes either from the backend response or from the webmail inbox.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flow_runner::{Config, Params, Runner};
//!
//! # #[tokio::main]
//! # async fn main() -> flow_runner::Result<()> {
//! let params = Params::new().set("password", "hunter2");
//! let config = Config::load_with_params("suites/login_email_otp.yaml", &params)?;
//! let mut runner = Runner::new(&config.browser).await?;
//! let result = runner.run_with_base_path(&config, "suites").await?;
//! println!("Success: {}", result.success);
//! runner.close().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod runner;

pub use config::{
    Action, BrowserConfig, Config, OnFailure, ParamDef, Params, SuccessCondition, Target,
    TargetUrl, Viewport,
};
pub use runner::{json_lookup, BrowserInbox, RunResult, Runner};

/// Result type for flow-runner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during config loading or execution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error(transparent)]
    Otp(#[from] inbox_otp::Error),

    #[error("action failed: {0}")]
    ActionFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
name: "Test"
target:
  url: "https://example.com"
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.name, "Test");
        assert_eq!(config.target.url, "https://example.com");
        assert!(config.actions.is_empty());
        assert!(!config.browser.headless);
        assert_eq!(config.browser.effective_viewport(), Viewport::default());
    }

    #[test]
    fn test_parse_browser_config() {
        let yaml = r#"
name: "Test"
browser:
  headless: true
  viewport:
    width: 1920
    height: 1080
target:
  url: "https://example.com"
"#;
        let config = Config::parse(yaml).unwrap();
        assert!(config.browser.headless);
        assert_eq!(
            config.browser.effective_viewport(),
            Viewport {
                width: 1920,
                height: 1080
            }
        );
    }

    #[test]
    fn test_expand_viewports() {
        let yaml = r#"
name: "Responsive"
browser:
  viewports:
    - { width: 375, height: 812 }
    - { width: 768, height: 1024 }
    - { width: 1440, height: 900 }
target:
  url: "https://example.com"
"#;
        let config = Config::parse(yaml).unwrap();
        let runs = config.expand_viewports();
        let sizes: Vec<String> = runs
            .iter()
            .map(|c| c.browser.effective_viewport().to_string())
            .collect();
        assert_eq!(sizes, ["375x812", "768x1024", "1440x900"]);
        assert!(runs.iter().all(|c| c.browser.viewports.is_empty()));

        let single = Config::parse("name: x\ntarget:\n  url: https://example.com\n").unwrap();
        assert_eq!(single.expand_viewports().len(), 1);
    }

    #[test]
    fn test_validation_zero_viewport() {
        let yaml = r#"
name: "Test"
browser:
  viewport: { width: 0, height: 812 }
target:
  url: "https://example.com"
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("non-zero"), "{}", err);
    }

    #[test]
    fn test_parse_navigation_and_wait_actions() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
actions:
  - goto:
      url: "https://other.com"
  - reload
  - wait:
      ms: 1000
  - wait_for_network_idle: {}
  - wait_for_visible:
      selector: "form"
  - wait_for_text:
      text: "認証コードのご入力"
      timeout_ms: 3000
  - wait_for_url:
      contains: "/dashboard"
"##;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.actions.len(), 7);
        assert!(matches!(config.actions[0], Action::Goto(_)));
        assert!(matches!(config.actions[1], Action::Reload));

        if let Action::WaitForNetworkIdle(a) = &config.actions[3] {
            assert_eq!(a.idle_ms, 500);
            assert_eq!(a.timeout_ms, 10000);
        } else {
            panic!("Expected WaitForNetworkIdle action");
        }

        if let Action::WaitForText(a) = &config.actions[5] {
            assert_eq!(a.text, "認証コードのご入力");
            assert_eq!(a.timeout_ms, 3000);
        } else {
            panic!("Expected WaitForText action");
        }
    }

    #[test]
    fn test_parse_input_actions() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
actions:
  - fill:
      selector: "input[type=\"email\"]"
      value: "qa@mailnesia.com"
  - click:
      text: "進む"
  - clear:
      selector: "#email"
  - press_key:
      key: "Enter"
"##;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.actions.len(), 4);

        if let Action::Fill(a) = &config.actions[0] {
            assert_eq!(a.target.selector.as_deref(), Some("input[type=\"email\"]"));
            assert_eq!(a.value, "qa@mailnesia.com");
        } else {
            panic!("Expected Fill action");
        }

        if let Action::Click(a) = &config.actions[1] {
            assert_eq!(a.target.text.as_deref(), Some("進む"));
        } else {
            panic!("Expected Click action");
        }

        if let Action::PressKey(a) = &config.actions[3] {
            assert_eq!(a.key, "Enter");
        } else {
            panic!("Expected PressKey action");
        }
    }

    #[test]
    fn test_parse_assertions() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
actions:
  - assert_visible:
      text: "メールアドレスを入力してください"
  - assert_hidden:
      selector: ".spinner"
      timeout_ms: 1000
  - assert_enabled:
      selector: "button[type=\"submit\"]"
  - assert_disabled:
      text: "進む"
  - assert_attribute:
      selector: "input[type=\"email\"]"
      name: "placeholder"
      value: "メールアドレスを入力"
  - assert_class:
      selector: "button[type=\"submit\"]"
      pattern: "bg-primary"
  - assert_text:
      text: "Success"
  - assert_url:
      contains: "/done"
"##;
        let config = Config::parse(yaml).unwrap();
        let names: Vec<&str> = config.actions.iter().map(|a| a.name()).collect();
        assert_eq!(
            names,
            [
                "assert_visible",
                "assert_hidden",
                "assert_enabled",
                "assert_disabled",
                "assert_attribute",
                "assert_class",
                "assert_text",
                "assert_url"
            ]
        );

        if let Action::AssertVisible(a) = &config.actions[0] {
            assert_eq!(a.timeout_ms, 5000);
        } else {
            panic!("Expected AssertVisible action");
        }
        if let Action::AssertHidden(a) = &config.actions[1] {
            assert_eq!(a.timeout_ms, 1000);
        } else {
            panic!("Expected AssertHidden action");
        }
        if let Action::AssertAttribute(a) = &config.actions[4] {
            assert_eq!(a.name, "placeholder");
            assert_eq!(a.value, "メールアドレスを入力");
        } else {
            panic!("Expected AssertAttribute action");
        }
    }

    #[test]
    fn test_parse_otp_actions() {
        let yaml = r##"
name: "Test"
params:
  email:
    default: "wastenot-user-automation@mailnesia.com"
target:
  url: "https://example.com"
actions:
  - watch_response:
      url_contains: "/member/auth/otp/request"
  - capture_response:
      url_contains: "/member/auth/otp/request"
      json_path: "data.result.otp"
  - retrieve_otp:
      address: "${email}"
      sender: "noreply-staging@wastenot-official.com"
      subject: "[No-Reply]OTP Login Verification"
      fill:
        selector: "input[name=\"otp\"]"
  - fill:
      selector: "input[name=\"otp\"]"
      value: "${otp}"
"##;
        let config = Config::parse(yaml).unwrap();

        if let Action::WatchResponse(a) = &config.actions[0] {
            assert_eq!(a.method, "POST");
        } else {
            panic!("Expected WatchResponse action");
        }
        if let Action::CaptureResponse(a) = &config.actions[1] {
            assert_eq!(a.json_path, "data.result.otp");
            assert_eq!(a.store_as, "otp");
            assert_eq!(a.timeout_ms, 10000);
        } else {
            panic!("Expected CaptureResponse action");
        }
        if let Action::RetrieveOtp(a) = &config.actions[2] {
            assert_eq!(a.address, "wastenot-user-automation@mailnesia.com");
            assert_eq!(a.timeout_ms, 60000);
            assert_eq!(a.poll_interval_ms, 3000);
            assert!(a.inbox_url.is_none());
            assert_eq!(a.store_as, "otp");
            assert_eq!(
                a.fill.as_ref().map(|f| f.selector.as_str()),
                Some("input[name=\"otp\"]")
            );
        } else {
            panic!("Expected RetrieveOtp action");
        }
        // Runtime variables survive load-time substitution
        if let Action::Fill(a) = &config.actions[3] {
            assert_eq!(a.value, "${otp}");
        } else {
            panic!("Expected Fill action");
        }
    }

    #[test]
    fn test_unknown_action_lists_names() {
        let yaml = r#"
name: "Test"
target:
  url: "https://example.com"
actions:
  - hover:
      text: "Menu"
"#;
        let err = Config::parse(yaml).unwrap_err().to_string();
        assert!(err.contains("hover"), "{}", err);
        assert!(err.contains("retrieve_otp"), "{}", err);
    }

    #[test]
    fn test_parse_debug_actions() {
        let yaml = r#"
name: "Test"
target:
  url: "https://example.com"
actions:
  - screenshot:
      path: "screenshots/step.png"
  - log:
      message: "Step completed"
"#;
        let config = Config::parse(yaml).unwrap();
        if let Action::Screenshot(a) = &config.actions[0] {
            assert_eq!(a.path, "screenshots/step.png");
        } else {
            panic!("Expected Screenshot action");
        }
        if let Action::Log(a) = &config.actions[1] {
            assert_eq!(a.message, "Step completed");
        } else {
            panic!("Expected Log action");
        }
    }

    #[test]
    fn test_parse_success_conditions() {
        let yaml = r#"
name: "Test"
target:
  url: "https://example.com"
success:
  any:
    - url_contains: "/dashboard"
    - text_contains: "ようこそ"
"#;
        let config = Config::parse(yaml).unwrap();
        let any = config.success.unwrap().any.unwrap();
        assert_eq!(any.len(), 2);
    }

    #[test]
    fn test_parse_on_failure() {
        let yaml = r#"
name: "Test"
target:
  url: "https://example.com"
on_failure:
  screenshot: "screenshots/{name}_{viewport}_{timestamp}.png"
  retry:
    attempts: 3
    delay_ms: 1000
"#;
        let config = Config::parse(yaml).unwrap();
        let on_failure = config.on_failure.unwrap();
        assert_eq!(
            on_failure.screenshot.as_deref(),
            Some("screenshots/{name}_{viewport}_{timestamp}.png")
        );
        let retry = on_failure.retry.unwrap();
        assert_eq!(retry.attempts, 3);
        assert_eq!(retry.delay_ms, 1000);
    }

    #[test]
    fn test_validation_errors() {
        assert!(Config::parse("target:\n  url: \"https://example.com\"\n").is_err());
        assert!(Config::parse("name: \"\"\ntarget:\n  url: \"https://example.com\"\n").is_err());
        assert!(Config::parse("name: \"Test\"\ntarget:\n  url: \"\"\n").is_err());
    }

    #[test]
    fn test_validation_both_any_and_all() {
        let yaml = r#"
name: "Test"
target:
  url: "https://example.com"
success:
  any:
    - url_contains: "/success"
  all:
    - text_contains: "Done"
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("either 'any' or 'all'"));
    }

    #[test]
    fn test_validation_zero_retry_attempts() {
        let yaml = r#"
name: "Test"
target:
  url: "https://example.com"
on_failure:
  retry:
    attempts: 0
    delay_ms: 1000
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_params_substitution() {
        let yaml = r##"
name: "Login"
params:
  email:
    required: true
  password:
    required: true
target:
  url: "https://example.com/login"
actions:
  - fill:
      selector: "#email"
      value: "${email}"
  - fill:
      selector: "#password"
      value: "${password}"
"##;
        let params = Params::new()
            .set("email", "test@example.com")
            .set("password", "secret123");
        let config = Config::parse_with_params(yaml, &params).unwrap();

        if let Action::Fill(a) = &config.actions[0] {
            assert_eq!(a.value, "test@example.com");
        } else {
            panic!("Expected Fill action");
        }
        if let Action::Fill(a) = &config.actions[1] {
            assert_eq!(a.value, "secret123");
        } else {
            panic!("Expected Fill action");
        }
    }

    #[test]
    fn test_params_missing_required() {
        let yaml = r##"
name: "Test"
params:
  password:
    required: true
target:
  url: "https://example.com"
actions:
  - fill:
      selector: "#password"
      value: "${password}"
"##;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_parse_include_action() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
actions:
  - include:
      path: "flows/sign_in.yaml"
      params:
        email: "test@example.com"
        password: "secret"
  - include:
      path: "common/setup.yaml"
"##;
        let config = Config::parse(yaml).unwrap();

        if let Action::Include(a) = &config.actions[0] {
            assert_eq!(a.path, "flows/sign_in.yaml");
            assert_eq!(a.params.get("email"), Some(&"test@example.com".to_string()));
            assert_eq!(a.params.get("password"), Some(&"secret".to_string()));
        } else {
            panic!("Expected Include action");
        }
        if let Action::Include(a) = &config.actions[1] {
            assert!(a.params.is_empty());
        } else {
            panic!("Expected Include action");
        }
    }

    #[test]
    fn test_load_suite_config() {
        let params = Params::new().set("password", "secret");
        let config = Config::load_with_params("../../suites/login_ui.yaml", &params).unwrap();
        assert!(config
            .target
            .url
            .starts_with("https://admin-staging.wastenot-official.com/sign-in"));
        assert!(!config.actions.is_empty());
    }

    #[test]
    fn test_otp_error_passes_through() {
        let err: Error = inbox_otp::Error::NotFound.into();
        assert_eq!(
            err.to_string(),
            "malformed OTP email: OTP not found in message body"
        );
    }
}
