//! Browser automation contract consumed by the search form and the engine
//!
//! The engine never talks to a browser library directly. Anything that can
//! navigate, locate, click, type and hand back HTML can drive a search.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by a page driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error("Click intercepted: {0}")]
    ClickIntercepted(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Browser backend error: {0}")]
    Backend(String),
}

/// How to find a single element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// ARIA role plus accessible name, e.g. `combobox` / `Where from?`
    Role { role: String, name: String },
    /// Clickable element whose visible text equals the given text
    Text(String),
    Css(String),
}

impl Locator {
    pub fn role(role: &str, name: &str) -> Self {
        Locator::Role {
            role: role.to_string(),
            name: name.to_string(),
        }
    }

    pub fn text(text: &str) -> Self {
        Locator::Text(text.to_string())
    }

    pub fn css(selector: &str) -> Self {
        Locator::Css(selector.to_string())
    }
}

/// Click strategies, from least to most aggressive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickStrategy {
    Plain,
    ScrollIntoView,
    /// Element's own `click()` in the page, bypassing hit testing
    Dom,
}

impl ClickStrategy {
    pub const ESCALATION: [ClickStrategy; 3] =
        [ClickStrategy::Plain, ClickStrategy::ScrollIntoView, ClickStrategy::Dom];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    Tab,
}

impl Key {
    pub fn name(&self) -> &'static str {
        match self {
            Key::Enter => "Enter",
            Key::Escape => "Escape",
            Key::Tab => "Tab",
        }
    }
}

/// Completion signal for a bounded wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    Selector(String),
    /// Satisfied by whichever selector shows up first
    AnySelector(Vec<String>),
    NetworkIdle,
}

impl WaitCondition {
    pub fn any_of(selectors: &[&str]) -> Self {
        WaitCondition::AnySelector(selectors.iter().map(|s| s.to_string()).collect())
    }

    pub fn describe(&self) -> String {
        match self {
            WaitCondition::Selector(selector) => format!("selector '{}'", selector),
            WaitCondition::AnySelector(selectors) => format!("any of [{}]", selectors.join(", ")),
            WaitCondition::NetworkIdle => "network idle".to_string(),
        }
    }
}

/// One browser page, exclusively owned by the caller for the duration of a run
#[async_trait]
pub trait PageDriver: Send {
    type Handle: Send + Sync;

    async fn goto(&mut self, url: &str) -> Result<(), DriverError>;

    /// First element matching the locator, `None` when nothing matches
    async fn locate(&mut self, locator: &Locator) -> Result<Option<Self::Handle>, DriverError>;

    /// Every element matching a CSS selector, in document order
    async fn locate_all(&mut self, selector: &str) -> Result<Vec<Self::Handle>, DriverError>;

    async fn click(
        &mut self,
        handle: &Self::Handle,
        strategy: ClickStrategy,
    ) -> Result<(), DriverError>;

    /// Clear the field and type the text into it
    async fn fill(&mut self, handle: &Self::Handle, text: &str) -> Result<(), DriverError>;

    async fn press_key(&mut self, key: Key) -> Result<(), DriverError>;

    async fn wait_for(
        &mut self,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    async fn content(&mut self) -> Result<String, DriverError>;

    async fn current_url(&mut self) -> Result<String, DriverError>;

    async fn go_back(&mut self) -> Result<(), DriverError>;

    /// Fixed settle delay, for transitions with no observable completion signal
    async fn pause(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Click through the strategy escalation until one succeeds.
///
/// Only reports `ClickIntercepted` after every strategy failed.
pub async fn click_with_fallback<D: PageDriver + ?Sized>(
    driver: &mut D,
    handle: &D::Handle,
    what: &str,
) -> Result<ClickStrategy, DriverError> {
    let mut last_error = None;

    for strategy in ClickStrategy::ESCALATION {
        match driver.click(handle, strategy).await {
            Ok(()) => {
                debug!(target_element = what, ?strategy, "Click succeeded");
                return Ok(strategy);
            }
            Err(e) => {
                warn!(
                    target_element = what,
                    ?strategy,
                    error = %e,
                    "Click strategy failed, escalating"
                );
                last_error = Some(e);
            }
        }
    }

    Err(DriverError::ClickIntercepted(format!(
        "{}: all click strategies failed (last error: {})",
        what,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Driver whose clicks fail until a given strategy is reached
    struct StubbornDriver {
        works_from: Option<ClickStrategy>,
        attempts: Vec<ClickStrategy>,
    }

    #[async_trait]
    impl PageDriver for StubbornDriver {
        type Handle = ();

        async fn goto(&mut self, _url: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn locate(&mut self, _locator: &Locator) -> Result<Option<()>, DriverError> {
            Ok(Some(()))
        }
        async fn locate_all(&mut self, _selector: &str) -> Result<Vec<()>, DriverError> {
            Ok(vec![()])
        }
        async fn click(
            &mut self,
            _handle: &(),
            strategy: ClickStrategy,
        ) -> Result<(), DriverError> {
            self.attempts.push(strategy);
            match self.works_from {
                Some(works) if strategy == works => Ok(()),
                _ => Err(DriverError::ClickIntercepted("overlay".to_string())),
            }
        }
        async fn fill(&mut self, _handle: &(), _text: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn press_key(&mut self, _key: Key) -> Result<(), DriverError> {
            Ok(())
        }
        async fn wait_for(
            &mut self,
            _condition: &WaitCondition,
            _timeout: Duration,
        ) -> Result<(), DriverError> {
            Ok(())
        }
        async fn content(&mut self) -> Result<String, DriverError> {
            Ok(String::new())
        }
        async fn current_url(&mut self) -> Result<String, DriverError> {
            Ok("about:blank".to_string())
        }
        async fn go_back(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_click_escalates_to_dom_click() {
        let mut driver = StubbornDriver {
            works_from: Some(ClickStrategy::Dom),
            attempts: Vec::new(),
        };
        let used = click_with_fallback(&mut driver, &(), "card").await.unwrap();
        assert_eq!(used, ClickStrategy::Dom);
        assert_eq!(driver.attempts, ClickStrategy::ESCALATION.to_vec());
    }

    #[tokio::test]
    async fn test_click_stops_at_first_success() {
        let mut driver = StubbornDriver {
            works_from: Some(ClickStrategy::Plain),
            attempts: Vec::new(),
        };
        click_with_fallback(&mut driver, &(), "card").await.unwrap();
        assert_eq!(driver.attempts, vec![ClickStrategy::Plain]);
    }

    #[tokio::test]
    async fn test_click_reports_interception_after_all_strategies() {
        let mut driver = StubbornDriver {
            works_from: None,
            attempts: Vec::new(),
        };
        let err = click_with_fallback(&mut driver, &(), "card").await.unwrap_err();
        assert!(matches!(err, DriverError::ClickIntercepted(_)));
        assert_eq!(driver.attempts.len(), 3);
    }

    #[test]
    fn test_wait_condition_description() {
        let condition = WaitCondition::any_of(&["li.a", "div.b"]);
        assert_eq!(condition.describe(), "any of [li.a, div.b]");
        assert_eq!(Key::Enter.name(), "Enter");
    }
}
