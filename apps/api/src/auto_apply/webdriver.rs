//! `BrowserDriver` backed by a WebDriver server (chromedriver).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thirtyfour::prelude::*;
use thirtyfour::ChromiumLikeCapabilities;
use tracing::debug;

use crate::auto_apply::session::{BrowserContext, BrowserDriver, BrowserError};

const CONFIRMATION_WAIT: Duration = Duration::from_secs(20);
const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct WebDriverBrowser {
    server_url: String,
    headless: bool,
}

impl WebDriverBrowser {
    pub fn new(server_url: String, headless: bool) -> Self {
        Self {
            server_url,
            headless,
        }
    }
}

#[async_trait]
impl BrowserDriver for WebDriverBrowser {
    async fn launch(&self, profile_dir: &Path) -> Result<Box<dyn BrowserContext>, BrowserError> {
        let mut caps = DesiredCapabilities::chrome();
        let mut args = vec![
            format!("--user-data-dir={}", profile_dir.display()),
            "--no-first-run".to_string(),
            "--window-size=1366,900".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        for arg in &args {
            caps.add_arg(arg)
                .map_err(|e| BrowserError::Launch(e.to_string()))?;
        }

        let driver = WebDriver::new(self.server_url.as_str(), caps)
            .await
            .map_err(|e| BrowserError::Launch(format!("{}: {e}", self.server_url)))?;
        debug!("Connected to WebDriver at {}", self.server_url);
        Ok(Box::new(WebDriverPage { driver }))
    }
}

struct WebDriverPage {
    driver: WebDriver,
}

impl WebDriverPage {
    async fn element(&self, selector: &str) -> Result<WebElement, BrowserError> {
        self.driver
            .find(By::Css(selector))
            .await
            .map_err(|_| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })
    }
}

#[async_trait]
impl BrowserContext for WebDriverPage {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        self.driver
            .goto(url)
            .await
            .map_err(|e| BrowserError::Navigation(format!("{url}: {e}")))
    }

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        let element = self.element(selector).await?;
        element
            .click()
            .await
            .map_err(|_| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let element = self.element(selector).await?;
        element
            .send_keys(value)
            .await
            .map_err(|_| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })
    }

    async fn upload(&mut self, selector: &str, file: &Path) -> Result<(), BrowserError> {
        let element = self.element(selector).await?;
        element
            .send_keys(file.display().to_string())
            .await
            .map_err(|_| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })
    }

    async fn wait_for(&mut self, selector: &str) -> Result<(), BrowserError> {
        self.driver
            .query(By::Css(selector))
            .wait(CONFIRMATION_WAIT, POLL_INTERVAL)
            .first()
            .await
            .map(|_| ())
            .map_err(|_| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        self.driver
            .screenshot_as_png()
            .await
            .map_err(|e| BrowserError::Navigation(format!("screenshot: {e}")))
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.driver
            .quit()
            .await
            .map_err(|e| BrowserError::Launch(format!("quit: {e}")))
    }
}
