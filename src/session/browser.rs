//! The Chromium-backed forum session.
//!
//! `ForumSession` owns one browser and one page and walks the forum through
//! them. Every wait is bounded and implemented by polling for a DOM-readiness
//! condition; a miss becomes a typed `SessionError`, never a panic. The two
//! deliberate exceptions to "no blind sleeps" are the short settle after
//! unpinning (the page reloads underneath the menu) and the caller-supplied
//! settle after closing a thread.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use super::selectors;
use super::sequence::{AutomationSteps, Credentials};
use super::{RawMediaRefs, ReplySnapshot, ThreadSummary, TopicDetails, trailing_fragment};
use crate::config::GavelConfig;
use crate::errors::SessionError;

/// How long each DOM-readiness wait may take.
const LOGIN_WAIT: Duration = Duration::from_secs(10);
const LOGOUT_WAIT: Duration = Duration::from_secs(10);
const REPLY_WAIT: Duration = Duration::from_secs(20);
const MENU_WAIT: Duration = Duration::from_secs(10);
const LISTING_WAIT: Duration = Duration::from_secs(20);
const TOPIC_WAIT: Duration = Duration::from_secs(15);

/// Pause after unpinning, while the page reloads underneath the tools menu.
const UNPIN_SETTLE: Duration = Duration::from_secs(1);

/// Polling step for all bounded waits.
const POLL_STEP: Duration = Duration::from_millis(250);

/// How many characters of a posted reply are matched against the page to
/// confirm the post rendered.
const CONFIRMATION_CHARS: usize = 100;

/// Everything the session needs to know about the target forum and the
/// browser it drives.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub user_agent: String,
    pub intake_url: String,
    pub login_url: String,
}

impl BrowserSettings {
    pub fn from_config(config: &GavelConfig) -> Self {
        Self {
            headless: config.session.headless,
            user_agent: config.session.user_agent.clone(),
            intake_url: config.forum.intake_url.clone(),
            login_url: config.forum.login_url.clone(),
        }
    }
}

pub struct ForumSession {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    page: Page,
    settings: BrowserSettings,
}

impl ForumSession {
    /// Launch the browser and open the intake listing.
    pub async fn launch(settings: BrowserSettings) -> Result<Self, SessionError> {
        info!(headless = settings.headless, "launching browser session");

        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--user-agent={}", settings.user_agent));
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(SessionError::Driver)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(SessionError::driver)?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page(settings.intake_url.as_str())
            .await
            .map_err(SessionError::driver)?;

        info!(url = %settings.intake_url, "browser session ready");
        Ok(Self {
            browser,
            handler_task,
            page,
            settings,
        })
    }

    /// Close the browser and reap its process. Errors here are logged and
    /// dropped; there is nothing useful a caller can do with them.
    pub async fn shutdown(mut self) {
        info!("shutting down browser session");
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "browser close failed");
        }
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "browser process wait failed");
        }
        self.handler_task.abort();
    }

    // ── Low-level waits ───────────────────────────────────────────────

    async fn goto_url(&self, url: &str) -> Result<(), SessionError> {
        self.page.goto(url).await.map_err(SessionError::driver)?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(SessionError::driver)?;
        Ok(())
    }

    async fn try_find(&self, css: &str) -> Option<Element> {
        self.page.find_element(css).await.ok()
    }

    /// Poll for a selector until it appears or the bounded wait elapses.
    async fn wait_for_selector(
        &self,
        css: &str,
        what: &str,
        timeout: Duration,
    ) -> Result<Element, SessionError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.try_find(css).await {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(SessionError::Timeout {
                    what: format!("{} ({})", what, css),
                    waited_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(POLL_STEP).await;
        }
    }

    async fn eval<T: DeserializeOwned>(&self, expression: &str) -> Result<T, SessionError> {
        self.page
            .evaluate(expression)
            .await
            .map_err(SessionError::driver)?
            .into_value::<T>()
            .map_err(SessionError::driver)
    }

    /// Poll a boolean JS condition until it holds or the wait elapses.
    async fn wait_for_condition(
        &self,
        expression: &str,
        what: &str,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.eval::<bool>(expression).await.unwrap_or(false) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SessionError::Timeout {
                    what: what.to_string(),
                    waited_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(POLL_STEP).await;
        }
    }

    /// Click the first anchor whose normalized text equals `text`. Menu
    /// entries on this forum are plain links with no stable classes, so they
    /// can only be addressed by their visible label.
    async fn click_link_by_text(&self, text: &str) -> Result<bool, SessionError> {
        let expression = format!(
            r#"(() => {{
                const wanted = {text};
                const result = document.evaluate(
                    "//a[normalize-space()=" + JSON.stringify(wanted) + "]",
                    document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null);
                const node = result.singleNodeValue;
                if (!node) return false;
                node.click();
                return true;
            }})()"#,
            text = js_quote(text),
        );
        self.eval::<bool>(&expression).await
    }

    async fn wait_click_link_by_text(
        &self,
        text: &str,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.click_link_by_text(text).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SessionError::Timeout {
                    what: format!("'{}' menu link", text),
                    waited_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(POLL_STEP).await;
        }
    }

    // ── Detector-facing scraping ──────────────────────────────────────

    /// Reload the intake listing and enumerate its visible thread rows.
    pub async fn scan_intake(&self) -> Result<Vec<ThreadSummary>, SessionError> {
        let current = self.page.url().await.map_err(SessionError::driver)?;
        let on_listing = current
            .as_deref()
            .is_some_and(|u| u.starts_with(self.settings.intake_url.as_str()));
        if on_listing {
            self.page.reload().await.map_err(SessionError::driver)?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(SessionError::driver)?;
        } else {
            debug!(current = ?current, "navigating back to the intake listing");
            self.goto_url(&self.settings.intake_url).await?;
        }

        self.wait_for_selector(selectors::THREAD_LIST_CONTAINER, "thread list", LISTING_WAIT)
            .await?;

        #[derive(serde::Deserialize)]
        struct RawRow {
            title: String,
            href: Option<String>,
            locked: bool,
        }

        let expression = format!(
            r#"(() => Array.from(document.querySelectorAll({item})).map(item => {{
                const link = item.querySelector({title_link});
                return {{
                    title: link ? link.textContent.trim() : '',
                    href: link ? link.getAttribute('href') : null,
                    locked: item.classList.contains({locked}),
                }};
            }}))()"#,
            item = js_quote(selectors::THREAD_ITEM),
            title_link = js_quote(selectors::THREAD_TITLE_LINK),
            locked = js_quote(selectors::LOCKED_CLASS),
        );
        let rows: Vec<RawRow> = self.eval(&expression).await?;

        let base = Url::parse(&self.settings.intake_url).map_err(SessionError::driver)?;
        let mut threads = Vec::new();
        for row in rows {
            let Some(href) = row.href else { continue };
            match base.join(&href) {
                Ok(absolute) => threads.push(ThreadSummary {
                    title: row.title,
                    url: absolute.to_string(),
                    locked: row.locked,
                }),
                Err(e) => warn!(href = %href, error = %e, "skipping thread with unresolvable link"),
            }
        }
        Ok(threads)
    }

    /// Visit a topic and harvest its first post: screenshot, publication
    /// timestamp, plain-text body, raw media references.
    pub async fn scrape_topic(&self, url: &str) -> Result<TopicDetails, SessionError> {
        self.goto_url(url).await?;
        let article = self
            .wait_for_selector(selectors::FIRST_POST_ARTICLE, "first post", TOPIC_WAIT)
            .await?;

        // A missed screenshot degrades the judge's view but never blocks
        // ingestion.
        let screenshot_png = match article.screenshot(CaptureScreenshotFormat::Png).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(url = %url, error = %e, "first-post screenshot failed");
                None
            }
        };

        let published_at: Option<String> = self
            .eval(&format!(
                r#"(() => {{
                    const article = document.querySelector({article});
                    if (!article) return null;
                    const time = article.querySelector({date});
                    return time ? time.getAttribute('datetime') : null;
                }})()"#,
                article = js_quote(selectors::FIRST_POST_ARTICLE),
                date = js_quote(selectors::POST_DATE),
            ))
            .await?;

        let body_text: Option<String> = self
            .eval(&format!(
                r#"(() => {{
                    const article = document.querySelector({article});
                    if (!article) return null;
                    const body = article.querySelector({text});
                    return body ? body.innerText.trim() : null;
                }})()"#,
                article = js_quote(selectors::FIRST_POST_ARTICLE),
                text = js_quote(selectors::POST_TEXT),
            ))
            .await?;

        let media: RawMediaRefs = self
            .eval(&format!(
                r#"(() => {{
                    const out = {{anchors: [], images: [], widgets: [], wrappers: []}};
                    const article = document.querySelector({article});
                    if (!article) return out;
                    for (const a of article.querySelectorAll('a[href]')) {{
                        out.anchors.push(a.getAttribute('href'));
                    }}
                    for (const img of article.querySelectorAll('img')) {{
                        const src = img.getAttribute('src');
                        if (src) out.images.push(src);
                        const dataUrl = img.getAttribute('data-url');
                        if (dataUrl) out.images.push(dataUrl);
                    }}
                    for (const widget of article.querySelectorAll('div.bbMediaWrapper')) {{
                        out.widgets.push({{
                            site: (widget.getAttribute('data-media-site-id') || '').toLowerCase(),
                            key: widget.getAttribute('data-media-key') || '',
                        }});
                    }}
                    for (const wrapper of article.querySelectorAll('div.bbImageWrapper')) {{
                        const dataSrc = wrapper.getAttribute('data-src');
                        if (dataSrc) out.wrappers.push(dataSrc);
                    }}
                    return out;
                }})()"#,
                article = js_quote(selectors::FIRST_POST_ARTICLE),
            ))
            .await?;

        Ok(TopicDetails {
            published_at,
            body_text,
            media,
            screenshot_png,
        })
    }

    /// Visit a tracked topic and snapshot its reply count and transcript.
    pub async fn count_replies(&self, url: &str) -> Result<ReplySnapshot, SessionError> {
        self.goto_url(url).await?;
        self.wait_for_selector(selectors::FIRST_POST_ARTICLE, "first post", TOPIC_WAIT)
            .await?;

        self.eval(&format!(
            r#"(() => {{
                const posts = Array.from(document.querySelectorAll({post}));
                const transcript = posts.map(post => {{
                    const body = post.querySelector({text});
                    return body ? body.innerText.trim() : '';
                }}).join('\n\n---\n\n');
                return {{ post_count: posts.length, transcript: transcript }};
            }})()"#,
            post = js_quote(selectors::POST_ARTICLE),
            text = js_quote(selectors::POST_TEXT),
        ))
        .await
    }
}

#[async_trait]
impl AutomationSteps for ForumSession {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), SessionError> {
        info!(nickname = %credentials.nickname, "signing in");
        self.goto_url(&self.settings.login_url).await?;

        let name_field = self
            .wait_for_selector(selectors::LOGIN_NAME_FIELD, "login field", LOGIN_WAIT)
            .await?;
        name_field.click().await.map_err(SessionError::driver)?;
        name_field
            .type_str(&credentials.nickname)
            .await
            .map_err(SessionError::driver)?;

        let password_field = self
            .wait_for_selector(selectors::LOGIN_PASSWORD_FIELD, "password field", LOGIN_WAIT)
            .await?;
        password_field.click().await.map_err(SessionError::driver)?;
        password_field
            .type_str(&credentials.secret)
            .await
            .map_err(SessionError::driver)?;

        let submit = self
            .wait_for_selector(selectors::LOGIN_SUBMIT, "sign-in button", LOGIN_WAIT)
            .await?;
        submit.click().await.map_err(SessionError::driver)?;

        // Either the account marker appears (success) or the forum renders
        // its inline error block (bad credentials, throttling, ...).
        let deadline = Instant::now() + LOGIN_WAIT;
        loop {
            if self.try_find(selectors::ACCOUNT_MENU).await.is_some() {
                info!(nickname = %credentials.nickname, "signed in");
                return Ok(());
            }
            if let Some(block) = self.try_find(selectors::LOGIN_ERROR_BLOCK).await {
                let detail = block
                    .inner_text()
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| "sign-in error block shown".to_string());
                return Err(SessionError::LoginRejected {
                    nickname: credentials.nickname.clone(),
                    detail: detail.trim().to_string(),
                });
            }
            if Instant::now() >= deadline {
                return Err(SessionError::Timeout {
                    what: "post-login account marker".to_string(),
                    waited_secs: LOGIN_WAIT.as_secs(),
                });
            }
            tokio::time::sleep(POLL_STEP).await;
        }
    }

    async fn deauthenticate(&mut self) -> Result<(), SessionError> {
        let Some(menu) = self.try_find(selectors::ACCOUNT_MENU).await else {
            // No account menu means nobody is signed in.
            info!("account menu absent, treating as already signed out");
            return Ok(());
        };
        menu.click().await.map_err(SessionError::driver)?;
        self.wait_click_link_by_text(selectors::LOGOUT_LINK_TEXT, LOGOUT_WAIT)
            .await?;
        self.wait_for_selector(selectors::LOGGED_OUT_MARKER, "logged-out marker", LOGOUT_WAIT)
            .await?;
        info!("signed out");
        Ok(())
    }

    async fn post_reply(&mut self, thread_url: &str, body: &str) -> Result<(), SessionError> {
        info!(url = %thread_url, "posting reply");
        self.goto_url(thread_url).await?;

        let editor = self
            .wait_for_selector(selectors::REPLY_EDITOR, "reply editor", REPLY_WAIT)
            .await?;
        editor.click().await.map_err(SessionError::driver)?;
        editor.type_str(body).await.map_err(SessionError::driver)?;

        let submit = self
            .wait_for_selector(selectors::REPLY_SUBMIT, "reply submit button", REPLY_WAIT)
            .await?;
        submit.click().await.map_err(SessionError::driver)?;

        // Confirm the post actually rendered by finding its trailing
        // fragment on the page.
        let fragment = trailing_fragment(body, CONFIRMATION_CHARS);
        let condition = format!(
            "document.body.innerText.includes({})",
            js_quote(fragment)
        );
        self.wait_for_condition(&condition, "posted reply confirmation", REPLY_WAIT)
            .await?;
        info!(url = %thread_url, "reply confirmed on page");
        Ok(())
    }

    async fn pin(&mut self) -> Result<(), SessionError> {
        let menu = self
            .wait_for_selector(selectors::THREAD_TOOLS_MENU, "thread tools menu", MENU_WAIT)
            .await?;
        menu.click().await.map_err(SessionError::driver)?;
        self.wait_click_link_by_text(selectors::PIN_LINK_TEXT, MENU_WAIT)
            .await?;
        // The forum gives no confirmation for pinning; the click is the
        // whole operation.
        info!("pin link clicked");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let menu = self
            .wait_for_selector(selectors::THREAD_TOOLS_MENU, "thread tools menu", MENU_WAIT)
            .await?;
        menu.click().await.map_err(SessionError::driver)?;

        if self
            .click_link_by_text(selectors::UNPIN_LINK_TEXT)
            .await?
        {
            // Unpinning reloads the page; let it settle and reopen the menu.
            info!("thread was pinned, unpinned it first");
            tokio::time::sleep(UNPIN_SETTLE).await;
            let menu = self
                .wait_for_selector(selectors::THREAD_TOOLS_MENU, "thread tools menu", MENU_WAIT)
                .await?;
            menu.click().await.map_err(SessionError::driver)?;
        }

        self.wait_click_link_by_text(selectors::CLOSE_LINK_TEXT, MENU_WAIT)
            .await?;
        info!("close link clicked");
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<(), SessionError> {
        self.goto_url(url).await
    }
}

/// Quote a Rust string as a JS string literal.
fn js_quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
