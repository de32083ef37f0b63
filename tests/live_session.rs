//! Integration tests against a real Chrome/Chromium binary.
//!
//! These are marked `#[ignore]` because they spawn actual browser processes.
//! Set `WG_AUTOMAT_CHROME_BIN` to pick a specific binary; otherwise the
//! system Chrome is auto-detected. Page behaviour is exercised against local
//! HTML fixtures served over `file://`, so no network access is needed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use wg_automat::{
    AutomationConfig, ChromeSessionFactory, Locator, ManagedSession, PageSession, SessionError,
    SessionFactory, SessionManager, Verbosity,
};

fn base_config() -> AutomationConfig {
    let mut config = AutomationConfig::default();
    config.chrome_executable = std::env::var("WG_AUTOMAT_CHROME_BIN")
        .ok()
        .map(PathBuf::from);
    config.verbose = Verbosity::Minimal;
    // Fixtures are local files; long production waits would only slow the
    // failure-path assertions down.
    config.short_wait_ms = 1_500;
    config.long_wait_ms = 3_000;
    config.settle_delay_ms = 50;
    config
}

fn write_fixture(dir: &Path, name: &str, html: &str) -> Result<String> {
    let path = dir.join(name);
    std::fs::write(&path, html).with_context(|| format!("writing fixture {name}"))?;
    Ok(format!("file://{}", path.display()))
}

async fn spawn_session(config: AutomationConfig) -> Result<PageSession> {
    let factory = ChromeSessionFactory::new(config);
    let session = factory
        .create("live-test")
        .await
        .context("launching Chrome")?;
    Ok(session)
}

const LOGIN_FORM_FIXTURE: &str = r##"<!doctype html>
<html><body>
  <div id="cmpbox"><p>We value your privacy</p></div>
  <a href="#" onclick="document.getElementById('form').style.display='block'">Mein Konto</a>
  <div id="form" style="display:none">
    <input id="login_email_username">
    <input id="login_password" type="password">
    <button id="login_submit"
      onclick="document.getElementById('login_basic').style.display='block'">Login</button>
    <div id="login_basic" style="display:none">
      <div class="alert-danger">Invalid credentials</div>
    </div>
  </div>
</body></html>
"##;

const LOGIN_OK_FIXTURE: &str = r##"<!doctype html>
<html><body>
  <a href="#" onclick="document.getElementById('form').style.display='block'">Mein Konto</a>
  <div id="form" style="display:none">
    <input id="login_email_username">
    <input id="login_password" type="password">
    <button id="login_submit"
      onclick="document.getElementById('form').remove()">Login</button>
  </div>
</body></html>
"##;

const AUTHENTICATED_FIXTURE: &str = r##"<!doctype html>
<html><body>
  <a href="#" onclick="document.getElementById('menu').style.display='block'">Mein Konto</a>
  <div id="menu" style="display:none"><a href="/logout">Logout</a></div>
</body></html>
"##;

#[tokio::test]
#[ignore = "requires a Chrome/Chromium binary"]
#[serial_test::serial]
async fn session_launches_navigates_and_shuts_down() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let url = write_fixture(
        dir.path(),
        "hello.html",
        "<html><body><h1>hello</h1></body></html>",
    )?;

    let session = spawn_session(base_config()).await?;
    session.navigate(&url).await?;
    session
        .find(&Locator::text("hello"), Duration::from_secs(2))
        .await?;

    session.shutdown().await;
    // A second shutdown is a no-op, and operations now report Closed.
    session.shutdown().await;
    let err = session.navigate(&url).await.unwrap_err();
    assert!(matches!(err, SessionError::Closed));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Chrome/Chromium binary"]
#[serial_test::serial]
async fn consent_overlay_is_removed_on_navigation() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let url = write_fixture(
        dir.path(),
        "overlay.html",
        r##"<html><body>
          <div id="cmpbox">consent</div>
          <div id="cmpbox2">more consent</div>
          <button id="target">ok</button>
        </body></html>"##,
    )?;

    let session = spawn_session(base_config()).await?;
    session.navigate(&url).await?;

    let err = session
        .find(&Locator::css("#cmpbox"), Duration::from_millis(300))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::ElementNotFound { .. }));

    // The page behind the overlay is still actionable.
    session.click(&Locator::css("#target")).await?;

    session.shutdown().await;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Chrome/Chromium binary"]
#[serial_test::serial]
async fn find_falls_back_to_presence_for_hidden_elements() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let url = write_fixture(
        dir.path(),
        "hidden.html",
        r##"<html><body>
          <div id="late" style="display:none">late content</div>
        </body></html>"##,
    )?;

    let session = spawn_session(base_config()).await?;
    session.navigate(&url).await?;

    // Never becomes visible, but the presence fallback still resolves it.
    let found = session
        .find(&Locator::css("#late"), Duration::from_millis(400))
        .await?;
    assert_eq!(found.locator(), &Locator::css("#late"));

    let err = session
        .find(&Locator::css("#absent"), Duration::from_millis(400))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::ElementNotFound { .. }));

    session.shutdown().await;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Chrome/Chromium binary"]
#[serial_test::serial]
async fn click_and_type_drive_the_page() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let url = write_fixture(
        dir.path(),
        "form.html",
        r##"<html><body>
          <input id="name"
            oninput="document.getElementById('typed').textContent = this.value">
          <div id="typed"></div>
          <button id="go"
            onclick="document.getElementById('done').style.display='block'">Go</button>
          <div id="done" style="display:none">all done</div>
        </body></html>"##,
    )?;

    let session = spawn_session(base_config()).await?;
    session.navigate(&url).await?;

    session
        .type_text(&Locator::css("#name"), "hello fixture")
        .await?;
    session
        .find(&Locator::text("hello fixture"), Duration::from_secs(2))
        .await?;

    session.click(&Locator::css("#go")).await?;
    session
        .find(&Locator::text("all done"), Duration::from_secs(2))
        .await?;

    session.shutdown().await;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Chrome/Chromium binary"]
#[serial_test::serial]
async fn login_succeeds_when_no_error_node_appears() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let url = write_fixture(dir.path(), "login_ok.html", LOGIN_OK_FIXTURE)?;
    let shots = tempfile::tempdir()?;

    let mut config = base_config();
    config.base_url = url;
    config.screenshot_dir = Some(shots.path().to_path_buf());

    let session = spawn_session(config).await?;
    let outcome = session.login("anna@example.org", "s3cret").await?;
    assert!(outcome);
    assert_eq!(session.account_name().as_deref(), Some("anna"));

    // The audit screenshot is written regardless of outcome.
    assert!(shots.path().join("login_live_test.png").exists());

    session.shutdown().await;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Chrome/Chromium binary"]
#[serial_test::serial]
async fn login_fails_when_the_error_node_is_visible() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let url = write_fixture(dir.path(), "login_bad.html", LOGIN_FORM_FIXTURE)?;

    let mut config = base_config();
    config.base_url = url;

    let session = spawn_session(config).await?;
    let outcome = session.login("anna@example.org", "wrong").await?;
    assert!(!outcome);
    assert!(session.account_name().is_none());

    session.shutdown().await;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Chrome/Chromium binary"]
#[serial_test::serial]
async fn is_authenticated_reflects_the_login_prompt() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prompt_url = write_fixture(dir.path(), "prompt.html", LOGIN_FORM_FIXTURE)?;
    let authed_url = write_fixture(dir.path(), "authed.html", AUTHENTICATED_FIXTURE)?;

    let mut config = base_config();
    config.base_url = prompt_url;
    let session = spawn_session(config).await?;
    assert!(!session.is_authenticated().await?);
    session.shutdown().await;

    let mut config = base_config();
    config.base_url = authed_url;
    let session = spawn_session(config).await?;
    assert!(session.is_authenticated().await?);
    session.shutdown().await;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Chrome/Chromium binary"]
#[serial_test::serial]
async fn registry_reuses_and_releases_real_sessions() -> Result<()> {
    let manager = Arc::new(SessionManager::new(ChromeSessionFactory::new(
        base_config(),
    )));

    let first = manager.acquire("anna").await?;
    let again = manager.acquire("anna").await?;
    assert!(Arc::ptr_eq(&first, &again));

    let other = manager.acquire("ben").await?;
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(manager.active_count().await, 2);

    manager.release("anna").await;
    assert_eq!(manager.active_count().await, 1);
    let err = first.is_authenticated().await.unwrap_err();
    assert!(matches!(err, SessionError::Closed));

    manager.shutdown_all().await;
    assert_eq!(manager.active_count().await, 0);
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Chrome/Chromium binary"]
#[serial_test::serial]
async fn sweep_evicts_idle_real_sessions() -> Result<()> {
    let manager = Arc::new(SessionManager::new(ChromeSessionFactory::new(
        base_config(),
    )));

    manager.acquire("anna").await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let evicted = manager.sweep(Duration::from_millis(10)).await;
    assert_eq!(evicted, 1);
    assert_eq!(manager.active_count().await, 0);

    // A fresh acquire after eviction spawns a new browser.
    manager.acquire("anna").await?;
    assert_eq!(manager.active_count().await, 1);
    manager.shutdown_all().await;
    Ok(())
}
