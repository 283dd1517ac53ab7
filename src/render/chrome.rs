//! Headless Chrome renderer
//!
//! One browser process per render. The process is owned by a
//! [`BrowserSession`] shared between the blocking task and the awaiting
//! future. It is torn down when printing ends, or as soon as the future is
//! dropped (the engine's timeout). The render slot travels with the blocking
//! task, so it is held until that task has really finished.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use headless_chrome::protocol::cdp::Emulation;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions, Tab};

use super::types::{RenderError, RenderProfile};
use super::{PdfRenderer, RenderSlot};
use crate::config::RenderConfig;

/// Flags for running inside minimal containers
const CHROME_ARGS: &[&str] = &[
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-setuid-sandbox",
    "--no-first-run",
    "--no-sandbox",
    "--no-zygote",
    "--single-process",
];

/// Prints local HTML files to PDF with headless Chrome
#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    chrome_path: Option<PathBuf>,
    timeout: Duration,
}

impl ChromeRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            chrome_path: config.chrome_path.clone(),
            timeout: config.timeout(),
        }
    }

    fn launch_options(&self) -> Result<LaunchOptions<'static>, RenderError> {
        LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .path(self.chrome_path.clone())
            .args(CHROME_ARGS.iter().map(|arg| OsStr::new(*arg)).collect())
            // A stalled page makes the browser go idle; this tears it down
            .idle_browser_timeout(self.timeout)
            .build()
            .map_err(|e| RenderError::BrowserLaunch(e.to_string()))
    }
}

#[async_trait::async_trait]
impl PdfRenderer for ChromeRenderer {
    async fn render(
        &self,
        entry: &Path,
        profile: &RenderProfile,
        slot: RenderSlot,
    ) -> Result<Vec<u8>, RenderError> {
        let options = self.launch_options()?;
        let entry = entry.to_path_buf();
        let profile = profile.clone();
        let timeout = self.timeout;

        let shared = Arc::new(SharedSession::new());
        let worker = shared.clone();
        let _abandon = AbandonGuard(shared);

        tokio::task::spawn_blocking(move || {
            let _slot = slot;
            let session = BrowserSession::launch(options)?;
            let tab = session.open_tab(timeout)?;

            if let Err(session) = worker.install(session) {
                drop(session);
                return Err(RenderError::Timeout(timeout.as_secs()));
            }

            let result = print(&tab, &entry, &profile);
            drop(worker.finish());
            result
        })
        .await
        .map_err(|e| RenderError::Join(e.to_string()))?
    }
}

/// Scoped owner of one browser process.
///
/// `headless_chrome` kills the child process when the `Browser` drops;
/// holding the only handle here ties process lifetime to this value.
struct BrowserSession {
    browser: Browser,
    pid: Option<u32>,
}

impl BrowserSession {
    fn launch(options: LaunchOptions<'static>) -> Result<Self, RenderError> {
        let browser = Browser::new(options).map_err(|e| RenderError::BrowserLaunch(e.to_string()))?;
        let pid = browser.get_process_id();
        tracing::debug!(pid = ?pid, "Browser launched");
        Ok(Self { browser, pid })
    }

    fn open_tab(&self, timeout: Duration) -> Result<Arc<Tab>, RenderError> {
        let tab = self.browser.new_tab().map_err(tab_failure)?;
        tab.set_default_timeout(timeout);
        Ok(tab)
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        tracing::debug!(pid = ?self.pid, "Terminating browser");
    }
}

/// The browser already runs, so a tab that will not open is a page-level failure
fn tab_failure(e: impl std::fmt::Display) -> RenderError {
    RenderError::Navigation(format!("failed to open tab: {}", e))
}

fn print(tab: &Tab, entry: &Path, profile: &RenderProfile) -> Result<Vec<u8>, RenderError> {
    let absolute = std::fs::canonicalize(entry)
        .map_err(|_| RenderError::MissingEntryDocument(entry.to_path_buf()))?;
    let url = file_url(&absolute);

    tab.navigate_to(&url)
        .and_then(|tab| tab.wait_until_navigated())
        .map_err(|e| RenderError::Navigation(format!("{}: {}", url, e)))?;

    tab.call_method(Emulation::SetEmulatedMedia {
        media: Some(profile.media.to_string()),
        features: None,
    })
    .map_err(|e| RenderError::Print(e.to_string()))?;

    let pdf = tab
        .print_to_pdf(Some(print_options(profile)))
        .map_err(|e| RenderError::Print(e.to_string()))?;

    tracing::debug!(bytes = pdf.len(), "Page printed");
    Ok(pdf)
}

enum SessionState<T> {
    Starting,
    Running(T),
    Finished,
}

/// A browser handed between the blocking worker and the awaiting task.
///
/// The worker installs the session once a tab is open and takes it back when
/// printing ends. If the awaiting task is dropped first, it takes the session
/// instead and kills it, which fails the worker's pending CDP calls.
struct SharedSession<T> {
    state: Mutex<SessionState<T>>,
}

impl<T> SharedSession<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Starting),
        }
    }

    /// Hand over a running session; returned if the render was already abandoned
    fn install(&self, session: T) -> Result<(), T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            SessionState::Starting => {
                *state = SessionState::Running(session);
                Ok(())
            }
            _ => Err(session),
        }
    }

    /// Take the session out and close the handover
    fn finish(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *state, SessionState::Finished) {
            SessionState::Running(session) => Some(session),
            _ => None,
        }
    }
}

/// Kills a session still running when the render future is dropped
struct AbandonGuard<T: Send + 'static>(Arc<SharedSession<T>>);

impl<T: Send + 'static> Drop for AbandonGuard<T> {
    fn drop(&mut self) {
        let Some(session) = self.0.finish() else {
            return;
        };

        tracing::warn!("Render abandoned, killing browser");
        // Killing and reaping the child blocks
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || drop(session));
            }
            Err(_) => drop(session),
        }
    }
}

fn print_options(profile: &RenderProfile) -> PrintToPdfOptions {
    PrintToPdfOptions {
        landscape: Some(profile.landscape),
        display_header_footer: Some(profile.display_header_footer),
        print_background: Some(profile.print_background),
        paper_width: Some(profile.paper_width_in),
        paper_height: Some(profile.paper_height_in),
        ..Default::default()
    }
}

/// `file://` URL for an absolute path, percent-encoding anything unsafe
fn file_url(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut url = String::with_capacity(raw.len() + 8);
    url.push_str("file://");
    if !raw.starts_with('/') {
        url.push('/');
    }
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                url.push(byte as char)
            }
            b'\\' => url.push('/'),
            _ => url.push_str(&format!("%{:02X}", byte)),
        }
    }
    url
}
