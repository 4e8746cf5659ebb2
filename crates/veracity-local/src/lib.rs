//! Local implementations for `veracity`: page fetch, article location, the Gemini
//! backend and presentation, plus [`check_page`], which wires them together.

use serde::Serialize;
use std::time::Duration;
use veracity_core::fallback::{analyze, ModelBackend};
use veracity_core::dom::NodeId;
use veracity_core::highlight::HighlightReport;
use veracity_core::{Error, Highlighter, Quote, Result, Verdict, VerdictEnvelope};

pub mod article;
pub mod gemini;
pub mod prompt;
pub mod report;

pub use article::{Article, ArticleLocator, Page, Strategy};
pub use gemini::{GeminiBackend, GeminiConfig};
pub use prompt::PromptBuilder;
pub use report::{render_text, Overlay};

pub const USER_AGENT: &str = concat!("veracity/", env!("CARGO_PKG_VERSION"));

/// Pages larger than this are cut; article text lives near the top anyway.
pub const DEFAULT_MAX_PAGE_BYTES: usize = 5_000_000;

/// Shared client for page fetches and model calls.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(10))
        // Model calls set their own per-request timeout on top of this.
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(300))
        .build()
        .map_err(|e| Error::Transport(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub html: String,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    max_bytes: usize,
    timeout: Duration,
}

impl PageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_bytes: DEFAULT_MAX_PAGE_BYTES,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let parsed = url::Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(format!(
                "{url}: unsupported scheme {}",
                parsed.scheme()
            )));
        }

        let t0 = std::time::Instant::now();
        let resp = self
            .client
            .get(parsed)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;
        let final_url = resp.url().to_string();
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("HTTP {} for {final_url}", status.as_u16())));
        }

        let mut truncated = false;
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
            if bytes.len().saturating_add(chunk.len()) > self.max_bytes {
                let can_take = self.max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        tracing::info!(
            url = %final_url,
            status = status.as_u16(),
            bytes = bytes.len(),
            truncated,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "page fetched"
        );
        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            html: String::from_utf8_lossy(&bytes).into_owned(),
            truncated,
        })
    }
}

/// Knobs for one check; defaults match the browser behaviour.
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    pub locator: ArticleLocator,
    pub prompt: PromptBuilder,
    pub highlighter: Highlighter,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    #[serde(flatten)]
    pub envelope: VerdictEnvelope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    pub article_chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlights: Option<HighlightReport>,
}

/// Locate the article, ask the model, then highlight and render the overlay in `page`.
///
/// `backend = None` means no credential was configured; that is reported before any
/// network call. Failures end up in the envelope rather than as `Err`.
pub async fn check_page<B>(
    page: &mut Page,
    backend: Option<&B>,
    models: &[String],
    opts: &CheckOptions,
) -> CheckReport
where
    B: ModelBackend + ?Sized,
{
    // A page saved by an earlier run carries our overlay; its quote list must not be
    // matched or sent to the model.
    Overlay::remove(page.document_mut());

    let article = match opts.locator.locate(page) {
        Ok(a) => a,
        Err(e) => return finish(page, None, Err(e), opts),
    };
    let Some(backend) = backend else {
        return finish(page, Some(&article), Err(Error::MissingCredential), opts);
    };

    let prompt = opts.prompt.build(&article.text);
    let result = analyze(backend, models, &prompt).await;
    finish(page, Some(&article), result, opts)
}

fn finish(
    page: &mut Page,
    article: Option<&Article>,
    result: Result<Verdict>,
    opts: &CheckOptions,
) -> CheckReport {
    let envelope = VerdictEnvelope::from(result);
    let highlights = match envelope.verdict() {
        Some(v) => {
            let root = article.and_then(|a| a.element);
            let report = highlight_article(page, root, &v.quotes, &opts.highlighter);
            root.map(|_| report)
        }
        None => {
            let root = page.document().root();
            opts.highlighter.clear(page.document_mut(), root);
            None
        }
    };
    if let Some(err) = &envelope.error {
        tracing::warn!(error = %err, "check failed");
    }

    let overlay = Overlay::attach(page.document_mut());
    overlay.render(page.document_mut(), &envelope);

    CheckReport {
        envelope,
        strategy: article.map(|a| a.strategy.clone()),
        article_chars: article.map(|a| a.text.chars().count()).unwrap_or(0),
        highlights,
    }
}

/// Apply an existing verdict to a page: highlight its quotes and render the overlay.
pub fn annotate_page(
    page: &mut Page,
    envelope: &VerdictEnvelope,
    locator: &ArticleLocator,
    highlighter: &Highlighter,
) -> HighlightReport {
    Overlay::remove(page.document_mut());
    let root = locator.article_element(page);
    let quotes = envelope.verdict().map(|v| v.quotes).unwrap_or_default();
    let report = highlight_article(page, root, &quotes, highlighter);
    let overlay = Overlay::attach(page.document_mut());
    overlay.render(page.document_mut(), envelope);
    report
}

/// Highlight under the article element only. Without one, markers left in the main
/// region by an earlier pass are unwound and nothing new is wrapped.
fn highlight_article(
    page: &mut Page,
    root: Option<NodeId>,
    quotes: &[Quote],
    highlighter: &Highlighter,
) -> HighlightReport {
    match root {
        Some(r) => highlighter.highlight(page.document_mut(), r, quotes),
        None => {
            let unwrapped = page
                .main_region()
                .map(|r| highlighter.clear(page.document_mut(), r))
                .unwrap_or(0);
            HighlightReport {
                unwrapped,
                ..HighlightReport::default()
            }
        }
    }
}
