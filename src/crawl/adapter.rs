use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ArticleStub, CrawlWindow};

/// How a source advances through its listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// Page number in the path or query, window not part of the URL.
    PageNumber,
    /// Date window in the query, page number advances within it.
    DateWindow,
}

/// Per-source knowledge of listing URLs and page markup.
///
/// Implementations are pure: they never perform I/O, and parsing problems
/// degrade to fewer stubs or an empty body rather than errors.
pub trait SiteAdapter: Send + Sync {
    /// Constant tag stored on every article from this source.
    fn source_name(&self) -> &str;

    fn pagination(&self) -> Pagination;

    /// Upper bound on listing pages visited in one run.
    fn max_pages(&self) -> u32;

    fn build_listing_url(&self, page: u32, window: &CrawlWindow) -> Result<Url>;

    /// Stubs in document order. Items missing a title or link are skipped.
    fn extract_stubs(&self, listing_html: &str) -> Vec<ArticleStub>;

    /// Article text, or an empty string when the content container is absent.
    fn extract_body(&self, article_html: &str) -> String;
}

pub(crate) fn css(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| AppError::Config(format!("invalid selector {:?}: {}", selector, e)))
}

/// Whitespace-collapsed text content of an element.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve a potentially relative href against the source's base URL.
pub(crate) fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    base.join(href).ok().map(|url| url.to_string())
}

/// Page-number URL: page 1 is the base URL itself, later pages add `?page=N`.
pub(crate) fn page_query_url(base: &Url, page: u32) -> Url {
    let mut url = base.clone();
    if page > 1 {
        url.query_pairs_mut().append_pair("page", &page.to_string());
    }
    url
}

/// Non-empty paragraph texts under the first `container`, one per line.
/// Paragraphs inside a figure caption are left out.
pub(crate) fn container_paragraphs(
    html: &str,
    container: &Selector,
    paragraph: &Selector,
) -> String {
    let document = Html::parse_document(html);
    let Some(body) = document.select(container).next() else {
        tracing::debug!("Article content container not found");
        return String::new();
    };

    body.select(paragraph)
        .filter(|p| !inside_figcaption(*p))
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn inside_figcaption(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| ancestor.value().name() == "figcaption")
}
