//! E1.RU (Yekaterinburg) realty section and developer tag.
//!
//! The realty section accepts a `dateFrom`/`dateTo` window plus a page number;
//! the tag listing paginates by path (`page-N/`). Both share the article
//! page layout.

use scraper::{Html, Selector};
use url::Url;

use crate::crawl::adapter::{container_paragraphs, css, element_text, resolve_link, Pagination, SiteAdapter};
use crate::error::Result;
use crate::models::{ArticleStub, CrawlWindow};

pub const REALTY_URL: &str = "https://www.e1.ru/text/realty/";
pub const BUILDERS_URL: &str = "https://www.e1.ru/text/tags/zastroyschik/";
const SOURCE: &str = "E1.RU";
const WINDOW_DATE_FORMAT: &str = "%d.%m.%Y";

struct ArticlePage {
    body: Selector,
    paragraph: Selector,
}

impl ArticlePage {
    fn new() -> Result<Self> {
        Ok(Self {
            body: css("div#articleBody")?,
            paragraph: css("p")?,
        })
    }

    fn extract(&self, html: &str) -> String {
        container_paragraphs(html, &self.body, &self.paragraph)
    }
}

/// Realty section filtered by date window.
pub struct E1RealtyAdapter {
    base: Url,
    block: Selector,
    link: Selector,
    date: Selector,
    article: ArticlePage,
}

impl E1RealtyAdapter {
    pub fn new(base: Url) -> Result<Self> {
        Ok(Self {
            base,
            block: css("div.wrap_RL97A")?,
            link: css("div.content_RL97A a")?,
            date: css("div.statistic_RL97A span.text_eiDCU")?,
            article: ArticlePage::new()?,
        })
    }
}

impl SiteAdapter for E1RealtyAdapter {
    fn source_name(&self) -> &str {
        SOURCE
    }

    fn pagination(&self) -> Pagination {
        Pagination::DateWindow
    }

    fn max_pages(&self) -> u32 {
        50
    }

    fn build_listing_url(&self, page: u32, window: &CrawlWindow) -> Result<Url> {
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("dateFrom", &window.start.format(WINDOW_DATE_FORMAT).to_string())
            .append_pair("dateTo", &window.end.format(WINDOW_DATE_FORMAT).to_string())
            .append_pair("page", &page.to_string());
        Ok(url)
    }

    fn extract_stubs(&self, listing_html: &str) -> Vec<ArticleStub> {
        let document = Html::parse_document(listing_html);

        document
            .select(&self.block)
            .filter_map(|block| {
                let anchor = block.select(&self.link).next()?;
                let link = resolve_link(&self.base, anchor.value().attr("href")?)?;
                let title = anchor
                    .value()
                    .attr("title")
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| element_text(anchor));
                if title.is_empty() {
                    return None;
                }
                let raw_date = block
                    .select(&self.date)
                    .next()
                    .map(element_text)
                    .unwrap_or_default();
                Some(ArticleStub::new(title, link, raw_date))
            })
            .collect()
    }

    fn extract_body(&self, article_html: &str) -> String {
        self.article.extract(article_html)
    }
}

/// Developer ("застройщик") tag listing.
pub struct E1BuildersAdapter {
    base: Url,
    container: Selector,
    item: Selector,
    title: Selector,
    date: Selector,
    article: ArticlePage,
}

impl E1BuildersAdapter {
    pub fn new(base: Url) -> Result<Self> {
        Ok(Self {
            base,
            container: css("div.announcementList_zwnJ9")?,
            item: css("div.wrap_fgrum")?,
            title: css("a.header_fgrum")?,
            date: css("span.text_0UNFI")?,
            article: ArticlePage::new()?,
        })
    }
}

impl SiteAdapter for E1BuildersAdapter {
    fn source_name(&self) -> &str {
        SOURCE
    }

    fn pagination(&self) -> Pagination {
        Pagination::PageNumber
    }

    fn max_pages(&self) -> u32 {
        10
    }

    fn build_listing_url(&self, page: u32, _window: &CrawlWindow) -> Result<Url> {
        if page <= 1 {
            return Ok(self.base.clone());
        }
        Ok(self.base.join(&format!("page-{}/", page))?)
    }

    fn extract_stubs(&self, listing_html: &str) -> Vec<ArticleStub> {
        let document = Html::parse_document(listing_html);
        let Some(container) = document.select(&self.container).next() else {
            tracing::debug!("E1 announcement list not found");
            return Vec::new();
        };

        container
            .select(&self.item)
            .filter_map(|item| {
                let anchor = item.select(&self.title).next()?;
                let link = resolve_link(&self.base, anchor.value().attr("href")?)?;
                let title = element_text(anchor);
                if title.is_empty() {
                    return None;
                }
                let raw_date = item
                    .select(&self.date)
                    .next()
                    .map(element_text)
                    .unwrap_or_default();
                Some(ArticleStub::new(title, link, raw_date))
            })
            .collect()
    }

    fn extract_body(&self, article_html: &str) -> String {
        self.article.extract(article_html)
    }
}
