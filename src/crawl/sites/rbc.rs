//! RBC Realty industry news (`realty.rbc.ru/industry/`).
//!
//! The listing loads further items through script, so only the first page is
//! reachable over plain HTTP.

use scraper::{Html, Selector};
use url::Url;

use crate::crawl::adapter::{
    container_paragraphs, css, element_text, page_query_url, resolve_link, Pagination, SiteAdapter,
};
use crate::error::Result;
use crate::models::{ArticleStub, CrawlWindow};

pub const DEFAULT_URL: &str = "https://realty.rbc.ru/industry/";
const SOURCE: &str = "РБК Недвижимость";

pub struct RbcAdapter {
    base: Url,
    item: Selector,
    link: Selector,
    title: Selector,
    date: Selector,
    body: Selector,
    paragraph: Selector,
}

impl RbcAdapter {
    pub fn new(base: Url) -> Result<Self> {
        Ok(Self {
            base,
            item: css(".item")?,
            link: css("a.item__link")?,
            title: css(".item__title")?,
            date: css(".item__category")?,
            body: css("div.article__text")?,
            paragraph: css("p")?,
        })
    }
}

impl SiteAdapter for RbcAdapter {
    fn source_name(&self) -> &str {
        SOURCE
    }

    fn pagination(&self) -> Pagination {
        Pagination::PageNumber
    }

    fn max_pages(&self) -> u32 {
        1
    }

    fn build_listing_url(&self, page: u32, _window: &CrawlWindow) -> Result<Url> {
        Ok(page_query_url(&self.base, page))
    }

    fn extract_stubs(&self, listing_html: &str) -> Vec<ArticleStub> {
        let document = Html::parse_document(listing_html);

        document
            .select(&self.item)
            .filter_map(|item| {
                let link = item.select(&self.link).next()?;
                let href = resolve_link(&self.base, link.value().attr("href")?)?;
                let title = link
                    .select(&self.title)
                    .next()
                    .map(element_text)
                    .unwrap_or_else(|| element_text(link));
                if title.is_empty() {
                    tracing::debug!(%href, "Skipping RBC item without title");
                    return None;
                }
                let raw_date = item
                    .select(&self.date)
                    .next()
                    .map(element_text)
                    .unwrap_or_default();
                Some(ArticleStub::new(title, href, raw_date))
            })
            .collect()
    }

    fn extract_body(&self, article_html: &str) -> String {
        container_paragraphs(article_html, &self.body, &self.paragraph)
    }
}
