//! RIA Realty legislation tag (`realty.ria.ru`).

use scraper::{Html, Selector};
use url::Url;

use crate::crawl::adapter::{css, element_text, page_query_url, resolve_link, Pagination, SiteAdapter};
use crate::error::Result;
use crate::models::{ArticleStub, CrawlWindow};

pub const DEFAULT_URL: &str = "https://realty.ria.ru/tag_thematic_category_Zakonodatelstvo/";
const SOURCE: &str = "RIA Realty";

pub struct RiaAdapter {
    base: Url,
    container: Selector,
    item: Selector,
    title: Selector,
    date: Selector,
    body: Selector,
    text_block: Selector,
}

impl RiaAdapter {
    pub fn new(base: Url) -> Result<Self> {
        Ok(Self {
            base,
            container: css("div.list-tags")?,
            item: css(r#"div.list-item[data-type="article"]"#)?,
            title: css("a.list-item__title")?,
            date: css(r#"div.list-item__info-item[data-type="date"]"#)?,
            body: css("div.article__body")?,
            text_block: css(r#"div.article__block[data-type="text"] .article__text"#)?,
        })
    }
}

impl SiteAdapter for RiaAdapter {
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
        let Some(container) = document.select(&self.container).next() else {
            tracing::debug!("RIA listing container not found");
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
        let document = Html::parse_document(article_html);
        let Some(body) = document.select(&self.body).next() else {
            return String::new();
        };

        body.select(&self.text_block)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
