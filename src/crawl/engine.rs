use std::collections::HashSet;

use chrono::{Local, NaiveDate, NaiveDateTime};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use super::adapter::SiteAdapter;
use super::date;
use super::fetcher::PageFetcher;
use crate::models::{ArticleStub, CrawlWindow, NewArticle};

/// Why pagination stopped. Reported in logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    FetchFailed,
    EmptyPage,
    CaughtUp,
    WindowExhausted,
    PageCap,
    MaxArticles,
}

/// Drives one ingestion run for a single source.
///
/// Requests are issued one at a time. Listing failures end pagination with
/// whatever was collected; body failures leave that article's content empty.
pub struct CrawlEngine {
    fetcher: PageFetcher,
    reference: Option<NaiveDateTime>,
}

impl CrawlEngine {
    pub fn new(fetcher: PageFetcher) -> Self {
        Self {
            fetcher,
            reference: None,
        }
    }

    /// Pin the "now" used to resolve relative dates.
    pub fn with_reference_time(mut self, reference: NaiveDateTime) -> Self {
        self.reference = Some(reference);
        self
    }

    #[instrument(level = "info", skip_all, fields(source = adapter.source_name(), topic_id = topic_id, start = %window.start, end = %window.end))]
    pub async fn run(
        &self,
        adapter: &dyn SiteAdapter,
        topic_id: i64,
        window: &CrawlWindow,
        existing_links: &HashSet<String>,
        max_articles: Option<usize>,
    ) -> Vec<NewArticle> {
        if max_articles == Some(0) {
            return Vec::new();
        }

        let reference = self
            .reference
            .unwrap_or_else(|| Local::now().naive_local());
        let accepted = self
            .collect_stubs(adapter, window, existing_links, max_articles, reference)
            .await;

        let articles: Vec<NewArticle> = stream::iter(accepted)
            .then(|(stub, publication_date)| async move {
                let content = self.fetch_body(adapter, &stub.link).await;
                NewArticle {
                    topic_id,
                    title: stub.title,
                    publication_date,
                    link: stub.link,
                    content,
                    source: adapter.source_name().to_string(),
                }
            })
            .collect()
            .await;

        info!(count = articles.len(), "Crawl run finished");
        articles
    }

    async fn collect_stubs(
        &self,
        adapter: &dyn SiteAdapter,
        window: &CrawlWindow,
        existing_links: &HashSet<String>,
        max_articles: Option<usize>,
        reference: NaiveDateTime,
    ) -> Vec<(ArticleStub, NaiveDate)> {
        let mut accepted = Vec::new();
        let mut seen_this_run = HashSet::new();
        let mut page = 1;
        debug!(pagination = ?adapter.pagination(), max_pages = adapter.max_pages(), "Starting pagination");

        let reason = loop {
            let url = match adapter.build_listing_url(page, window) {
                Ok(url) => url,
                Err(e) => {
                    warn!(page, error = %e, "Could not build listing URL");
                    break StopReason::FetchFailed;
                }
            };

            let html = match self.fetcher.fetch(url.as_str()).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(page, %url, error = %e, "Listing fetch failed, keeping partial results");
                    break StopReason::FetchFailed;
                }
            };

            let stubs = adapter.extract_stubs(&html);
            debug!(page, stubs = stubs.len(), "Parsed listing page");
            if stubs.is_empty() {
                break StopReason::EmptyPage;
            }

            let mut new_on_page = 0;
            let mut window_exhausted = false;
            for stub in stubs {
                if existing_links.contains(&stub.link) || !seen_this_run.insert(stub.link.clone()) {
                    continue;
                }

                let publication_date = date::normalize(&stub.raw_date, reference);
                if !window.contains(publication_date) {
                    if publication_date < window.start {
                        debug!(link = %stub.link, %publication_date, "Stub older than window");
                        window_exhausted = true;
                        continue;
                    }
                    debug!(link = %stub.link, %publication_date, "Stub dated after window end, keeping");
                }

                accepted.push((stub, publication_date));
                new_on_page += 1;

                if let Some(max) = max_articles {
                    if accepted.len() >= max {
                        accepted.truncate(max);
                        break;
                    }
                }
            }

            if max_articles.is_some_and(|max| accepted.len() >= max) {
                break StopReason::MaxArticles;
            }
            if new_on_page == 0 {
                break StopReason::CaughtUp;
            }
            if window_exhausted {
                break StopReason::WindowExhausted;
            }
            if page >= adapter.max_pages() {
                break StopReason::PageCap;
            }
            page += 1;
        };

        debug!(?reason, pages = page, accepted = accepted.len(), "Pagination stopped");
        accepted
    }

    #[instrument(level = "debug", skip(self, adapter))]
    async fn fetch_body(&self, adapter: &dyn SiteAdapter, link: &str) -> String {
        match self.fetcher.fetch(link).await {
            Ok(html) => adapter.extract_body(&html),
            Err(e) => {
                warn!(error = %e, "Article fetch failed, storing without content");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::adapter::{css, element_text, Pagination};
    use crate::crawl::fetcher::DEFAULT_USER_AGENT;
    use crate::error::Result;
    use mockito::{Mock, Server, ServerGuard};
    use scraper::{Html, Selector};
    use std::time::Duration;
    use url::Url;

    const SOURCE: &str = "Test Wire";

    struct ListAdapter {
        base: Url,
        cap: u32,
        item: Selector,
        body: Selector,
    }

    impl ListAdapter {
        fn new(base: &str, cap: u32) -> Self {
            Self {
                base: Url::parse(&format!("{}/", base)).unwrap(),
                cap,
                item: css("li > a").unwrap(),
                body: css("div.body").unwrap(),
            }
        }
    }

    impl SiteAdapter for ListAdapter {
        fn source_name(&self) -> &str {
            SOURCE
        }

        fn pagination(&self) -> Pagination {
            Pagination::PageNumber
        }

        fn max_pages(&self) -> u32 {
            self.cap
        }

        fn build_listing_url(&self, page: u32, _window: &CrawlWindow) -> Result<Url> {
            Ok(self.base.join(&format!("list/page-{}/", page))?)
        }

        fn extract_stubs(&self, listing_html: &str) -> Vec<ArticleStub> {
            let document = Html::parse_document(listing_html);
            document
                .select(&self.item)
                .filter_map(|a| {
                    let link = self.base.join(a.value().attr("href")?).ok()?.to_string();
                    let date = a.value().attr("data-date").unwrap_or_default();
                    Some(ArticleStub::new(element_text(a), link, date))
                })
                .collect()
        }

        fn extract_body(&self, article_html: &str) -> String {
            let document = Html::parse_document(article_html);
            document
                .select(&self.body)
                .next()
                .map(element_text)
                .unwrap_or_default()
        }
    }

    fn listing(items: &[(&str, &str)]) -> String {
        let items: String = items
            .iter()
            .map(|(id, date)| format!(r#"<li><a href="/article/{id}" data-date="{date}">Story {id}</a></li>"#))
            .collect();
        format!("<html><body><ul>{items}</ul></body></html>")
    }

    async fn listing_mock(server: &mut ServerGuard, page: u32, body: String, hits: usize) -> Mock {
        server
            .mock("GET", format!("/list/page-{}/", page).as_str())
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    async fn article_mock(server: &mut ServerGuard, id: &str, hits: usize) -> Mock {
        server
            .mock("GET", format!("/article/{}", id).as_str())
            .with_status(200)
            .with_body(format!(r#"<div class="body">Text of {id}</div>"#))
            .expect(hits)
            .create_async()
            .await
    }

    fn engine() -> CrawlEngine {
        let fetcher =
            PageFetcher::new(Duration::from_secs(5), Duration::from_secs(5), DEFAULT_USER_AGENT)
                .unwrap();
        let reference = NaiveDate::from_ymd_opt(2025, 5, 12)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        CrawlEngine::new(fetcher).with_reference_time(reference)
    }

    fn engine_with_timeout(timeout: Duration) -> CrawlEngine {
        let fetcher = PageFetcher::new(timeout, timeout, DEFAULT_USER_AGENT).unwrap();
        let reference = NaiveDate::from_ymd_opt(2025, 5, 12)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        CrawlEngine::new(fetcher).with_reference_time(reference)
    }

    /// Address of a port nothing listens on.
    fn refused_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    /// Accepts connections and never answers.
    async fn silent_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{}", addr)
    }

    /// One story linked to `host`, one served by the mock itself.
    fn listing_with_foreign_link(host: &str) -> String {
        format!(
            r#"<html><body><ul>
<li><a href="{host}/article/gone" data-date="10.05.2025">Story gone</a></li>
<li><a href="/article/b" data-date="11.05.2025">Story b</a></li>
</ul></body></html>"#
        )
    }

    fn window() -> CrawlWindow {
        CrawlWindow::new(
            NaiveDate::from_ymd_opt(2025, 5, 3).unwrap(),
            NaiveDate::from_ymd_opt(2025, 5, 12).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_three_new_stubs_are_returned_with_bodies() {
        let mut server = Server::new_async().await;
        let page1 = listing_mock(
            &mut server,
            1,
            listing(&[("a", "10.05.2025"), ("b", "Вчера, 10:00"), ("c", "14:30")]),
            1,
        )
        .await;
        let page2 = listing_mock(&mut server, 2, listing(&[]), 1).await;
        let bodies = [
            article_mock(&mut server, "a", 1).await,
            article_mock(&mut server, "b", 1).await,
            article_mock(&mut server, "c", 1).await,
        ];

        let adapter = ListAdapter::new(&server.url(), 10);
        let articles = engine()
            .run(&adapter, 5, &window(), &HashSet::new(), Some(10))
            .await;

        assert_eq!(articles.len(), 3);
        for article in &articles {
            assert!(!article.link.is_empty());
            assert_eq!(article.source, SOURCE);
            assert_eq!(article.topic_id, 5);
        }
        assert_eq!(articles[0].content, "Text of a");
        assert_eq!(articles[0].publication_date, NaiveDate::from_ymd_opt(2025, 5, 10).unwrap());
        assert_eq!(articles[1].publication_date, NaiveDate::from_ymd_opt(2025, 5, 11).unwrap());
        assert_eq!(articles[2].publication_date, NaiveDate::from_ymd_opt(2025, 5, 12).unwrap());

        page1.assert_async().await;
        page2.assert_async().await;
        for body in bodies {
            body.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_known_page_stops_before_page_two() {
        let mut server = Server::new_async().await;
        let page1 = listing_mock(&mut server, 1, listing(&[("a", ""), ("b", "")]), 1).await;
        let page2 = listing_mock(&mut server, 2, listing(&[("c", "")]), 0).await;

        let adapter = ListAdapter::new(&server.url(), 10);
        let existing: HashSet<String> = ["a", "b"]
            .iter()
            .map(|id| format!("{}/article/{}", server.url(), id))
            .collect();

        let articles = engine().run(&adapter, 1, &window(), &existing, None).await;

        assert!(articles.is_empty());
        page1.assert_async().await;
        page2.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_body_fetch_keeps_article() {
        let mut server = Server::new_async().await;
        let _page1 = listing_mock(&mut server, 1, listing(&[("a", ""), ("b", ""), ("c", "")]), 1).await;
        let _page2 = listing_mock(&mut server, 2, listing(&[]), 1).await;
        let _a = article_mock(&mut server, "a", 1).await;
        let _b = server
            .mock("GET", "/article/b")
            .with_status(503)
            .create_async()
            .await;
        let _c = article_mock(&mut server, "c", 1).await;

        let adapter = ListAdapter::new(&server.url(), 10);
        let articles = engine().run(&adapter, 1, &window(), &HashSet::new(), None).await;

        assert_eq!(articles.len(), 3);
        assert_eq!(articles[0].content, "Text of a");
        assert_eq!(articles[1].content, "");
        assert_eq!(articles[2].content, "Text of c");
    }

    #[tokio::test]
    async fn test_listing_failure_returns_partial_results() {
        let mut server = Server::new_async().await;
        let _page1 = listing_mock(&mut server, 1, listing(&[("a", "")]), 1).await;
        let _page2 = server
            .mock("GET", "/list/page-2/")
            .with_status(500)
            .create_async()
            .await;
        let _a = article_mock(&mut server, "a", 1).await;

        let adapter = ListAdapter::new(&server.url(), 10);
        let articles = engine().run(&adapter, 1, &window(), &HashSet::new(), None).await;

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].content, "Text of a");
    }

    #[tokio::test]
    async fn test_max_articles_truncates_and_stops() {
        let mut server = Server::new_async().await;
        let _page1 = listing_mock(&mut server, 1, listing(&[("a", ""), ("b", ""), ("c", "")]), 1).await;
        let page2 = listing_mock(&mut server, 2, listing(&[("d", "")]), 0).await;
        let _a = article_mock(&mut server, "a", 1).await;
        let _b = article_mock(&mut server, "b", 1).await;
        let c = article_mock(&mut server, "c", 0).await;

        let adapter = ListAdapter::new(&server.url(), 10);
        let articles = engine().run(&adapter, 1, &window(), &HashSet::new(), Some(2)).await;

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[1].title, "Story b");
        page2.assert_async().await;
        c.assert_async().await;
    }

    #[tokio::test]
    async fn test_duplicates_across_pages_are_collapsed() {
        let mut server = Server::new_async().await;
        let _page1 = listing_mock(&mut server, 1, listing(&[("a", ""), ("b", "")]), 1).await;
        let _page2 = listing_mock(&mut server, 2, listing(&[("b", ""), ("c", "")]), 1).await;
        let _page3 = listing_mock(&mut server, 3, listing(&[("c", "")]), 1).await;
        let page4 = listing_mock(&mut server, 4, listing(&[("d", "")]), 0).await;
        let mut bodies = Vec::new();
        for id in ["a", "b", "c"] {
            bodies.push(article_mock(&mut server, id, 1).await);
        }

        let adapter = ListAdapter::new(&server.url(), 10);
        let articles = engine().run(&adapter, 1, &window(), &HashSet::new(), None).await;

        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["Story a", "Story b", "Story c"]);
        page4.assert_async().await;
        for body in bodies {
            body.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_page_cap_limits_depth() {
        let mut server = Server::new_async().await;
        let _page1 = listing_mock(&mut server, 1, listing(&[("a", "")]), 1).await;
        let page2 = listing_mock(&mut server, 2, listing(&[("b", "")]), 0).await;
        let _a = article_mock(&mut server, "a", 1).await;

        let adapter = ListAdapter::new(&server.url(), 1);
        let articles = engine().run(&adapter, 1, &window(), &HashSet::new(), None).await;

        assert_eq!(articles.len(), 1);
        page2.assert_async().await;
    }

    #[tokio::test]
    async fn test_stubs_older_than_window_start_end_pagination() {
        let mut server = Server::new_async().await;
        let _page1 = listing_mock(
            &mut server,
            1,
            listing(&[("a", "11.05.2025"), ("old", "20.04.2025")]),
            1,
        )
        .await;
        let page2 = listing_mock(&mut server, 2, listing(&[("b", "01.04.2025")]), 0).await;
        let _a = article_mock(&mut server, "a", 1).await;
        let old = article_mock(&mut server, "old", 0).await;

        let adapter = ListAdapter::new(&server.url(), 10);
        let articles = engine().run(&adapter, 1, &window(), &HashSet::new(), None).await;

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Story a");
        page2.assert_async().await;
        old.assert_async().await;
    }

    #[tokio::test]
    async fn test_rerun_with_stored_links_is_empty() {
        let mut server = Server::new_async().await;
        let _page1 = listing_mock(&mut server, 1, listing(&[("a", ""), ("b", "")]), 2).await;
        let _page2 = listing_mock(&mut server, 2, listing(&[]), 1).await;
        let _a = article_mock(&mut server, "a", 1).await;
        let _b = article_mock(&mut server, "b", 1).await;

        let adapter = ListAdapter::new(&server.url(), 10);
        let engine = engine();
        let first = engine.run(&adapter, 1, &window(), &HashSet::new(), None).await;
        assert_eq!(first.len(), 2);

        let stored: HashSet<String> = first.into_iter().map(|a| a.link).collect();
        let second = engine.run(&adapter, 1, &window(), &stored, None).await;
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_refused_listing_returns_nothing() {
        let adapter = ListAdapter::new(&refused_url(), 10);
        let articles = engine()
            .run(&adapter, 1, &window(), &HashSet::new(), None)
            .await;
        assert!(articles.is_empty());
    }

    #[tokio::test]
    async fn test_refused_body_keeps_article_without_content() {
        let mut server = Server::new_async().await;
        let dead = refused_url();
        let _page1 = listing_mock(&mut server, 1, listing_with_foreign_link(&dead), 1).await;
        let _page2 = listing_mock(&mut server, 2, listing(&[]), 1).await;
        let body = article_mock(&mut server, "b", 1).await;

        let adapter = ListAdapter::new(&server.url(), 10);
        let articles = engine()
            .run(&adapter, 1, &window(), &HashSet::new(), None)
            .await;

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].link, format!("{}/article/gone", dead));
        assert_eq!(articles[0].content, "");
        assert_eq!(articles[1].content, "Text of b");
        body.assert_async().await;
    }

    #[tokio::test]
    async fn test_listing_timeout_returns_nothing() {
        let adapter = ListAdapter::new(&silent_url().await, 10);
        let articles = engine_with_timeout(Duration::from_millis(300))
            .run(&adapter, 1, &window(), &HashSet::new(), None)
            .await;
        assert!(articles.is_empty());
    }

    #[tokio::test]
    async fn test_body_timeout_keeps_article_without_content() {
        let mut server = Server::new_async().await;
        let silent = silent_url().await;
        let _page1 = listing_mock(&mut server, 1, listing_with_foreign_link(&silent), 1).await;
        let _page2 = listing_mock(&mut server, 2, listing(&[]), 1).await;
        let _body = article_mock(&mut server, "b", 1).await;

        let adapter = ListAdapter::new(&server.url(), 10);
        let articles = engine_with_timeout(Duration::from_millis(300))
            .run(&adapter, 1, &window(), &HashSet::new(), None)
            .await;

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].content, "");
        assert_eq!(articles[1].content, "Text of b");
    }
}
