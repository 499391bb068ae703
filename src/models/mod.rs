mod article;
mod schedule;

pub use article::{Article, ArticleStub, NewArticle};
pub use schedule::{CrawlWindow, RunTrigger, ScheduleConfig, WindowParams};
