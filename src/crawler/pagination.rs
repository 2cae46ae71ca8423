//! Pagination over one (date, category) archive
//!
//! A [`PaginationController`] walks archive pages of a single target until it
//! is exhausted or fails, dispatching every newly seen item link as an
//! independent extraction task. Parsed documents are never held across an
//! `.await`.

use super::coordinator::CrawlEvent;
use super::governor::{FetchFailure, Governor};
use crate::config::Config;
use crate::extract::{Extractor, PageQuery, Selector, SkipReason};
use crate::query::{CategoryId, CrawlTarget};
use crate::state::PaginationState;
use crate::url::{normalize_url, resolve_link};
use crate::ConfigResult;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::{form_urlencoded, Url};

/// Link candidates and continuation signal of one archive page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchivePage {
    /// Normalized item URLs in document order, deduplicated within the page
    pub links: Vec<String>,
    pub has_next: bool,
}

/// How a target's pagination ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    /// No further pages: empty page, no next signal, or page ceiling reached
    Exhausted { pages: u32, links: usize },
    /// An archive page, or an item page linked from it, could not be fetched
    Failed { page: u32, reason: String },
    /// The run was cancelled before the target finished
    Cancelled,
}

/// How one dispatched item ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemOutcome {
    /// A record or an extraction skip reached the result loop
    Delivered,
    /// Fetching the item failed for good; the target must not count as complete
    FetchFailed { page: u32, reason: String },
    /// Cancelled before its result was delivered
    Abandoned,
}

/// How archive pages are addressed and read
#[derive(Debug, Clone)]
pub struct ArchiveSpec {
    pub url_template: String,
    pub link_selectors: Vec<String>,
    pub next_page_selector: Option<String>,
    pub link_pattern: Option<Regex>,
    pub max_pages: u32,
}

impl ArchiveSpec {
    pub fn from_config(config: &Config) -> ConfigResult<Self> {
        Ok(Self {
            url_template: config.archive.url_template.clone(),
            link_selectors: config.archive.link_selectors.clone(),
            next_page_selector: config.archive.next_page_selector.clone(),
            link_pattern: config.link_pattern()?,
            max_pages: config.crawl.max_pages_per_target.max(1),
        })
    }

    /// Substitutes the target into the URL template
    ///
    /// The category id is percent-encoded so it stays a single path segment
    /// or query value.
    ///
    /// # Example
    ///
    /// `https://news.example/archive?date={date}&cat={category}&page={page}`
    /// becomes `https://news.example/archive?date=1403/07/13&cat=2&page=1`.
    pub fn archive_url(&self, target: &CrawlTarget) -> String {
        self.url_template
            .replace("{year}", &format!("{:04}", target.date.year()))
            .replace("{month}", &format!("{:02}", target.date.month()))
            .replace("{day}", &format!("{:02}", target.date.day()))
            .replace("{date}", &target.date.to_string())
            .replace("{category}", &encode_component(target.category.as_str()))
            .replace("{page}", &target.page.to_string())
    }

    /// Reads item links and the next-page signal from a parsed archive page
    ///
    /// # Arguments
    ///
    /// * `page` - The parsed archive page
    /// * `base` - URL the page was served from, for relative links
    pub fn parse_page(&self, page: &dyn PageQuery, base: &Url) -> ArchivePage {
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for expr in &self.link_selectors {
            for href in page.query(expr) {
                if let Some(link) = self.canonical_link(&href, base) {
                    if seen.insert(link.clone()) {
                        links.push(link);
                    }
                }
            }
        }

        let has_next = match &self.next_page_selector {
            Some(expr) => !page.query(expr).is_empty(),
            None => !links.is_empty(),
        };

        ArchivePage { links, has_next }
    }

    fn canonical_link(&self, href: &str, base: &Url) -> Option<String> {
        let absolute = resolve_link(href, base)?;

        let candidate = match &self.link_pattern {
            Some(pattern) => {
                let text = absolute.as_str();
                let end = pattern.find(text)?.end();
                text[..end].to_string()
            }
            None => absolute.to_string(),
        };

        match normalize_url(&candidate) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                tracing::trace!("Dropping link {}: {}", href, e);
                None
            }
        }
    }
}

/// Percent-encodes `value` for use in either a path segment or a query
fn encode_component(value: &str) -> String {
    // form encoding writes spaces as '+', which a path would keep literally
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Everything a pagination or item task needs, shared across a run
pub struct CrawlContext {
    pub governor: Arc<Governor>,
    pub selector: Arc<dyn Selector>,
    pub extractor: Arc<Extractor>,
    pub archive: Arc<ArchiveSpec>,
    pub item_permits: Arc<Semaphore>,
    pub events: mpsc::Sender<CrawlEvent>,
    pub cancel: CancellationToken,
}

/// Drives one target through its archive pages
pub struct PaginationController {
    ctx: Arc<CrawlContext>,
    target: CrawlTarget,
    state: PaginationState,
    seen: HashSet<String>,
    items: JoinSet<ItemOutcome>,
}

impl PaginationController {
    pub fn new(ctx: Arc<CrawlContext>, target: CrawlTarget) -> Self {
        Self {
            ctx,
            target,
            state: PaginationState::Active,
            seen: HashSet::new(),
            items: JoinSet::new(),
        }
    }

    /// Paginates until a terminal state, then waits for every dispatched item
    ///
    /// Item results are delivered on the event channel before this returns,
    /// so the caller may report the target as finished afterwards. A target
    /// whose items were interrupted by cancellation reports `Cancelled` even
    /// if pagination itself had finished; an item whose fetch failed for good
    /// turns an exhausted target into `Failed`.
    pub async fn run(mut self) -> TargetOutcome {
        let outcome = self.paginate().await;

        let mut abandoned = false;
        let mut item_failure = None;
        while let Some(joined) = self.items.join_next().await {
            match joined {
                Ok(ItemOutcome::Delivered) => {}
                Ok(ItemOutcome::Abandoned) => abandoned = true,
                Ok(ItemOutcome::FetchFailed { page, reason }) => {
                    tracing::warn!("{}: {}", self.target, reason);
                    item_failure.get_or_insert((page, reason));
                }
                Err(e) => {
                    tracing::error!("Item task for {} panicked: {}", self.target, e);
                    item_failure.get_or_insert((self.target.page, format!("item task panicked: {}", e)));
                }
            }
        }

        if abandoned {
            return TargetOutcome::Cancelled;
        }

        match (outcome, item_failure) {
            (TargetOutcome::Exhausted { .. }, Some((page, reason))) => {
                self.advance(PaginationState::Failed);
                TargetOutcome::Failed { page, reason }
            }
            (outcome @ TargetOutcome::Exhausted { .. }, None) => {
                self.advance(PaginationState::Exhausted);
                outcome
            }
            (outcome, _) => outcome,
        }
    }

    async fn paginate(&mut self) -> TargetOutcome {
        let mut current = self.target.clone();

        loop {
            if self.ctx.cancel.is_cancelled() {
                return TargetOutcome::Cancelled;
            }

            let url = self.ctx.archive.archive_url(&current);
            tracing::debug!("Fetching archive page {} ({})", current, url);

            let response = match self.ctx.governor.fetch(&url, &self.ctx.cancel).await {
                Ok(response) => response,
                Err(FetchFailure::Cancelled) => return TargetOutcome::Cancelled,
                Err(failure) => {
                    self.advance(PaginationState::Failed);
                    tracing::warn!("Archive page {} failed: {}", current, failure);
                    return TargetOutcome::Failed {
                        page: current.page,
                        reason: failure.to_string(),
                    };
                }
            };

            let page = self.read_archive_page(&response.body, &response.final_url, &url);

            if page.links.is_empty() {
                tracing::debug!("{} has no links, target exhausted", current);
                break;
            }

            let mut fresh = 0usize;
            for link in page.links {
                if self.seen.insert(link.clone()) {
                    fresh += 1;
                    self.dispatch_item(link, current.page);
                }
            }
            tracing::debug!("{}: {} new item links", current, fresh);

            if page.has_next && current.page < self.ctx.archive.max_pages {
                self.advance(PaginationState::Active);
                current = current.next_page();
            } else {
                break;
            }
        }

        TargetOutcome::Exhausted {
            pages: current.page,
            links: self.seen.len(),
        }
    }

    fn read_archive_page(&self, body: &str, final_url: &str, requested: &str) -> ArchivePage {
        let base = match Url::parse(final_url).or_else(|_| Url::parse(requested)) {
            Ok(base) => base,
            Err(e) => {
                tracing::warn!("Archive URL {} is not absolute: {}", requested, e);
                return ArchivePage::default();
            }
        };
        let document = self.ctx.selector.load(body);
        self.ctx.archive.parse_page(document.as_ref(), &base)
    }

    fn dispatch_item(&mut self, url: String, page: u32) {
        let ctx = Arc::clone(&self.ctx);
        let category = self.target.category.clone();
        self.items.spawn(process_item(ctx, url, category, page));
    }

    fn advance(&mut self, to: PaginationState) {
        match self.state.transition(to) {
            Ok(next) => self.state = next,
            Err(e) => tracing::error!("{} for {}", e, self.target),
        }
    }
}

/// Fetches one item page and reports a record or a skip
///
/// `page` is the archive page the link was found on.
async fn process_item(
    ctx: Arc<CrawlContext>,
    url: String,
    category: CategoryId,
    page: u32,
) -> ItemOutcome {
    let permit = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return ItemOutcome::Abandoned,
        permit = ctx.item_permits.acquire() => permit,
    };
    let Ok(_permit) = permit else {
        return ItemOutcome::Abandoned;
    };

    let mut outcome = ItemOutcome::Delivered;
    let result = match ctx.governor.fetch(&url, &ctx.cancel).await {
        Ok(response) => extract_item(&ctx, &response.body, &url, &category),
        Err(FetchFailure::Cancelled) => return ItemOutcome::Abandoned,
        Err(failure) => {
            outcome = ItemOutcome::FetchFailed {
                page,
                reason: format!("item {}: {}", url, failure),
            };
            Err(SkipReason::FetchFailed(failure))
        }
    };

    let event = match result {
        Ok(record) => CrawlEvent::Record(record),
        Err(reason) => {
            tracing::debug!("Skipping {}: {}", url, reason);
            CrawlEvent::Skipped { url, reason }
        }
    };

    if ctx.events.send(event).await.is_err() {
        tracing::debug!("Result loop closed, dropping item result");
        return ItemOutcome::Abandoned;
    }
    outcome
}

fn extract_item(
    ctx: &CrawlContext,
    body: &str,
    url: &str,
    category: &CategoryId,
) -> Result<crate::extract::Record, SkipReason> {
    let document = ctx.selector.load(body);
    ctx.extractor.extract(document.as_ref(), url, category)
}
