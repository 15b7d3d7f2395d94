//! Numbered menus with optional pagination.
//!
//! A [`MenuPager`] owns the options of a menu, the page currently shown and
//! the rules for what counts as a valid selection. Page turns are driven by
//! reactions on the sent message (see [`pagination`]); selections arrive as
//! ordinary text messages and are validated by the prompt's classifier.

pub mod pagination;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::PlatformMessage;
use crate::config::MenuConfig;
use crate::error::{ChannelError, ChannelResult};
use crate::visual::MenuPage;

pub use pagination::{PaginationHandle, spawn_pagination};

/// Placeholder used for options without a description. Some transports
/// refuse blank field bodies.
pub const EMPTY_DESCRIPTION: &str = "\u{200b}";

/// Default number of options per page.
pub const DEFAULT_PAGE_SIZE: usize = 5;

/// Default time window during which page-turn reactions are accepted.
pub const DEFAULT_PAGINATION_TIMEOUT: Duration = Duration::from_secs(90);

/// Called when a page turn fails (failed edit or reaction).
pub type PaginationErrorHandler = Arc<dyn Fn(&ChannelError, &dyn PlatformMessage) + Send + Sync>;

/// A pager shared between the visual, the classifier and the pagination task.
pub type SharedPager = Arc<tokio::sync::Mutex<MenuPager>>;

/// One numbered menu entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOption {
    /// Number the user types to pick this option.
    pub number: i64,
    /// Option name.
    pub label: String,
    /// Text shown under the name.
    pub description: String,
}

impl MenuOption {
    /// Label prefixed with its number, e.g. `"2) Green"`.
    pub fn display_label(&self) -> String {
        format!("{}) {}", self.number, self.label)
    }
}

/// Reaction symbols used to turn pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSymbols {
    /// Symbol for the previous page.
    pub previous: String,
    /// Symbol for the next page.
    pub next: String,
}

impl Default for PageSymbols {
    fn default() -> Self {
        Self {
            previous: "◀".to_string(),
            next: "▶".to_string(),
        }
    }
}

/// Stateful, paginated option list.
#[derive(Clone)]
pub struct MenuPager {
    title: Option<String>,
    description: Option<String>,
    options: Vec<MenuOption>,
    page: usize,
    page_size: usize,
    multi_select: bool,
    pagination_timeout: Duration,
    symbols: PageSymbols,
    error_handler: Option<PaginationErrorHandler>,
}

impl std::fmt::Debug for MenuPager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuPager")
            .field("title", &self.title)
            .field("options", &self.options.len())
            .field("page", &self.page)
            .field("page_size", &self.page_size)
            .field("multi_select", &self.multi_select)
            .field("pagination", &self.error_handler.is_some())
            .finish()
    }
}

impl Default for MenuPager {
    fn default() -> Self {
        Self::new()
    }
}

impl MenuPager {
    /// Empty menu with default settings.
    pub fn new() -> Self {
        Self {
            title: None,
            description: None,
            options: Vec::new(),
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
            multi_select: false,
            pagination_timeout: DEFAULT_PAGINATION_TIMEOUT,
            symbols: PageSymbols::default(),
            error_handler: None,
        }
    }

    /// Empty menu using page size, timeout and symbols from configuration.
    pub fn from_config(config: &MenuConfig) -> Self {
        Self {
            page_size: config.page_size,
            pagination_timeout: Duration::from_secs(config.pagination_timeout_secs),
            symbols: PageSymbols {
                previous: config.previous_symbol.clone(),
                next: config.next_symbol.clone(),
            },
            ..Self::new()
        }
    }

    /// Set the menu title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the text shown above the options.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the number of options per page. Zero disables paging.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Allow comma-separated and ranged selections.
    pub fn with_multi_select(mut self, multi_select: bool) -> Self {
        self.multi_select = multi_select;
        self
    }

    /// How long page-turn reactions are accepted.
    pub fn with_pagination_timeout(mut self, timeout: Duration) -> Self {
        self.pagination_timeout = timeout;
        self
    }

    /// Use custom page-turn symbols.
    pub fn with_symbols(mut self, symbols: PageSymbols) -> Self {
        self.symbols = symbols;
        self
    }

    /// Enable pagination, routing page-turn failures to `handler`.
    pub fn enable_pagination<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ChannelError, &dyn PlatformMessage) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Builder form of [`add_option`](Self::add_option).
    pub fn option(mut self, label: impl Into<String>, description: Option<&str>) -> Self {
        self.add_option(label, description);
        self
    }

    /// Builder form of [`add_numbered_option`](Self::add_numbered_option).
    pub fn numbered_option(
        mut self,
        number: i64,
        label: impl Into<String>,
        description: Option<&str>,
    ) -> Self {
        self.add_numbered_option(number, label, description);
        self
    }

    /// Append an option numbered `count + 1`.
    pub fn add_option(&mut self, label: impl Into<String>, description: Option<&str>) -> &mut Self {
        let number = self.options.len() as i64 + 1;
        self.add_numbered_option(number, label, description)
    }

    /// Append an option with an explicit number.
    pub fn add_numbered_option(
        &mut self,
        number: i64,
        label: impl Into<String>,
        description: Option<&str>,
    ) -> &mut Self {
        let description = match description {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => EMPTY_DESCRIPTION.to_string(),
        };
        self.options.push(MenuOption {
            number,
            label: label.into(),
            description,
        });
        self
    }

    /// Wrap the pager for sharing with a visual.
    pub fn into_shared(self) -> SharedPager {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn options(&self) -> &[MenuOption] {
        &self.options
    }

    pub fn number_of_options(&self) -> usize {
        self.options.len()
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn is_multi_select(&self) -> bool {
        self.multi_select
    }

    pub fn pagination_timeout(&self) -> Duration {
        self.pagination_timeout
    }

    pub fn symbols(&self) -> &PageSymbols {
        &self.symbols
    }

    /// Number of pages, at least one.
    pub fn page_count(&self) -> usize {
        if self.page_size == 0 || self.options.is_empty() {
            return 1;
        }
        self.options.len().div_ceil(self.page_size)
    }

    /// Whether `number` identifies an option of this menu.
    pub fn is_valid_option(&self, number: i64) -> bool {
        number > 0 && number <= self.number_of_options() as i64
    }

    /// Whether a message body correctly identifies one (or, for multi-select
    /// menus, several) options.
    pub fn is_valid_selection(&self, content: &str) -> bool {
        self.parse_selection(content).is_some()
    }

    /// Option numbers selected by `content`, or `None` if the selection is
    /// malformed or names an option that does not exist.
    ///
    /// Multi-select menus accept comma-separated tokens, each either a number
    /// or an inclusive `start-end` range: `"1, 3-5"` selects `{1, 3, 4, 5}`.
    pub fn parse_selection(&self, content: &str) -> Option<BTreeSet<i64>> {
        if !self.multi_select {
            let number = content.trim().parse::<i64>().ok()?;
            return self.is_valid_option(number).then(|| BTreeSet::from([number]));
        }

        let mut selected = BTreeSet::new();
        for token in content.split(',') {
            let (start, end) = parse_token(token)?;
            if !self.is_valid_option(start) || !self.is_valid_option(end) {
                return None;
            }
            selected.extend(start..=end);
        }
        (!selected.is_empty()).then_some(selected)
    }

    pub fn is_on_first_page(&self) -> bool {
        self.page == 0
    }

    pub fn is_on_last_page(&self) -> bool {
        self.page_size == 0 || self.page_size * (self.page + 1) >= self.number_of_options()
    }

    /// Move to the next page and edit `target` to show it. No-op on the
    /// last page.
    pub async fn next_page(&mut self, target: &dyn PlatformMessage) -> ChannelResult<&mut Self> {
        if let Some(view) = self.step_forward() {
            target.edit(view.into_outgoing()).await?;
        }
        Ok(self)
    }

    /// Move to the previous page and edit `target` to show it. No-op on the
    /// first page.
    pub async fn prev_page(&mut self, target: &dyn PlatformMessage) -> ChannelResult<&mut Self> {
        if let Some(view) = self.step_back() {
            target.edit(view.into_outgoing()).await?;
        }
        Ok(self)
    }

    /// Advance one page without touching any message. Returns the page to
    /// show, or `None` on the last page.
    pub fn step_forward(&mut self) -> Option<MenuPage> {
        if self.is_on_last_page() {
            return None;
        }
        self.page += 1;
        Some(self.page_view(self.page))
    }

    /// Go back one page without touching any message. Returns the page to
    /// show, or `None` on the first page.
    pub fn step_back(&mut self) -> Option<MenuPage> {
        if self.is_on_first_page() {
            return None;
        }
        self.page -= 1;
        Some(self.page_view(self.page))
    }

    pub fn reset_page(&mut self) {
        self.page = 0;
    }

    /// Edit `target` to show the current page.
    pub async fn set_message(&self, target: &dyn PlatformMessage) -> ChannelResult<()> {
        target.edit(self.page_view(self.page).into_outgoing()).await
    }

    /// Options shown on `page`. All options when paging is disabled.
    pub fn options_of_page(&self, page: usize) -> &[MenuOption] {
        if self.page_size == 0 {
            return &self.options;
        }
        let start = page.saturating_mul(self.page_size).min(self.options.len());
        let end = start.saturating_add(self.page_size).min(self.options.len());
        &self.options[start..end]
    }

    /// Rendered snapshot of `page`.
    pub fn page_view(&self, page: usize) -> MenuPage {
        MenuPage {
            title: self.title.clone(),
            description: self.description.clone(),
            page,
            page_count: self.page_count(),
            multi_select: self.multi_select,
            options: self.options_of_page(page).to_vec(),
        }
    }

    pub fn spans_multiple_pages(&self) -> bool {
        self.page_size > 0 && self.number_of_options() > self.page_size
    }

    /// Whether the menu spans several pages and pagination was enabled.
    pub fn can_paginate(&self) -> bool {
        self.spans_multiple_pages() && self.error_handler.is_some()
    }

    /// Hand a page-turn failure to the registered handler.
    pub fn report_pagination_error(&self, error: &ChannelError, message: &dyn PlatformMessage) {
        match &self.error_handler {
            Some(handler) => handler(error, message),
            None => tracing::warn!("Unhandled pagination error on {}: {}", message.id(), error),
        }
    }
}

/// Parse `"n"` or `"start-end"` into an inclusive range.
fn parse_token(token: &str) -> Option<(i64, i64)> {
    let token = token.trim();
    match token.split_once('-') {
        Some((start, end)) => {
            let start = start.trim().parse::<i64>().ok()?;
            let end = end.trim().parse::<i64>().ok()?;
            (start <= end).then_some((start, end))
        }
        None => {
            let number = token.parse::<i64>().ok()?;
            Some((number, number))
        }
    }
}
