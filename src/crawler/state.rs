/// Crawl session state definitions
///
/// A crawl session walks `Idle → Fetching → Parsing → Extracting → Paginating`
/// and then either fetches the next page or finishes.
use std::fmt;

/// Represents the current state of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlState {
    /// Session created, nothing fetched yet
    Idle,

    /// Requesting the current page
    Fetching,

    /// Turning the fetched text into a document
    Parsing,

    /// Running the source plugin over the document
    Extracting,

    /// Looking for the next page
    Paginating,

    // ===== Terminal States =====
    /// Loop ended normally (no next page, page limit, or a failed fetch)
    Done,

    /// Loop stopped by a session error
    Failed,
}

impl CrawlState {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the session may move from this state to `next`
    pub fn can_transition_to(&self, next: CrawlState) -> bool {
        use CrawlState::*;

        if self.is_terminal() {
            return false;
        }

        match (self, next) {
            (_, Failed) => true,
            (Idle, Fetching) => true,
            (Fetching, Parsing) => true,
            // A fetch that exhausts its retries ends the loop early
            (Fetching, Done) => true,
            (Parsing, Extracting) => true,
            (Extracting, Paginating) => true,
            (Paginating, Fetching) => true,
            (Paginating, Done) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Extracting => "extracting",
            Self::Paginating => "paginating",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
