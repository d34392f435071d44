/// Crawl request lifecycle
///
/// Each state is persisted on the request row so an interrupted crawl knows
/// where to pick up.
use std::fmt;

/// Represents the progress of one crawl request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlState {
    // ===== Active States =====
    /// Request row persisted, first page not yet fetched
    Created,

    /// First page fetched, pagination metadata and its stubs recorded
    Fetched,

    /// Page requests for pages 2..N persisted
    Expanded,

    /// Page requests are being fetched
    Paging,

    /// Every page request has a terminal status
    PagesDone,

    /// Job detail pages are being fetched
    Backfilling,

    // ===== Terminal States =====
    /// No page request and no owned job remains unprocessed
    Done,

    /// First page was empty or could not be fetched
    Failed,
}

impl CrawlState {
    /// Returns true if no further processing will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if `next` is a legal successor of this state
    ///
    /// Re-entering the current state is always allowed so resumed work can
    /// record the same step twice.
    pub fn can_transition_to(&self, next: CrawlState) -> bool {
        if *self == next {
            return true;
        }

        matches!(
            (self, next),
            (Self::Created, Self::Fetched)
                | (Self::Created, Self::Failed)
                | (Self::Fetched, Self::Expanded)
                | (Self::Fetched, Self::PagesDone)
                | (Self::Expanded, Self::Paging)
                | (Self::Paging, Self::PagesDone)
                | (Self::PagesDone, Self::Backfilling)
                | (Self::Backfilling, Self::Done)
                | (Self::Done, Self::Backfilling)
        )
    }

    /// Converts the state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Fetched => "fetched",
            Self::Expanded => "expanded",
            Self::Paging => "paging",
            Self::PagesDone => "pages_done",
            Self::Backfilling => "backfilling",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parses a state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "fetched" => Some(Self::Fetched),
            "expanded" => Some(Self::Expanded),
            "paging" => Some(Self::Paging),
            "pages_done" => Some(Self::PagesDone),
            "backfilling" => Some(Self::Backfilling),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Created,
            Self::Fetched,
            Self::Expanded,
            Self::Paging,
            Self::PagesDone,
            Self::Backfilling,
            Self::Done,
            Self::Failed,
        ]
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
