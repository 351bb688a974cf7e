//! Rate-limit and buffer-routing categories.

use std::fmt;

/// Classifier used both for ring-buffer routing and rate-limit accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    All,
    Error,
    Transaction,
    Span,
    Monitor,
    Log,
    LogByte,
    ClientReport,
}

impl Category {
    /// Parses the category names used in `X-Sentry-Rate-Limits` groups.
    /// Unknown names return `None` and are ignored by the caller, per §4.7.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "error" => Some(Self::Error),
            "transaction" => Some(Self::Transaction),
            "span" => Some(Self::Span),
            "monitor" => Some(Self::Monitor),
            "log" => Some(Self::Log),
            "log_byte" => Some(Self::LogByte),
            _ => None,
        }
    }

    /// Scheduling priority for categories that own a buffer. Categories
    /// that never own a buffer (`all`, `span`, `log_byte`, `client_report`
    /// are accounting-only) have no priority.
    ///
    /// The distilled spec fixes priority *ordering* but not the
    /// category-to-priority assignment; this crate assigns errors the
    /// highest priority and logs the lowest, matching the relative
    /// urgency implied by each category's default buffer depth in §4.2.
    pub fn priority(self) -> Option<Priority> {
        match self {
            Self::Error => Some(Priority::Critical),
            Self::Transaction => Some(Priority::High),
            Self::Monitor => Some(Priority::Medium),
            Self::Log => Some(Priority::Low),
            Self::All | Self::Span | Self::LogByte | Self::ClientReport => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::All => "all",
            Self::Error => "error",
            Self::Transaction => "transaction",
            Self::Span => "span",
            Self::Monitor => "monitor",
            Self::Log => "log",
            Self::LogByte => "log_byte",
            Self::ClientReport => "client_report",
        };
        f.write_str(s)
    }
}

/// Fixed priority ordering for the weighted round-robin scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Lowest,
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Default scheduler weight: how many cycle slots this priority gets.
    pub fn default_weight(self) -> usize {
        match self {
            Self::Critical => 5,
            Self::High => 4,
            Self::Medium => 3,
            Self::Low => 2,
            Self::Lowest => 1,
        }
    }

    /// All priorities, highest first — the order buffers are considered in
    /// when the scheduler picks the first ready buffer at a given priority.
    pub const ALL: [Priority; 5] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Lowest,
    ];

    /// The one category this priority is assigned to. Since each of the
    /// four buffer-owning categories maps to a distinct priority here,
    /// "scan buffers for the first matching priority" (§4.4) collapses to
    /// a direct lookup — there is never more than one candidate.
    pub fn buffer_category(self) -> Option<Category> {
        match self {
            Self::Critical => Some(Category::Error),
            Self::High => Some(Category::Transaction),
            Self::Medium => Some(Category::Monitor),
            Self::Low => Some(Category::Log),
            Self::Lowest => None,
        }
    }
}
