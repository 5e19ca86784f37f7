//! Filters and sort orders for summary and contact listings.

use crate::{ActivityKind, AggregateSummary, CallType};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

/// Options that change how summaries are computed from the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateQuery {
    /// Only count messages whose raw address contains a digit.
    /// Drops alphanumeric sender ids such as carrier or bank short names.
    #[serde(default)]
    pub numbers_only_messages: bool,
}

/// Which activity a summary must have to be listed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFilter {
    #[default]
    All,
    /// At least one call.
    Calls,
    /// Most recent activity is a message.
    MessagesOnly,
}

/// Contact-saved status filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactFilter {
    #[default]
    Any,
    Saved,
    Unsaved,
}

/// Post-filter over a summary snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateFilter {
    #[serde(default)]
    pub content: ContentFilter,
    /// Match the most recent call type.
    #[serde(default)]
    pub call_type: Option<CallType>,
    #[serde(default)]
    pub contact: ContactFilter,
    /// Keep rows whose most recent activity falls on this UTC day.
    #[serde(default)]
    pub day: Option<NaiveDate>,
}

impl AggregateFilter {
    pub fn is_empty(&self) -> bool {
        *self == AggregateFilter::default()
    }

    pub fn matches(&self, summary: &AggregateSummary) -> bool {
        let content = match self.content {
            ContentFilter::All => true,
            ContentFilter::Calls => summary.call_count > 0,
            ContentFilter::MessagesOnly => {
                summary.message_count > 0 && summary.most_recent_kind == ActivityKind::Message
            }
        };

        let call_type = match self.call_type {
            Some(wanted) => summary.most_recent_call_type == Some(wanted),
            None => true,
        };

        let contact = match self.contact {
            ContactFilter::Any => true,
            ContactFilter::Saved => summary.contact_saved,
            ContactFilter::Unsaved => !summary.contact_saved,
        };

        let day = match self.day {
            Some(day) => DateTime::from_timestamp_millis(summary.most_recent_timestamp)
                .map(|dt| dt.date_naive() == day)
                .unwrap_or(false),
            None => true,
        };

        content && call_type && contact && day
    }

    /// Filter a snapshot, preserving its order.
    pub fn apply(&self, summaries: &[AggregateSummary]) -> Vec<AggregateSummary> {
        summaries.iter().filter(|s| self.matches(s)).cloned().collect()
    }
}

/// Sort order for the contact list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSort {
    #[default]
    NameAsc,
    NameDesc,
    LastUpdated,
    MostContacted,
}
