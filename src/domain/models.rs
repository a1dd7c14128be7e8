use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// Point balance of the remote account at fetch time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub current: u64,
    pub used: u64,
    pub expired: u64,
}

// One purchase ("incoming") event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRecord {
    pub id: String, // display only, not part of the dedup key
    pub date: String,
    pub amount: u64,
    pub method: String,
    pub price: u64,
}

// One outgoing donation event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftRecord {
    pub id: String,
    pub date: String,
    pub amount: u64,
    pub streamer_nick: String,
    pub count: u32,
}

// Cash-out event; the remote source may never populate this category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub date: String,
    pub amount: u64,
}

pub type ChargeKey = (String, u64);
pub type GiftKey = (String, String, u64);

impl ChargeRecord {
    pub fn dedup_key(&self) -> ChargeKey {
        (self.date.clone(), self.amount)
    }
}

impl GiftRecord {
    pub fn dedup_key(&self) -> GiftKey {
        (self.date.clone(), self.streamer_nick.clone(), self.amount)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamerTotal {
    pub amount: u64,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthBucket {
    pub gifted: u64,
    pub charged: u64,
    pub exchanged: u64,
    pub streamers: BTreeSet<String>,
}

// Derived rollups; always rebuilt from the three history sequences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_gifted: u64,
    pub total_charged: u64,
    pub total_exchanged: u64,
    pub by_streamer: BTreeMap<String, StreamerTotal>,
    pub by_month: BTreeMap<String, MonthBucket>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySnapshot {
    pub balance: Balance,
    pub charge_history: Vec<ChargeRecord>,
    pub gift_history: Vec<GiftRecord>,
    pub exchange_history: Vec<ExchangeRecord>,
    pub summary: Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub auto_sync: bool,
    pub full_sync_on_first_run: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_sync: true,
            full_sync_on_first_run: false,
        }
    }
}

// Payload stored under the history cache key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedState {
    pub last_sync: Option<i64>, // epoch millis
    pub is_logged_in: Option<bool>,
    pub data: Option<HistorySnapshot>,
    #[serde(default)]
    pub settings: Settings,
}

// Transient progress of a full sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub is_full_sync: bool,
    pub current_step: String,
    pub total_steps: u32,
    pub completed_steps: u32,
    pub gift_pages: u32,
    pub total_gift_pages: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncPhase {
    #[default]
    Idle,
    FetchingBase,
    RecentWindow,
    FullSync,
    Aggregating,
    Complete,
    LoginRequired,
    Failed,
}

// Calendar month used as a fetch coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self::new(date.year(), date.month())
    }

    pub fn prev(self) -> Self {
        if self.month <= 1 {
            Self::new(self.year - 1, 12)
        } else {
            Self::new(self.year, self.month - 1)
        }
    }

    /// Walks back `n` months from `self`, newest first, excluding `self`.
    pub fn trailing(self, n: u32) -> Vec<YearMonth> {
        let mut out = Vec::with_capacity(n as usize);
        let mut cur = self;
        for _ in 0..n {
            cur = cur.prev();
            out.push(cur);
        }
        out
    }

    /// Every month strictly before `self` down to January of `epoch_year`.
    pub fn back_to_epoch(self, epoch_year: i32) -> Vec<YearMonth> {
        let mut out = Vec::new();
        let mut cur = self.prev();
        while cur.year >= epoch_year {
            out.push(cur);
            cur = cur.prev();
        }
        out
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prev_wraps_year() {
        assert_eq!(YearMonth::new(2024, 1).prev(), YearMonth::new(2023, 12));
        assert_eq!(YearMonth::new(2024, 6).prev(), YearMonth::new(2024, 5));
    }

    #[test]
    fn trailing_is_descending_and_excludes_start() {
        let months = YearMonth::new(2024, 2).trailing(3);
        assert_eq!(
            months,
            vec![
                YearMonth::new(2024, 1),
                YearMonth::new(2023, 12),
                YearMonth::new(2023, 11)
            ]
        );
    }

    #[test]
    fn back_to_epoch_stops_at_january() {
        let months = YearMonth::new(2024, 3).back_to_epoch(2023);
        assert_eq!(months.len(), 14);
        assert_eq!(months.first(), Some(&YearMonth::new(2024, 2)));
        assert_eq!(months.last(), Some(&YearMonth::new(2023, 1)));
    }

    #[test]
    fn display_is_zero_padded() {
        assert_eq!(YearMonth::new(2023, 3).to_string(), "2023-03");
    }
}
