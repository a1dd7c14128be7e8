//! # Record extraction
//!
//! Turns one raw history page into typed records. The remote markup is not
//! documented and differs between layouts, so every signal is read through
//! small independent heuristics:
//!
//! - `balance`: ordered strategies for the point balance, first hit wins.
//! - `tables`: header-keyword classification of `<table>` regions into the
//!   charge list and the gift list.
//! - `blocks`: a text-pattern pass over gift/balloon blocks for layouts that
//!   do not use tables.
//!
//! Extraction never fails. Rows that do not yield numbers are decorative and
//! are dropped without a report.

mod balance;
mod blocks;
mod tables;

use crate::domain::models::{Balance, ChargeRecord, GiftRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedPage {
    /// `None` when no balance strategy matched.
    pub balance: Option<Balance>,
    pub charge_records: Vec<ChargeRecord>,
    pub gift_records: Vec<GiftRecord>,
}

/// Parsed view of a page shared by the extraction strategies.
pub(crate) struct PageView<'a> {
    pub raw: &'a str,
    pub doc: &'a Html,
    pub text: &'a str,
}

pub fn extract(raw: &str) -> ExtractedPage {
    let doc = Html::parse_document(raw);
    let text = collapse(doc.root_element().text());
    let view = PageView {
        raw,
        doc: &doc,
        text: &text,
    };

    let balance = balance::extract_balance(&view);
    let (charge_records, mut gift_records) = tables::extract_tables(&doc);
    let recovered = blocks::extract_blocks(&doc, &mut gift_records);
    tracing::debug!(
        charges = charge_records.len(),
        gifts = gift_records.len(),
        recovered,
        has_balance = balance.is_some(),
        "extracted page"
    );

    ExtractedPage {
        balance,
        charge_records,
        gift_records,
    }
}

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("invalid digits regex"));

static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})[-./](\d{1,2})[-./](\d{1,2})(?:\s*(\d{1,2}):(\d{2})(?::(\d{2}))?)?")
        .expect("invalid date regex")
});

/// Lenient count: thousands separators removed, first digit run parsed.
pub(crate) fn parse_count(raw: &str) -> Option<u64> {
    let cleaned = raw.replace(',', "");
    DIGITS.find(&cleaned)?.as_str().parse().ok()
}

/// Zero-padded `YYYY-MM-DD[ HH:MM:SS]`, so dates order lexicographically.
pub(crate) fn normalize_date(raw: &str) -> Option<String> {
    let caps = DATE.captures(raw)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let (year, month, day) = (num(1)?, num(2)?, num(3)?);
    let mut out = format!("{year:04}-{month:02}-{day:02}");
    if let (Some(h), Some(m)) = (num(4), num(5)) {
        out.push_str(&format!(" {:02}:{:02}:{:02}", h, m, num(6).unwrap_or(0)));
    }
    Some(out)
}

pub(crate) fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_count_strips_separators_and_units() {
        assert_eq!(parse_count("1,234개"), Some(1234));
        assert_eq!(parse_count(" 5,000 원 (VAT 500)"), Some(5000));
        assert_eq!(parse_count("-"), None);
    }

    #[test]
    fn normalize_date_pads_and_fills_seconds() {
        assert_eq!(normalize_date("2024.6.1").as_deref(), Some("2024-06-01"));
        assert_eq!(
            normalize_date("2024-06-01 9:05").as_deref(),
            Some("2024-06-01 09:05:00")
        );
        assert_eq!(
            normalize_date("구매 2023/12/31 23:59:58").as_deref(),
            Some("2023-12-31 23:59:58")
        );
        assert_eq!(normalize_date("합계"), None);
    }

    #[test]
    fn extract_full_page() {
        let html = r#"
            <html><body>
              <div class="my_item_info"><span>보유 별풍선</span> <em>1,250</em></div>
              <table>
                <tr><th>구매일</th><th>충전 개수</th><th>결제수단</th><th>결제금액</th></tr>
                <tr><td>2024-06-01</td><td>500개</td><td>card</td><td>55,000원</td></tr>
              </table>
              <table>
                <tr><th>선물일시</th><th>스트리머</th><th>선물 개수</th><th>횟수</th></tr>
                <tr><td>2024-06-02 10:00:00</td><td>maru</td><td>100개</td><td>1</td></tr>
              </table>
            </body></html>
        "#;
        let page = extract(html);
        assert_eq!(page.balance.map(|b| b.current), Some(1250));
        assert_eq!(page.charge_records.len(), 1);
        assert_eq!(page.charge_records[0].price, 55000);
        assert_eq!(page.gift_records.len(), 1);
        assert_eq!(page.gift_records[0].streamer_nick, "maru");
    }

    #[test]
    fn empty_payload_yields_nothing() {
        assert_eq!(extract(""), ExtractedPage::default());
    }
}
