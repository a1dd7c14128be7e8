use super::{collapse, normalize_date, parse_count};
use crate::domain::models::GiftRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

static GIFT_BLOCK: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[class*="gift"], [class*="balloon"]"#).expect("invalid gift block selector")
});

// "<amount>개 <nick> <date>"
static GIFT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<amount>\d[\d,]*)\s*개\s+(?P<nick>\S+)\s+(?P<date>\d{4}[-./]\d{1,2}[-./]\d{1,2}(?:\s+\d{1,2}:\d{2}(?::\d{2})?)?)",
    )
    .expect("invalid gift line regex")
});

/// Recovers gifts from non-table layouts. Returns how many were added.
pub(crate) fn extract_blocks(doc: &Html, gifts: &mut Vec<GiftRecord>) -> usize {
    let mut added = 0;
    for (b_idx, block) in doc.select(&GIFT_BLOCK).enumerate() {
        let text = collapse(block.text());
        for (m_idx, caps) in GIFT_LINE.captures_iter(&text).enumerate() {
            let Some(amount) = parse_count(&caps["amount"]).filter(|a| *a > 0) else {
                continue;
            };
            let Some(date) = normalize_date(&caps["date"]) else {
                continue;
            };
            let nick = caps["nick"].to_string();
            if already_represented(gifts, &nick, &date) {
                continue;
            }
            gifts.push(GiftRecord {
                id: format!("block-{b_idx}-{m_idx}"),
                date,
                amount,
                streamer_nick: nick,
                count: 1,
            });
            added += 1;
        }
    }
    added
}

fn already_represented(gifts: &[GiftRecord], nick: &str, date: &str) -> bool {
    gifts
        .iter()
        .any(|g| g.streamer_nick == nick && (g.date.contains(date) || date.contains(g.date.as_str())))
}
