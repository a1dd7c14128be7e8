use super::{PageView, parse_count};
use crate::domain::models::Balance;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;

type Strategy = fn(&PageView<'_>) -> Option<u64>;

// Most reliable first
const CURRENT_STRATEGIES: [(&str, Strategy); 3] = [
    ("inline_marker", inline_marker),
    ("my_item_info", my_item_info),
    ("phrase", phrase_template),
];

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:nBalloonCnt|myBalloonCnt)\s*[:=]\s*["']?(\d[\d,]*)"#)
        .expect("invalid balance marker regex")
});

static MY_ITEM_INFO: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".my_item_info em, #my_item_info em, .myItemInfo em")
        .expect("invalid my_item_info selector")
});

static HELD_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"보유\s*(?:중인\s*)?별풍선\s*[:：]?\s*(\d[\d,]*)\s*개").expect("invalid held phrase regex")
});

static USED_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"사용(?:한)?\s*별풍선\s*[:：]?\s*(\d[\d,]*)").expect("invalid used phrase regex")
});

static EXPIRED_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"소멸(?:된)?\s*별풍선\s*[:：]?\s*(\d[\d,]*)").expect("invalid expired phrase regex")
});

pub(crate) fn extract_balance(view: &PageView<'_>) -> Option<Balance> {
    let current = CURRENT_STRATEGIES.iter().find_map(|(name, strategy)| {
        let hit = strategy(view)?;
        tracing::trace!(strategy = *name, current = hit, "balance matched");
        Some(hit)
    })?;
    Some(Balance {
        current,
        used: capture_count(&USED_PHRASE, view.text).unwrap_or(0),
        expired: capture_count(&EXPIRED_PHRASE, view.text).unwrap_or(0),
    })
}

fn inline_marker(view: &PageView<'_>) -> Option<u64> {
    capture_count(&MARKER, view.raw)
}

fn my_item_info(view: &PageView<'_>) -> Option<u64> {
    view.doc
        .select(&MY_ITEM_INFO)
        .find_map(|em| parse_count(&em.text().collect::<String>()))
}

fn phrase_template(view: &PageView<'_>) -> Option<u64> {
    capture_count(&HELD_PHRASE, view.text)
}

fn capture_count(re: &Regex, haystack: &str) -> Option<u64> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_count(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::collapse;
    use scraper::Html;

    fn balance_of(raw: &str) -> Option<Balance> {
        let doc = Html::parse_document(raw);
        let text = collapse(doc.root_element().text());
        extract_balance(&PageView {
            raw,
            doc: &doc,
            text: &text,
        })
    }

    #[test]
    fn inline_marker_wins_over_other_sources() {
        let raw = r#"<script>var nBalloonCnt = "3,210";</script>
            <div class="my_item_info"><em>99</em></div>
            <p>보유 별풍선 : 12개</p>"#;
        assert_eq!(balance_of(raw).map(|b| b.current), Some(3210));
    }

    #[test]
    fn falls_back_to_my_item_info() {
        let raw = r#"<div class="my_item_info"><strong>별풍선</strong><em>1,004</em></div>"#;
        assert_eq!(balance_of(raw).map(|b| b.current), Some(1004));
    }

    #[test]
    fn falls_back_to_phrase_template() {
        let raw = "<p>현재 보유 중인 별풍선: 17개</p><p>사용한 별풍선 40</p><p>소멸된 별풍선 3</p>";
        assert_eq!(
            balance_of(raw),
            Some(Balance {
                current: 17,
                used: 40,
                expired: 3
            })
        );
    }

    #[test]
    fn empty_item_info_is_skipped() {
        let raw = r#"<div class="my_item_info"><em></em></div><p>보유 별풍선 8개</p>"#;
        assert_eq!(balance_of(raw).map(|b| b.current), Some(8));
    }

    #[test]
    fn no_signal_means_no_balance() {
        assert_eq!(balance_of("<p>nothing here</p>"), None);
    }
}
