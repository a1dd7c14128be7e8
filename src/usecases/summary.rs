use crate::domain::models::{ChargeRecord, ExchangeRecord, GiftRecord, Summary};

pub const UNKNOWN_STREAMER: &str = "(알 수 없음)";

/// Rebuilds every rollup from scratch. Never patch a previous summary.
pub fn compute_summary(
    charges: &[ChargeRecord],
    gifts: &[GiftRecord],
    exchanges: &[ExchangeRecord],
) -> Summary {
    let mut summary = Summary::default();

    for g in gifts {
        let nick = if g.streamer_nick.trim().is_empty() {
            UNKNOWN_STREAMER
        } else {
            g.streamer_nick.as_str()
        };
        summary.total_gifted += g.amount;

        let per_streamer = summary.by_streamer.entry(nick.to_string()).or_default();
        per_streamer.amount += g.amount;
        per_streamer.count += 1;

        let bucket = summary.by_month.entry(month_of(&g.date)).or_default();
        bucket.gifted += g.amount;
        bucket.streamers.insert(nick.to_string());
    }

    for c in charges {
        summary.total_charged += c.amount;
        summary.by_month.entry(month_of(&c.date)).or_default().charged += c.amount;
    }

    for e in exchanges {
        summary.total_exchanged += e.amount;
        summary.by_month.entry(month_of(&e.date)).or_default().exchanged += e.amount;
    }

    summary
}

// "YYYY-MM" prefix
fn month_of(date: &str) -> String {
    date.chars().take(7).collect()
}
