use super::{collapse, normalize_date, parse_count};
use crate::domain::models::{ChargeRecord, GiftRecord};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

const CHARGE_HEADER_KEYWORDS: [&str; 3] = ["구매일", "충전", "결제금액"];
const GIFT_HEADER_KEYWORDS: [&str; 3] = ["선물", "스트리머", "선물일시"];
const MIN_CELLS: usize = 4;

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("invalid table selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("invalid tr selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td, th").expect("invalid cell selector"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableKind {
    Charge,
    Gift,
}

fn classify(header: &str) -> Option<TableKind> {
    if CHARGE_HEADER_KEYWORDS.iter().any(|k| header.contains(k)) {
        Some(TableKind::Charge)
    } else if GIFT_HEADER_KEYWORDS.iter().any(|k| header.contains(k)) {
        Some(TableKind::Gift)
    } else {
        None
    }
}

pub(crate) fn extract_tables(doc: &Html) -> (Vec<ChargeRecord>, Vec<GiftRecord>) {
    let mut charges = Vec::new();
    let mut gifts = Vec::new();

    for (t_idx, table) in doc.select(&TABLE).enumerate() {
        let rows: Vec<ElementRef<'_>> = table.select(&ROW).collect();
        let Some(header) = rows.first() else {
            continue;
        };
        let Some(kind) = classify(&collapse(header.text())) else {
            continue;
        };

        for (r_idx, row) in rows.iter().enumerate().skip(1) {
            let cells: Vec<String> = row.select(&CELL).map(|c| collapse(c.text())).collect();
            if cells.len() < MIN_CELLS {
                continue;
            }
            let id = format!("{t_idx}-{r_idx}");
            match kind {
                TableKind::Charge => charges.extend(charge_row(id, &cells)),
                TableKind::Gift => gifts.extend(gift_row(id, &cells)),
            }
        }
    }
    (charges, gifts)
}

// date | amount | method | price
fn charge_row(id: String, cells: &[String]) -> Option<ChargeRecord> {
    let date = normalize_date(&cells[0])?;
    let amount = parse_count(&cells[1]).filter(|a| *a > 0)?;
    Some(ChargeRecord {
        id: format!("charge-{id}"),
        date,
        amount,
        method: cells[2].clone(),
        price: parse_count(&cells[3]).unwrap_or(0),
    })
}

// date | streamer | amount | count
fn gift_row(id: String, cells: &[String]) -> Option<GiftRecord> {
    let date = normalize_date(&cells[0])?;
    let amount = parse_count(&cells[2]).filter(|a| *a > 0)?;
    let count = parse_count(&cells[3])
        .and_then(|c| u32::try_from(c).ok())
        .unwrap_or(1)
        .max(1);
    Some(GiftRecord {
        id: format!("gift-{id}"),
        date,
        amount,
        streamer_nick: cells[1].clone(),
        count,
    })
}
