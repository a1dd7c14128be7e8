use crate::domain::models::{ChargeRecord, GiftRecord, Summary};
use crate::error::Result;
use csv::WriterBuilder;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct MonthRow<'a> {
    month: &'a str,
    gifted: u64,
    charged: u64,
    exchanged: u64,
    streamers: String,
}

pub fn write_charges<W: Write>(out: W, charges: &[ChargeRecord]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(out);
    wtr.write_record(["date", "amount", "method", "price"])?;
    for c in charges {
        wtr.write_record([&c.date, &c.amount.to_string(), &c.method, &c.price.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_gifts<W: Write>(out: W, gifts: &[GiftRecord]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(out);
    wtr.write_record(["date", "streamer", "amount", "count"])?;
    for g in gifts {
        wtr.write_record([&g.date, &g.streamer_nick, &g.amount.to_string(), &g.count.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

// Oldest month first; distinct streamers joined with '|'
pub fn write_months<W: Write>(out: W, summary: &Summary) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_writer(out);
    for (month, bucket) in &summary.by_month {
        wtr.serialize(MonthRow {
            month,
            gifted: bucket.gifted,
            charged: bucket.charged,
            exchanged: bucket.exchanged,
            streamers: bucket.streamers.iter().cloned().collect::<Vec<_>>().join("|"),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::summary::compute_summary;

    fn gift(date: &str, nick: &str, amount: u64) -> GiftRecord {
        GiftRecord {
            id: String::new(),
            date: date.to_string(),
            amount,
            streamer_nick: nick.to_string(),
            count: 1,
        }
    }

    #[test]
    fn gifts_csv_has_header_and_rows() {
        let mut buf = Vec::new();
        write_gifts(&mut buf, &[gift("2024-05-01", "haru, the cat", 100)]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "date,streamer,amount,count\n2024-05-01,\"haru, the cat\",100,1\n");
    }

    #[test]
    fn empty_charges_still_write_header() {
        let mut buf = Vec::new();
        write_charges(&mut buf, &[]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "date,amount,method,price\n");
    }

    #[test]
    fn months_csv_lists_streamers() {
        let summary = compute_summary(
            &[],
            &[gift("2024-05-01", "b", 1), gift("2024-05-02", "a", 2), gift("2024-04-01", "a", 3)],
            &[],
        );
        let mut buf = Vec::new();
        write_months(&mut buf, &summary).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "month,gifted,charged,exchanged,streamers");
        assert_eq!(lines[1], "2024-04,3,0,0,a");
        assert_eq!(lines[2], "2024-05,3,0,0,a|b");
    }
}
