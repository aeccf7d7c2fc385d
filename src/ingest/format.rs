//! Content sniffing and row parsing for the two tick file encodings.

use chrono::Utc;

use crate::error::HubError;

/// Timestamps below this are epoch seconds; at or above, epoch milliseconds.
pub const SECONDS_CUTOFF: i64 = 10_000_000_000;

/// Ticks stamped further ahead of the wall clock than this are corrupt.
const MAX_FUTURE_SKEW_MS: i64 = 24 * 60 * 60 * 1000;

/// Header names that may carry the tick time, in lookup order.
const TIME_COLUMNS: &[&str] = &["time_msc", "t"];
/// Header names that may carry the price, in priority order.
const PRICE_COLUMNS: &[&str] = &["last", "bid", "ask", "p"];
/// Position of the price inside the colon-delimited payload of a pipe line.
const PIPE_PRICE_FIELD: usize = 4;

/// On-disk encoding of a tick file, decided from its first non-blank line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFormat {
    /// CSV with a header row (`time_msc,bid,ask,last,...` or `t,p,...`).
    HeaderDelimited,
    /// `timestamp|a:b:c:d:price:...` raw feed lines.
    PipeDelimited,
}

/// One normalized row before the symbol is attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawTick {
    pub timestamp_ms: i64,
    pub price: f64,
}

/// Rows recovered from one file plus the number of rows that were dropped.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub format: Option<TickFormat>,
    pub ticks: Vec<RawTick>,
    pub rows_skipped: usize,
}

pub fn classify(first_line: &str) -> TickFormat {
    if first_line.contains('|') && !first_line.contains(',') {
        TickFormat::PipeDelimited
    } else {
        TickFormat::HeaderDelimited
    }
}

/// Parse an integer epoch timestamp, scaling seconds to milliseconds.
///
/// Values before the epoch or more than a day past now are rejected, so one
/// stray row cannot stretch the global window.
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let ts: i64 = raw.trim().parse().ok()?;
    let ms = if ts < SECONDS_CUTOFF {
        ts.checked_mul(1000)?
    } else {
        ts
    };
    let horizon = Utc::now().timestamp_millis().saturating_add(MAX_FUTURE_SKEW_MS);
    (0..=horizon).contains(&ms).then_some(ms)
}

fn parse_price(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Parse the full body of a tick file.
///
/// Returns an error only when the file as a whole is unusable (a header
/// without a time column); bad rows are counted and skipped.
pub fn parse_ticks(content: &str) -> Result<ParsedFile, HubError> {
    let Some(offset) = first_non_blank_offset(content) else {
        return Ok(ParsedFile::default());
    };
    let body = &content[offset..];
    let first_line = body.lines().next().unwrap_or("").trim();

    match classify(first_line) {
        TickFormat::PipeDelimited => Ok(parse_pipe(body)),
        TickFormat::HeaderDelimited => parse_header(body),
    }
}

fn first_non_blank_offset(content: &str) -> Option<usize> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if !line.trim().is_empty() {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

fn parse_pipe(body: &str) -> ParsedFile {
    let mut out = ParsedFile {
        format: Some(TickFormat::PipeDelimited),
        ..Default::default()
    };

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_pipe_line(line) {
            Some(tick) => out.ticks.push(tick),
            None => out.rows_skipped += 1,
        }
    }
    out
}

fn parse_pipe_line(line: &str) -> Option<RawTick> {
    let (ts_raw, payload) = line.split_once('|')?;
    let timestamp_ms = parse_timestamp_ms(ts_raw)?;
    let price_raw = payload.split(':').nth(PIPE_PRICE_FIELD)?;
    let price = parse_price(price_raw)?;
    Some(RawTick {
        timestamp_ms,
        price,
    })
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn parse_header(body: &str) -> Result<ParsedFile, HubError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader.headers()?.clone();
    let idx_time = TIME_COLUMNS
        .iter()
        .find_map(|name| column_index(&headers, name))
        .ok_or_else(|| HubError::BadRequest("missing time column".to_string()))?;
    let price_indices: Vec<usize> = PRICE_COLUMNS
        .iter()
        .filter_map(|name| column_index(&headers, name))
        .collect();

    let mut out = ParsedFile {
        format: Some(TickFormat::HeaderDelimited),
        ..Default::default()
    };

    for result in reader.records() {
        let Ok(record) = result else {
            out.rows_skipped += 1;
            continue;
        };
        let timestamp_ms = record.get(idx_time).and_then(parse_timestamp_ms);
        let price = price_indices
            .iter()
            .find_map(|&i| record.get(i).and_then(parse_price));

        match (timestamp_ms, price) {
            (Some(timestamp_ms), Some(price)) => out.ticks.push(RawTick {
                timestamp_ms,
                price,
            }),
            _ => out.rows_skipped += 1,
        }
    }

    Ok(out)
}
