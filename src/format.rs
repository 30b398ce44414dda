//! Display formatting driven by the user's localization settings

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::model::{DateFormat, Settings};

const PLACEHOLDER: &str = "---";

/// Convert an NGN amount into the display currency and format it en-US style.
///
/// `100000.0` with USD selected gives `"$65.00"`.
pub fn format_currency(amount: f64, settings: &Settings) -> String {
    let currency = settings.localization.currency;
    let converted = amount * currency.rate_from_ngn();
    let digits = currency.fraction_digits();

    let fixed = format!("{:.*}", digits, converted.abs());
    let (whole, fraction) = match fixed.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (fixed.as_str(), None),
    };

    let mut out = String::new();
    if converted < 0.0 && fixed.bytes().any(|b| matches!(b, b'1'..=b'9')) {
        out.push('-');
    }
    out.push_str(currency.symbol());
    out.push_str(&group_thousands(whole));
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Render a stored date as `DD/MM/YYYY` or `MM/DD/YYYY`.
///
/// Empty input and the `---` placeholder give `---`; anything unparseable is
/// returned unchanged.
pub fn format_date(input: &str, settings: &Settings) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == PLACEHOLDER {
        return PLACEHOLDER.to_owned();
    }

    let Some(date) = parse_date(trimmed) else {
        return input.to_owned();
    };

    let pattern = match settings.localization.date_format {
        DateFormat::DayMonthYear => "%d/%m/%Y",
        DateFormat::MonthDayYear => "%m/%d/%Y",
    };
    date.format(pattern).to_string()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}
