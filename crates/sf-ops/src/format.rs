//! Display formatting for result payloads.
//!
//! Currency renders as `$#,###.##`; dates as `YYYY-MM-DD`.

use chrono::NaiveDate;

/// Format an amount as `$#,###.##`.
pub fn currency(amount: f64) -> String {
    let cents_total = (amount.abs() * 100.0).round() as u64;
    let negative = amount < 0.0 && cents_total > 0;
    let dollars = cents_total / 100;
    let cents = cents_total % 100;

    let digits = dollars.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!(
        "{}${}.{:02}",
        if negative { "-" } else { "" },
        grouped,
        cents
    )
}

/// Format a date as `YYYY-MM-DD`.
pub fn date(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}
