use std::collections::HashMap;

use crate::engine::RunSummary;
use crate::fetcher::NATIVE_SYMBOL;
use crate::models::token_symbol;

const PREFIX_LEN: usize = 5;
const SUFFIX_LEN: usize = 3;

/// Shortens `0x1234567890` to `0x123...890`; short addresses pass through.
/// Counts characters, not bytes: addresses are arbitrary input lines, and a
/// byte-indexed slice could split a multi-byte character and panic.
pub fn shorten_address(address: &str) -> String {
    let char_count = address.chars().count();
    if char_count > PREFIX_LEN + SUFFIX_LEN + 3 {
        let prefix: String = address.chars().take(PREFIX_LEN).collect();
        let suffix: String = address.chars().skip(char_count - SUFFIX_LEN).collect();
        format!("{}...{}", prefix, suffix)
    } else {
        address.to_string()
    }
}

/// `1234567.8` -> `1,234,567.80`.
pub fn format_amount(value: f64) -> String {
    let raw = format!("{:.2}", value);
    let (int_part, frac_part) = match raw.split_once('.') {
        Some(parts) => parts,
        None => (raw.as_str(), "00"),
    };
    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(raw.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }
    format!("{}.{}", grouped, frac_part)
}

/// One balance cell: `-` for nothing, balance-only when the price is unknown,
/// balance plus fiat value otherwise.
pub fn format_balance(balance: f64, price: f64) -> String {
    if balance == 0.0 {
        return "-".to_string();
    }
    if price == 0.0 {
        return format!("{} (price unavailable)", format_amount(balance));
    }
    format!(
        "{} (${})",
        format_amount(balance),
        format_amount(balance * price)
    )
}

fn total_value_cell(total_value: f64) -> String {
    if total_value > 0.0 {
        format!("${}", format_amount(total_value))
    } else {
        "price unavailable".to_string()
    }
}

/// Renders the final report: one row per wallet in input order, significant
/// tokens as extra columns, and a totals row.
pub fn render_table(
    summary: &RunSummary,
    prices: &HashMap<String, f64>,
    wallet_count: usize,
) -> String {
    let sui_price = prices.get(NATIVE_SYMBOL).copied().unwrap_or(0.0);
    let price_of = |token: &str| {
        prices
            .get(&token_symbol(token))
            .copied()
            .unwrap_or(0.0)
    };

    let mut headers = vec!["#".to_string(), "Address".to_string(), "SUI".to_string(), "Staked".to_string()];
    for token in &summary.significant_tokens {
        // Volo's CERT trades under that ticker but reads as staked SUI.
        headers.push(token_symbol(token).replace("CERT", "VSUI"));
    }
    headers.push("Total SUI".to_string());
    headers.push("Total value".to_string());

    let mut rows: Vec<Vec<String>> = Vec::with_capacity(summary.records.len() + 1);
    for record in &summary.records {
        let mut row = vec![
            record.index.to_string(),
            shorten_address(&record.address),
            format_balance(record.sui, sui_price),
            format_balance(record.staked, sui_price),
        ];
        for token in &summary.significant_tokens {
            let balance = record.tokens.get(token).copied().unwrap_or(0.0);
            row.push(format_balance(balance, price_of(token)));
        }
        row.push(format_balance(record.total_sui, sui_price));
        row.push(total_value_cell(record.total_value));
        rows.push(row);
    }

    let totals = &summary.totals;
    let mut totals_row = vec![
        "TOTAL".to_string(),
        format!("{} wallets", wallet_count),
        format_balance(totals.sui, sui_price),
        format_balance(totals.staked, sui_price),
    ];
    for token in &summary.significant_tokens {
        let balance = totals.tokens.get(token).copied().unwrap_or(0.0);
        totals_row.push(format_balance(balance, price_of(token)));
    }
    totals_row.push(format_balance(totals.total_sui(), sui_price));
    totals_row.push(total_value_cell(totals.total_value));
    rows.push(totals_row);

    render_grid(&headers, &rows)
}

/// Tabulate-style grid: `-` rails between rows, `=` under the header,
/// right-aligned cells.
fn render_grid(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(String::len).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let rail = |fill: char| {
        let mut line = String::from("+");
        for width in &widths {
            line.extend(std::iter::repeat(fill).take(width + 2));
            line.push('+');
        }
        line
    };
    let format_row = |cells: &[String]| {
        let mut line = String::from("|");
        for (cell, width) in cells.iter().zip(&widths) {
            line.push_str(&format!(" {:>width$} |", cell, width = *width));
        }
        line
    };

    let mut out = String::new();
    out.push_str(&rail('-'));
    out.push('\n');
    out.push_str(&format_row(headers));
    out.push('\n');
    out.push_str(&rail('='));
    out.push('\n');
    for row in rows {
        out.push_str(&format_row(row));
        out.push('\n');
        out.push_str(&rail('-'));
        out.push('\n');
    }
    out
}
