//! Terminal output helpers: colored status lines and tables, no
//! markdown rendering or readline integration since this CLI is a
//! one-shot operator tool, not a chat surface.

use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL};
use owo_colors::OwoColorize;

pub fn section(title: &str) {
    println!();
    println!("{}", title.bright_cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
}

pub fn success(message: &str) {
    println!("  {} {}", "✓".bright_green(), message);
}

pub fn error(message: &str) {
    println!("  {} {}", "✗".bright_red(), message);
}

pub fn warning(message: &str) {
    println!("  {} {}", "⚠".yellow(), message);
}

pub fn kv(key: &str, value: &str) {
    println!("  {} {}", format!("{key}:").dimmed(), value);
}

pub fn table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h)));
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}
