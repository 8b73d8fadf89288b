//! UI helpers for the CLI.
//!
//! Provides consistent formatting for console output.

use colored::Colorize;
use moodle_stack::{CheckReport, CheckStatus};

/// Print a section header.
pub fn print_section(title: &str) {
    println!();
    println!("{}", "═".repeat(70).bright_black());
    println!("{}", title.cyan().bold());
    println!("{}", "═".repeat(70).bright_black());
    println!();
}

/// Print a progress step with step number.
pub fn print_step(current: u8, total: u8, message: &str) {
    println!(
        "{} {} {}",
        format!("[{current}/{total}]").bright_black(),
        "▶".cyan(),
        message.bold()
    );
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message.yellow());
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a follow-up hint.
pub fn print_hint(message: &str) {
    eprintln!("{} {}", "hint:".yellow().bold(), message);
}

/// Print a key-value pair.
pub fn print_kv(key: &str, value: &str) {
    println!("  {} {}", format!("{key}:").bright_black(), value.green());
}

/// Print a list item.
pub fn print_list_item(item: &str) {
    println!("  {} {item}", "•".bright_black());
}

/// Print a numbered step.
pub fn print_numbered_step(num: usize, message: &str) {
    println!("  {}. {}", num.to_string().cyan(), message);
}

/// Print a check report as a framed table.
pub fn print_check_report(report: &CheckReport) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════════════╗");
    println!("║                      STACK STRUCTURE CHECKS                          ║");
    println!("╠══════════════════════════════════════════════════════════════════════╣");
    println!("║ Stack: {:<61} ║", truncate(&report.stack, 61));
    println!("╠══════════════════════════════════════════════════════════════════════╣");

    for check in &report.checks {
        let status_icon = match check.status {
            CheckStatus::Pass => "✅",
            CheckStatus::Fail => "❌",
        };
        println!(
            "║ {} {:<24} {:<40} ║",
            status_icon,
            check.name,
            truncate(&check.details, 40)
        );
    }

    println!("╠══════════════════════════════════════════════════════════════════════╣");
    println!(
        "║ SUMMARY: {:<59} ║",
        format!("{}/{} checks passed", report.passed_count(), report.total_checks())
    );

    if report.all_passed() {
        println!("║ ✅ STACK CHECKS PASSED                                               ║");
    } else {
        println!("║ ⚠️  STACK CHECKS FOUND ISSUES                                         ║");
    }

    println!("╚══════════════════════════════════════════════════════════════════════╝");
    println!();

    for check in report.checks.iter().filter(|c| c.status == CheckStatus::Fail) {
        print_error(&format!("{}: {}", check.name, check.details));
    }
}

/// Truncate a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}
