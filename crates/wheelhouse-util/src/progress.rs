//! Terminal feedback for long-running operations: status lines, spinners
//! and byte-count progress bars. Everything goes to stderr.

use std::io::Write;
use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

const LABEL_WIDTH: usize = 12;

fn print_labelled(style: Style, label: &str, message: &str) {
    let _ = writeln!(
        std::io::stderr(),
        "{:>width$} {message}",
        style.apply_to(label),
        width = LABEL_WIDTH,
    );
}

/// Print an action line with a right-aligned bold green label, e.g.
/// `    Resolved 42 package(s) on 3 target(s)`.
pub fn status(label: &str, message: &str) {
    print_labelled(Style::new().green().bold(), label, message);
}

/// Same layout as [`status`] with a bold yellow label.
pub fn status_warn(label: &str, message: &str) {
    print_labelled(Style::new().yellow().bold(), label, message);
}

/// Indeterminate spinner. Call `finish_and_clear` when done.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Progress bar counting `total` bytes of the download named `label`.
pub fn byte_bar(total: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let template = "  {msg} {bar:30.cyan/dim} {bytes}/{total_bytes}";
    if let Ok(style) = ProgressStyle::with_template(template) {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.set_message(label.to_string());
    pb
}
