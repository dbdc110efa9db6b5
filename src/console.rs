// Tagged console output for the command-line front-end

use std::io::{self, Write};

/// Print a `[Tag] message` line
pub fn info(tag: &str, msg: &str) {
    println!("[{}] {}", tag, msg);
}

/// Overwrite the current status line
pub fn inline(msg: &str) {
    print!("\r{}", msg);
    io::stdout().flush().ok();
}

/// Finish an inline status line
pub fn end_inline() {
    println!();
}

/// Inline progress status text
pub fn progress_line(percent: f64, speed: Option<f64>) -> String {
    match speed {
        Some(speed) => format!("Progress: {:.1}% | Speed: {:.2}x", percent, speed),
        None => format!("Progress: {:.1}%", percent),
    }
}
