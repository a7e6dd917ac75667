//! Colored terminal logging.
//!
//! Every line is also forwarded to the `log` facade so library consumers with
//! their own logger still receive it.

use chrono::Local;
use colored::Colorize;

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

impl LogLevel {
    fn tag(self) -> colored::ColoredString {
        match self {
            Self::Info => "[INFO]".blue().bold(),
            Self::Success => "[ OK ]".green().bold(),
            Self::Warning => "[WARN]".yellow().bold(),
            Self::Error => "[FAIL]".red().bold(),
            Self::Debug => "[DBG ]".dimmed(),
        }
    }
}

/// Writes a timestamped line to the terminal.
///
/// Debug lines are only printed when the `log` facade has debug enabled.
pub fn log(level: LogLevel, message: &str) {
    match level {
        LogLevel::Error => log::error!("{message}"),
        LogLevel::Warning => log::warn!("{message}"),
        LogLevel::Debug => log::debug!("{message}"),
        LogLevel::Info | LogLevel::Success => log::info!("{message}"),
    }

    if level == LogLevel::Debug && !log::log_enabled!(log::Level::Debug) {
        return;
    }

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let line = format!("{} {} {}", timestamp.dimmed(), level.tag(), message);
    match level {
        LogLevel::Error | LogLevel::Warning => eprintln!("{line}"),
        _ => println!("{line}"),
    }
}

/// Prints a section banner.
pub fn log_section(title: &str) {
    let rule = "=".repeat(title.len() + 8);
    println!("\n{}", rule.cyan());
    println!("    {}", title.bold());
    println!("{}", rule.cyan());
}
