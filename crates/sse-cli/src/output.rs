//! Output formatting for sse-cli (text, json)

use clap::ValueEnum;
use colored::Colorize;
use sse_client::ServerEvent;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One header line per event followed by its data (default)
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }

    /// Parse a format name from the config file
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg.dimmed());
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print one event in the configured format
    pub fn print_event(&self, event: &ServerEvent) {
        println!("{}", self.render_event(event));
    }

    fn render_event(&self, event: &ServerEvent) -> String {
        match self.format {
            OutputFormat::Text => {
                let mut header = format!("[{}]", event.name().unwrap_or("message"))
                    .cyan()
                    .bold()
                    .to_string();
                if let Some(id) = event.id() {
                    header.push_str(&format!(" id={}", id));
                }
                if let Some(retry) = event.retry() {
                    header.push_str(&format!(" retry={}ms", retry));
                }
                format!("{}\n{}", header, event.data())
            }
            OutputFormat::Json => {
                serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
            }
        }
    }
}
