//! Output formatting module for converge
//!
//! Human output follows the familiar layout: `PLAY [...]` banners, one line
//! per host result, `RUNNING HANDLERS`, and a `PLAY RECAP` table. In JSON mode
//! nothing is printed while the run progresses; the whole report is printed
//! once at the end.

use async_trait::async_trait;
use colored::{Color, Colorize};
use is_terminal::IsTerminal;
use std::io;
use std::time::Duration;

use converge::callback::ExecutionCallback;
use converge::config::ColorsConfig;
use converge::modules::Diff;
use converge::report::{ExecutionResult, HostStats, PlayReport, RunReport, TaskStatus};

/// Output formatter for different output modes
#[derive(Debug, Clone)]
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// JSON output mode
    json_mode: bool,
    /// Verbosity level
    verbosity: u8,
    diff_mode: bool,
    colors: ColorsConfig,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, json_mode: bool, verbosity: u8) -> Self {
        let use_color = use_color && io::stdout().is_terminal();
        colored::control::set_override(use_color);

        Self {
            use_color,
            json_mode,
            verbosity,
            diff_mode: false,
            colors: ColorsConfig::default(),
        }
    }

    pub fn with_colors(mut self, colors: ColorsConfig) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_diff_mode(mut self, diff_mode: bool) -> Self {
        self.diff_mode = diff_mode;
        self
    }

    pub fn is_json(&self) -> bool {
        self.json_mode
    }

    fn paint(&self, text: &str, color_name: &str) -> String {
        if !self.use_color {
            return text.to_string();
        }
        let color: Color = color_name.parse().unwrap_or(Color::White);
        text.color(color).to_string()
    }

    fn status_color(&self, status: TaskStatus) -> &str {
        match status {
            TaskStatus::Ok => &self.colors.ok,
            TaskStatus::Changed => &self.colors.changed,
            TaskStatus::Failed => &self.colors.failed,
            TaskStatus::Skipped => &self.colors.skipped,
            TaskStatus::Unreachable => &self.colors.unreachable,
        }
    }

    fn header_line(&self, header: &str) {
        let stars = "*".repeat(80_usize.saturating_sub(header.len() + 1));
        if self.use_color {
            println!("\n{} {}", header.bright_white().bold(), stars.bright_black());
        } else {
            println!("\n{} {}", header, stars);
        }
    }

    /// Print a banner/header
    pub fn banner(&self, title: &str) {
        if self.json_mode {
            return;
        }

        let line = "=".repeat(title.len() + 4);
        if self.use_color {
            println!("\n{}", line.bright_blue());
            println!("{}", format!("  {}  ", title).bright_blue().bold());
            println!("{}", line.bright_blue());
        } else {
            println!("\n{}", line);
            println!("  {}  ", title);
            println!("{}", line);
        }
    }

    /// Print a play header
    pub fn play_header(&self, play_name: &str) {
        if !self.json_mode {
            self.header_line(&format!("PLAY [{}]", play_name));
        }
    }

    /// Print a task header
    pub fn task_header(&self, task_name: &str, host: &str) {
        if !self.json_mode && self.verbosity >= 1 {
            self.header_line(&format!("TASK [{}] {}", task_name, host));
        }
    }

    pub fn handlers_header(&self, host: &str, handlers: &[String]) {
        if !self.json_mode {
            self.header_line(&format!("RUNNING HANDLERS [{}]: {}", host, handlers.join(", ")));
        }
    }

    /// Print task result
    pub fn task_result(&self, result: &ExecutionResult) {
        if self.json_mode {
            return;
        }

        let label = match (result.status, result.ignored) {
            (TaskStatus::Skipped, _) => "skipping".to_string(),
            (status, true) => format!("{} (ignored)", status),
            (status, false) => status.to_string(),
        };
        let label = self.paint(&label, self.status_color(result.status));
        let host = if self.use_color {
            result.host.bold().to_string()
        } else {
            result.host.clone()
        };

        let mut line = format!("{}: [{}] {}", label, host, result.task);
        if result.attempts > 1 {
            line.push_str(&format!(" ({} attempts)", result.attempts));
        }
        if !result.msg.is_empty()
            && (self.verbosity >= 1
                || matches!(result.status, TaskStatus::Failed | TaskStatus::Unreachable)
                || result.module == "debug")
        {
            line.push_str(&format!(" => {}", result.msg));
        }
        println!("{}", line);

        if let Some(diagnostic) = &result.diagnostic {
            if result.status == TaskStatus::Failed {
                println!("    target state: {:?}", diagnostic.target_state);
                if let Some(rc) = diagnostic.rc {
                    println!("    rc: {}", rc);
                }
                for (name, stream) in [("stdout", &diagnostic.stdout), ("stderr", &diagnostic.stderr)] {
                    if let Some(text) = stream.as_deref().filter(|s| !s.trim().is_empty()) {
                        println!("    {}: {}", name, text.trim_end());
                    }
                }
            }
        }

        if self.diff_mode {
            if let Some(diff) = &result.diff {
                self.diff(diff);
            }
        }
    }

    /// Print a diff output
    pub fn diff(&self, diff: &Diff) {
        if self.json_mode {
            return;
        }
        match &diff.details {
            Some(details) => {
                for line in details.lines() {
                    let painted = if line.starts_with('+') && !line.starts_with("+++") {
                        self.paint(line, &self.colors.diff_add)
                    } else if line.starts_with('-') && !line.starts_with("---") {
                        self.paint(line, &self.colors.diff_remove)
                    } else {
                        line.to_string()
                    };
                    println!("{}", painted);
                }
            }
            None => {
                println!("{}", self.paint(&format!("- {}", diff.before), &self.colors.diff_remove));
                println!("{}", self.paint(&format!("+ {}", diff.after), &self.colors.diff_add));
            }
        }
    }

    /// Print the per-host recap table and the run summary
    pub fn recap(&self, report: &RunReport) {
        if self.json_mode {
            return;
        }

        self.header_line("PLAY RECAP");
        for (host, stats) in report.stats() {
            self.recap_line(&host, &stats);
        }

        let duration = format_duration(Duration::from_millis(report.duration_ms));
        println!("\n{}", report.summary());
        if self.use_color {
            println!("{} {}", "Run took".bright_black(), duration.bright_white());
        } else {
            println!("Run took {}", duration);
        }

        if report.interrupted {
            self.warning("run interrupted; remaining tasks were not started");
        }
    }

    fn recap_line(&self, host: &str, stats: &HostStats) {
        let host_label = format!("{:<30}", host);
        let host_label = if stats.failed > 0 || stats.unreachable > 0 {
            self.paint(&host_label, &self.colors.failed)
        } else if stats.changed > 0 {
            self.paint(&host_label, &self.colors.changed)
        } else {
            self.paint(&host_label, &self.colors.ok)
        };

        let counters = [
            ("ok", stats.ok, &self.colors.ok),
            ("changed", stats.changed, &self.colors.changed),
            ("unreachable", stats.unreachable, &self.colors.unreachable),
            ("failed", stats.failed, &self.colors.failed),
            ("skipped", stats.skipped, &self.colors.skipped),
            ("ignored", stats.ignored, &self.colors.skipped),
        ];
        let fields: Vec<String> = counters
            .iter()
            .map(|(label, value, color)| {
                let field = format!("{}={:<4}", label, value);
                if *value > 0 {
                    self.paint(&field, color)
                } else if self.use_color {
                    field.dimmed().to_string()
                } else {
                    field
                }
            })
            .collect();
        println!("{} : {}", host_label, fields.join(" "));
    }

    /// Print the full report as JSON (JSON mode only)
    pub fn report_json(&self, report: &RunReport) -> anyhow::Result<()> {
        if self.json_mode {
            println!("{}", serde_json::to_string_pretty(&report.to_json())?);
        }
        Ok(())
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.json_mode {
            let err = serde_json::json!({ "type": "error", "message": message });
            eprintln!("{}", err);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "ERROR:".red().bold(), message);
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.json_mode {
            let warn = serde_json::json!({ "type": "warning", "message": message });
            eprintln!("{}", warn);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "WARNING:".yellow().bold(), message);
        } else {
            eprintln!("WARNING: {}", message);
        }
    }

    /// Print an info message (respects verbosity)
    pub fn info(&self, message: &str) {
        if self.verbosity < 1 || self.json_mode {
            return;
        }

        if self.use_color {
            println!("{} {}", "INFO:".blue(), message);
        } else {
            println!("INFO: {}", message);
        }
    }

    /// Print a list of items
    pub fn list(&self, title: &str, items: &[String]) {
        if self.json_mode {
            return;
        }
        println!("  {} ({}):", title, items.len());
        for item in items {
            println!("    {}", item);
        }
    }
}

/// Prints run events as they happen
pub struct ConsoleCallback {
    output: OutputFormatter,
}

impl ConsoleCallback {
    pub fn new(output: OutputFormatter) -> Self {
        Self { output }
    }
}

#[async_trait]
impl ExecutionCallback for ConsoleCallback {
    async fn on_play_start(&self, name: &str, hosts: &[String]) {
        self.output.play_header(name);
        if hosts.is_empty() {
            self.output.warning(&format!("play '{}' matched no hosts", name));
        }
    }

    async fn on_task_start(&self, name: &str, host: &str) {
        self.output.task_header(name, host);
    }

    async fn on_task_complete(&self, result: &ExecutionResult) {
        self.output.task_result(result);
    }

    async fn on_handlers_start(&self, host: &str, handlers: &[String]) {
        self.output.handlers_header(host, handlers);
    }

    async fn on_play_end(&self, report: &PlayReport) {
        self.output.info(&format!(
            "play '{}' finished on {} host(s)",
            report.name,
            report.hosts.len()
        ));
    }
}

/// Format a duration for display
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}.{:03}s", secs, millis)
    }
}
