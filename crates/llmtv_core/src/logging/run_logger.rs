//! Per-run logger with file and callback output.
//!
//! Each pipeline run gets its own logger that:
//! - Writes to a dedicated log file
//! - Sends messages to a console/GUI callback (if provided)
//! - Supports compact mode with progress filtering
//! - Keeps a tail buffer of raw service output for failure diagnosis
//!
//! The logger is shared between concurrently running clip tasks, so all
//! mutable state sits behind mutexes.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogConfig, LogLevel, MessagePrefix, RunLogCallback};
use crate::services::ToolLog;

/// Per-run logger with dual output (file + callback).
pub struct RunLogger {
    /// Run name for identification.
    run_name: String,
    /// Path to log file.
    log_path: PathBuf,
    /// File writer (buffered).
    file_writer: Mutex<Option<BufWriter<File>>>,
    /// Callback for console/GUI output.
    callback: Mutex<Option<RunLogCallback>>,
    /// Logging configuration.
    config: LogConfig,
    /// Recent service output lines.
    tail_buffer: Mutex<VecDeque<String>>,
    /// Last progress value logged (for compact mode filtering).
    last_progress: Mutex<u32>,
}

impl RunLogger {
    /// Create a new run logger.
    ///
    /// # Arguments
    /// * `run_name` - Name of the run (used in log filename)
    /// * `log_dir` - Directory to write log file to
    /// * `config` - Logging configuration
    /// * `callback` - Optional callback for console output
    pub fn new(
        run_name: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<RunLogCallback>,
    ) -> std::io::Result<Self> {
        let run_name = run_name.into();
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&run_name)));
        let file = File::create(&log_path)?;

        Ok(Self {
            run_name,
            log_path,
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            callback: Mutex::new(callback),
            tail_buffer: Mutex::new(VecDeque::with_capacity(config.error_tail)),
            config,
            last_progress: Mutex::new(0),
        })
    }

    /// Get the log file path.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a message at the specified level.
    ///
    /// Every message is mirrored to `tracing` regardless of the run log level.
    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(run = %self.run_name, "{}", message),
            LogLevel::Debug => tracing::debug!(run = %self.run_name, "{}", message),
            LogLevel::Info => tracing::info!(run = %self.run_name, "{}", message),
            LogLevel::Warn => tracing::warn!(run = %self.run_name, "{}", message),
            LogLevel::Error => tracing::error!(run = %self.run_name, "{}", message),
        }

        if level < self.config.level {
            return;
        }

        let formatted = self.format_message(message);
        self.output(&formatted);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        let msg = MessagePrefix::Warning.format(message);
        self.log(LogLevel::Warn, &msg);
    }

    pub fn error(&self, message: &str) {
        let msg = MessagePrefix::Error.format(message);
        self.log(LogLevel::Error, &msg);
    }

    /// Log an external request or tool invocation.
    pub fn command(&self, command: &str) {
        let msg = MessagePrefix::Command.format(command);
        self.log(LogLevel::Info, &msg);
    }

    /// Log a stage marker.
    pub fn stage(&self, stage_name: &str) {
        let msg = MessagePrefix::Stage.format(stage_name);
        self.log(LogLevel::Info, &msg);
    }

    /// Log a section marker.
    pub fn section(&self, section_name: &str) {
        let msg = MessagePrefix::Section.format(section_name);
        self.log(LogLevel::Info, &msg);
    }

    /// Log a line about one segment.
    pub fn segment(&self, index: usize, message: &str) {
        let msg = MessagePrefix::Segment(index).format(message);
        self.log(LogLevel::Info, &msg);
    }

    pub fn success(&self, message: &str) {
        let msg = MessagePrefix::Success.format(message);
        self.log(LogLevel::Info, &msg);
    }

    /// Log progress update (filtered in compact mode).
    ///
    /// Returns true if the progress was logged, false if filtered.
    pub fn progress(&self, percent: u32) -> bool {
        if self.config.compact {
            let mut last = self.last_progress.lock();
            let step = self.config.progress_step.max(1);

            // Only log at step intervals (e.g., 0%, 20%, 40%, ...)
            let current_step = (percent / step) * step;
            let last_step = (*last / step) * step;

            if current_step <= last_step && percent < 100 {
                return false;
            }
            *last = percent;
        }

        let msg = format!("Progress: {}%", percent);
        self.log(LogLevel::Info, &msg);
        true
    }

    /// Record a raw line of service or tool output.
    ///
    /// In compact mode, these only go to the tail buffer.
    pub fn output_line(&self, line: &str, is_stderr: bool) {
        self.remember(line);

        if self.config.compact {
            return;
        }

        let prefix = if is_stderr { "[stderr] " } else { "" };
        let msg = format!("{}{}", prefix, line);
        self.output(&self.format_message(&msg));
    }

    /// Add a line to the tail buffer without printing it.
    pub fn remember(&self, line: &str) {
        let mut buffer = self.tail_buffer.lock();
        if buffer.len() >= self.config.error_tail.max(1) {
            buffer.pop_front();
        }
        buffer.push_back(line.to_string());
    }

    /// Show the tail buffer (typically after an error).
    pub fn show_tail(&self, header: &str) {
        let buffer = self.tail_buffer.lock();
        if buffer.is_empty() {
            return;
        }

        self.output(&self.format_message(&format!("[{}/tail]", header)));
        for line in buffer.iter() {
            self.output(&self.format_message(line));
        }
    }

    /// Flush the log file.
    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Close the logger and release the file.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    /// Format a message with timestamp (if enabled).
    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            let timestamp = Local::now().format("%H:%M:%S");
            format!("[{}] {}", timestamp, message)
        } else {
            message.to_string()
        }
    }

    /// Output a formatted message to file and callback.
    fn output(&self, formatted: &str) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", formatted);
        }

        if let Some(ref callback) = *self.callback.lock() {
            callback(formatted);
        }
    }
}

impl Drop for RunLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sanitize a string to be safe for use as a filename.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

impl ToolLog for RunLogger {
    fn command(&self, command: &str) {
        RunLogger::command(self, command);
    }

    fn output_line(&self, line: &str, is_stderr: bool) {
        RunLogger::output_line(self, line, is_stderr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn creates_log_file() {
        let dir = tempdir().unwrap();
        let logger = RunLogger::new("cats_song", dir.path(), LogConfig::default(), None).unwrap();

        assert!(logger.log_path().exists());
        assert!(logger.log_path().ends_with("cats_song.log"));
    }

    #[test]
    fn writes_segment_lines_to_file() {
        let dir = tempdir().unwrap();
        let logger = RunLogger::new("run", dir.path(), LogConfig::default(), None).unwrap();

        logger.segment(4, "clip downloaded");
        logger.flush();

        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(content.contains("[Segment 4] clip downloaded"));
    }

    #[test]
    fn calls_callback_and_respects_level() {
        let dir = tempdir().unwrap();
        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let callback: RunLogCallback = Box::new(move |_msg| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let config = LogConfig {
            level: LogLevel::Info,
            ..LogConfig::default()
        };
        let logger = RunLogger::new("run", dir.path(), config, Some(callback)).unwrap();

        logger.info("Message 1");
        logger.debug("filtered");
        logger.stage("Music");

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn compact_mode_filters_progress() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            compact: true,
            progress_step: 20,
            ..LogConfig::default()
        };

        let logger = RunLogger::new("run", dir.path(), config, None).unwrap();

        assert!(!logger.progress(5));
        assert!(!logger.progress(15));
        assert!(logger.progress(20));
        assert!(!logger.progress(25));
        assert!(logger.progress(40));
        assert!(logger.progress(100));
    }

    fn collecting(config: LogConfig, dir: &Path) -> (RunLogger, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let callback: RunLogCallback = Box::new(move |msg| sink.lock().push(msg.to_string()));
        let logger = RunLogger::new("run", dir, config, Some(callback)).unwrap();
        (logger, lines)
    }

    #[test]
    fn tail_buffer_maintains_limit() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            compact: true,
            error_tail: 5,
            show_timestamps: false,
            ..LogConfig::default()
        };
        let (logger, lines) = collecting(config, dir.path());

        for i in 0..10 {
            logger.output_line(&format!("Line {}", i), false);
        }
        // Compact mode keeps raw output out of the console
        assert!(lines.lock().is_empty());

        logger.show_tail("ffmpeg");
        let shown = lines.lock().clone();
        assert_eq!(shown[0], "[ffmpeg/tail]");
        assert_eq!(&shown[1..], ["Line 5", "Line 6", "Line 7", "Line 8", "Line 9"]);
    }

    #[test]
    fn remembered_lines_show_only_in_tail() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            show_timestamps: false,
            ..LogConfig::default()
        };
        let (logger, lines) = collecting(config, dir.path());

        logger.remember("stub-video: rate limited");
        assert!(lines.lock().is_empty());

        logger.show_tail("Recent service output");
        assert_eq!(
            *lines.lock(),
            vec!["[Recent service output/tail]", "stub-video: rate limited"]
        );
    }

    #[test]
    fn tool_output_goes_through_the_run_log() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            show_timestamps: false,
            ..LogConfig::default()
        };
        let (logger, lines) = collecting(config, dir.path());

        let log: &dyn ToolLog = &logger;
        log.command("ffmpeg -i a.mp4 out.mp4");
        log.output_line("Invalid data found", true);

        let shown = lines.lock().clone();
        assert_eq!(shown[0], "$ ffmpeg -i a.mp4 out.mp4");
        assert_eq!(shown[1], "[stderr] Invalid data found");
    }

    #[test]
    fn sanitizes_filename() {
        assert_eq!(sanitize_filename("normal_name"), "normal_name");
        assert_eq!(sanitize_filename("cats/dogs"), "cats_dogs");
        assert_eq!(sanitize_filename("a<b>c"), "a_b_c");
    }
}
