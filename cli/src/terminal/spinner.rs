use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

const TICK: Duration = Duration::from_millis(100);

pub struct SpinnerHandle {
    pub spinner: ProgressBar,
}

impl SpinnerHandle {
    pub fn println(&self, msg: &str) {
        self.spinner.println(msg);
    }

    pub fn finish_and_clear(&self) {
        self.spinner.finish_and_clear();
    }

    pub fn set_message(&self, msg: String) {
        self.spinner.set_message(msg);
    }

    fn is_drawing(&self) -> bool {
        !self.spinner.is_finished() && !self.spinner.is_hidden()
    }
}

pub(crate) static SPINNER: OnceLock<SpinnerHandle> = OnceLock::new();

pub fn get_spinner() -> &'static SpinnerHandle {
    SPINNER.get_or_init(init_spinner)
}

fn init_spinner() -> SpinnerHandle {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&[
            "▁▁▁▁▁",
            "▁▂▂▂▁",
            "▁▄▂▄▁",
            "▂▄▆▄▂",
            "▄▆█▆▄",
            "▂▄▆▄▂",
            "▁▄▂▄▁",
            "▁▂▂▂▁",
        ]);

    pb.set_style(style);
    pb.enable_steady_tick(TICK);

    SpinnerHandle { spinner: pb }
}

pub fn report_probe_progress(wait: Duration) {
    get_spinner().set_message(format!(
        "Waiting {} for node status replies...",
        format!("{}ms", wait.as_millis()).green().bold()
    ));
}

/// Writes above the spinner while it is drawing, to `fallback` otherwise.
pub struct SpinnerWriter<W> {
    fallback: W,
}

impl<W> SpinnerWriter<W> {
    pub fn new(fallback: W) -> Self {
        Self { fallback }
    }
}

impl<W: Write> Write for SpinnerWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match SPINNER.get() {
            Some(handle) if handle.is_drawing() => {
                let msg = String::from_utf8_lossy(buf);
                handle.println(msg.trim_end());
                Ok(buf.len())
            }
            _ => self.fallback.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.fallback.flush()
    }
}
