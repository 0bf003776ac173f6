use std::{fmt, io};

use colored::*;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::{self, Writer};
use tracing_subscriber::fmt::writer::{MakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::{FmtContext, FormatEvent};
use tracing_subscriber::registry::LookupSpan;

use crate::terminal::print::PRINT_TARGET;
use crate::terminal::spinner::SpinnerWriter;

/// Installs the global subscriber. `RUST_LOG` wins over the flags, but
/// terminal output is never filtered out.
///
/// Log lines go to stderr and terminal output to stdout, so `--json` output
/// stays parseable.
pub fn init_logging(verbose: u8, quiet: u8) {
    let level: &str = match (quiet, verbose) {
        (q, _) if q > 0 => "warn",
        (_, 0) => "info",
        (_, 1) => "debug",
        _ => "trace",
    };
    let directives: String =
        std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| level.to_string());
    let filter = EnvFilter::new(format!("{directives},{PRINT_TARGET}=info"));

    tracing_subscriber::fmt()
        .event_format(LanshareFormatter)
        .with_env_filter(filter)
        .with_writer(split_output(
            || SpinnerWriter::new(io::stdout()),
            || SpinnerWriter::new(io::stderr()),
        ))
        .init();
}

/// Sends terminal output to `out` and every other event to `err`.
pub fn split_output<O, E>(out: O, err: E) -> impl for<'a> MakeWriter<'a> + Send + Sync + 'static
where
    O: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    E: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    out.with_filter(|meta: &Metadata<'_>| meta.target() == PRINT_TARGET)
        .or_else(err)
}

pub struct LanshareFormatter;

impl<S, N> FormatEvent<S, N> for LanshareFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> format::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();

        // Terminal output: written as is, no level marker.
        if meta.target() == PRINT_TARGET {
            let mut raw = RawMessage::default();
            event.record(&mut raw);
            return writeln!(writer, "{}", raw.0);
        }

        let (symbol, color_func): (&str, fn(ColoredString) -> ColoredString) = match *meta.level() {
            Level::TRACE => ("[ ]", |s| s.dimmed()),
            Level::DEBUG => ("[?]", |s| s.blue()),
            Level::INFO => ("[+]", |s| s.green().bold()),
            Level::WARN => ("[*]", |s| s.yellow().bold()),
            Level::ERROR => ("[-]", |s| s.red().bold()),
        };

        write!(writer, "{} ", color_func(symbol.into()))?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

#[derive(Default)]
struct RawMessage(String);

impl Visit for RawMessage {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "raw_msg" {
            self.0 = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "raw_msg" {
            self.0 = format!("{value:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use crate::terminal::print;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn log_lines_stay_off_the_output_stream() {
        colored::control::set_override(false);
        let (stdout, stderr) = (Captured::default(), Captured::default());
        let (out, err) = (stdout.clone(), stderr.clone());

        let subscriber = tracing_subscriber::fmt()
            .event_format(LanshareFormatter)
            .with_env_filter(EnvFilter::new("debug"))
            .with_writer(split_output(
                move || SpinnerWriter::new(out.clone()),
                move || SpinnerWriter::new(err.clone()),
            ))
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("probing 2 interface(s)");
            tracing::warn!("1 probe(s) could not be sent");
            print::print("[]");
        });

        assert_eq!(stdout.text(), "[]\n");
        let logged = stderr.text();
        assert!(logged.contains("[+] probing 2 interface(s)"), "{logged:?}");
        assert!(logged.contains("[*] 1 probe(s) could not be sent"), "{logged:?}");
        assert!(!logged.contains("[]\n"), "{logged:?}");
    }
}
