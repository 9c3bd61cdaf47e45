use std::fmt::{self, Write as _};

use nu_ansi_term::Color::{Blue, DarkGray, Magenta, Red, Yellow};
use tracing::{
    field::{Field, Visit},
    Event, Level, Metadata, Subscriber,
};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields, MakeWriter},
    registry::LookupSpan,
    EnvFilter,
};

use crate::{cli::Args, utils::Colored};

/// Message and structured fields of one event, in recording order.
#[derive(Default, Debug, PartialEq)]
struct EventFields {
    message: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push((field.name(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields.push((field.name(), format!("{value:?}")));
        }
    }
}

/// Text layout for terminal output.
///
/// Info events are user-facing and print their message alone; their fields
/// exist for `--json`. Other levels get a colored tag and trail their fields
/// as `key=value` so `-v` shows which registry or package a line is about.
fn render(level: Level, event: &EventFields, out: &mut impl fmt::Write) -> fmt::Result {
    let tag = match level {
        Level::TRACE => Some(Colored(Magenta, "[TRACE]")),
        Level::DEBUG => Some(Colored(Blue, "[DEBUG]")),
        Level::INFO => None,
        Level::WARN => Some(Colored(Yellow, "[WARN]")),
        Level::ERROR => Some(Colored(Red, "[ERROR]")),
    };

    let Some(tag) = tag else {
        return match &event.message {
            Some(message) => writeln!(out, "{message}"),
            None => Ok(()),
        };
    };

    write!(out, "{tag}")?;
    if let Some(message) = &event.message {
        write!(out, " {message}")?;
    }
    for (name, value) in &event.fields {
        write!(out, " {}", Colored(DarkGray, format_args!("{name}={value}")))?;
    }
    writeln!(out)
}

pub struct TextFormatter;

impl<S, N> FormatEvent<S, N> for TextFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = EventFields::default();
        event.record(&mut fields);
        render(*event.metadata().level(), &fields, &mut writer)
    }
}

/// Collects one formatted event, then prints it with progress bars suspended.
struct EventBuffer {
    text: String,
    stderr: bool,
}

impl std::io::Write for EventBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.text.push_str(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for EventBuffer {
    fn drop(&mut self) {
        let text = self.text.trim_end_matches('\n');
        if text.is_empty() {
            return;
        }
        let stderr = self.stderr;
        crate::progress::suspend(|| {
            if stderr {
                eprintln!("{text}");
            } else {
                println!("{text}");
            }
        });
    }
}

/// Info goes to stdout, everything else to stderr.
struct Output;

impl<'a> MakeWriter<'a> for Output {
    type Writer = EventBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        EventBuffer {
            text: String::new(),
            stderr: false,
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        EventBuffer {
            text: String::new(),
            stderr: *meta.level() != Level::INFO,
        }
    }
}

fn level_for(args: &Args) -> Level {
    match (args.quiet, args.verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the level flags.
pub fn setup_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pkgsync={}", level_for(args))));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(Output)
        .without_time();

    let installed = if args.json {
        tracing::subscriber::set_global_default(builder.json().flatten_event(true).finish())
    } else {
        tracing::subscriber::set_global_default(builder.event_format(TextFormatter).finish())
    };
    if installed.is_err() {
        eprintln!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{set_flag, COLOR};

    fn rendered(level: Level, message: Option<&str>, fields: &[(&'static str, &str)]) -> String {
        set_flag(&COLOR, false);
        let event = EventFields {
            message: message.map(String::from),
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
        };
        let mut out = String::new();
        render(level, &event, &mut out).unwrap();
        out
    }

    #[test]
    fn test_debug_events_show_fields() {
        assert_eq!(
            rendered(
                Level::DEBUG,
                Some("package not found upstream"),
                &[("registry", "bower.io"), ("package", "jquery")]
            ),
            "[DEBUG] package not found upstream registry=bower.io package=jquery\n"
        );
    }

    #[test]
    fn test_warn_without_message_still_shows_fields() {
        assert_eq!(
            rendered(Level::WARN, None, &[("dropped", "3")]),
            "[WARN] dropped=3\n"
        );
    }

    #[test]
    fn test_info_prints_message_only() {
        assert_eq!(
            rendered(Level::INFO, Some("bower.io: 3 synced"), &[("synced", "3")]),
            "bower.io: 3 synced\n"
        );
        assert_eq!(rendered(Level::INFO, None, &[("name", "redis")]), "");
    }
}
