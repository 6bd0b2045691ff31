//! Console log format for the gateway daemon.
//!
//! Lines look like `[timestamp] [service] [level] message key=value`, where
//! `service` is `vaina-<component>` for events logged through the
//! `component_*` macros.

use std::fmt;
use std::io::IsTerminal;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_CYAN: &str = "\x1b[36m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_BRIGHT_YELLOW: &str = "\x1b[93m";
const COLOR_BRIGHT_RED: &str = "\x1b[91m";
const COLOR_BRIGHT_GRAY: &str = "\x1b[90m";

const SERVICE_NAME_WIDTH: usize = 18;
const LOG_LEVEL_WIDTH: usize = 9;

/// Event formatter used by the gateway binary
pub struct GatewayLogFormatter {
    service_name: String,
    color_enabled: bool,
}

/// Log at info level under a named component
#[macro_export]
macro_rules! component_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(component = $component, $($arg)*)
    };
}

/// Log at warn level under a named component
#[macro_export]
macro_rules! component_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(component = $component, $($arg)*)
    };
}

/// Log at debug level under a named component
#[macro_export]
macro_rules! component_debug {
    ($component:expr, $($arg:tt)*) => {
        tracing::debug!(component = $component, $($arg)*)
    };
}

/// Log at error level under a named component
#[macro_export]
macro_rules! component_error {
    ($component:expr, $($arg:tt)*) => {
        tracing::error!(component = $component, $($arg)*)
    };
}

impl GatewayLogFormatter {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self::with_color(service_name, color_supported())
    }

    pub fn with_color(service_name: impl Into<String>, color_enabled: bool) -> Self {
        Self {
            service_name: service_name.into(),
            color_enabled,
        }
    }

    fn format_service_name(&self, component: Option<&str>) -> String {
        let name = match component {
            Some(comp) => format!("vaina-{}", comp),
            None => self.service_name.clone(),
        };

        if name.chars().count() > SERVICE_NAME_WIDTH {
            let truncated: String = name.chars().take(SERVICE_NAME_WIDTH - 1).collect();
            format!("{}…", truncated)
        } else {
            format!("{:<width$}", name, width = SERVICE_NAME_WIDTH)
        }
    }

    fn format_log_level(&self, level: &tracing::Level) -> String {
        let level_str = match *level {
            tracing::Level::ERROR => "✗ ERROR",
            tracing::Level::WARN => "⚠ WARN",
            tracing::Level::INFO => "ℹ INFO",
            tracing::Level::DEBUG => "◦ DEBUG",
            tracing::Level::TRACE => "◦ TRACE",
        };

        format!("{:<width$}", level_str, width = LOG_LEVEL_WIDTH)
    }

    fn color_for_level(&self, level: &tracing::Level) -> &'static str {
        if !self.color_enabled {
            return "";
        }

        match *level {
            tracing::Level::ERROR => COLOR_BRIGHT_RED,
            tracing::Level::WARN => COLOR_BRIGHT_YELLOW,
            tracing::Level::INFO => COLOR_GREEN,
            tracing::Level::DEBUG | tracing::Level::TRACE => COLOR_BRIGHT_GRAY,
        }
    }

    fn write_line(
        &self,
        writer: &mut dyn fmt::Write,
        timestamp: &str,
        level: &tracing::Level,
        fields: &FieldVisitor,
    ) -> fmt::Result {
        let color = self.color_for_level(level);
        let reset_color = if self.color_enabled { COLOR_RESET } else { "" };
        let cyan_color = if self.color_enabled { COLOR_CYAN } else { "" };

        write!(
            writer,
            "{}[{}] [{}] [{}{}{}] {}",
            cyan_color,
            timestamp,
            self.format_service_name(fields.component.as_deref()),
            color,
            self.format_log_level(level),
            reset_color,
            fields.message
        )?;

        for (key, value) in &fields.extra {
            write!(writer, " {}={}", key, value)?;
        }

        writeln!(writer, "{}", reset_color)
    }
}

impl<S, N> FormatEvent<S, N> for GatewayLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = chrono::Local::now()
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.write_line(&mut writer, &timestamp, event.metadata().level(), &visitor)
    }
}

/// Collects the message, the component, and any remaining fields
#[derive(Default)]
struct FieldVisitor {
    message: String,
    component: Option<String>,
    extra: Vec<(&'static str, String)>,
}

impl FieldVisitor {
    fn record_value(&mut self, field: &tracing::field::Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            "component" => self.component = Some(value),
            name => self.extra.push((name, value)),
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        let mut formatted = format!("{:?}", value);
        // Strip quotes from debug-formatted strings
        if formatted.len() >= 2 && formatted.starts_with('"') && formatted.ends_with('"') {
            formatted = formatted[1..formatted.len() - 1].to_string();
        }
        self.record_value(field, formatted);
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.record_value(field, value.to_string());
    }
}

fn color_supported() -> bool {
    if std::env::var("NO_COLOR").is_ok() || std::env::var("TERM").unwrap_or_default() == "dumb" {
        return false;
    }

    std::io::stdout().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_padding() {
        let formatter = GatewayLogFormatter::with_color("turpial-gateway", false);

        let name = formatter.format_service_name(None);
        assert_eq!(name.len(), SERVICE_NAME_WIDTH);
        assert!(name.starts_with("turpial-gateway"));

        assert_eq!(formatter.format_service_name(Some("session")).trim_end(), "vaina-session");
        let long = formatter.format_service_name(Some("a-very-long-component"));
        assert_eq!(long.chars().count(), SERVICE_NAME_WIDTH);
        assert!(long.ends_with('…'));
    }

    #[test]
    fn test_line_without_color() {
        let formatter = GatewayLogFormatter::with_color("turpial-gateway", false);
        let fields = FieldVisitor {
            message: "Station connected".to_string(),
            component: Some("station".to_string()),
            extra: vec![("aid", "1".to_string())],
        };

        let mut line = String::new();
        formatter
            .write_line(&mut line, "2024-01-01 00:00:00.000", &tracing::Level::INFO, &fields)
            .unwrap();

        assert!(line.starts_with("[2024-01-01 00:00:00.000] [vaina-station"));
        assert!(line.contains("ℹ INFO"));
        assert!(line.ends_with("Station connected aid=1\n"));
        assert!(!line.contains('\x1b'));
    }

    #[test]
    fn test_level_colors() {
        let formatter = GatewayLogFormatter::with_color("turpial-gateway", true);
        assert_eq!(formatter.color_for_level(&tracing::Level::ERROR), COLOR_BRIGHT_RED);
        assert_eq!(formatter.color_for_level(&tracing::Level::INFO), COLOR_GREEN);

        let plain = GatewayLogFormatter::with_color("turpial-gateway", false);
        assert_eq!(plain.color_for_level(&tracing::Level::ERROR), "");
    }
}
