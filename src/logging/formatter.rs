use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::Layer as LayerTrait,
    registry::LookupSpan,
};

use super::{LogFormat, LoggingConfig};

/// Консольный слой в формате из конфигурации. Конкретный тип стирается,
/// чтобы pretty/compact/json возвращались из одной функции.
pub fn build_layer<S, W>(
    config: &LoggingConfig,
    writer: W,
) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match config.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .event_format(fmt::format().json().with_current_span(true))
                .with_writer(writer)
                .with_ansi(false)
                .with_target(config.with_target)
                .with_thread_names(config.with_thread_names)
                .with_line_number(config.with_line_numbers);
            Box::new(layer)
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .event_format(fmt::format().pretty())
                .with_writer(writer)
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .with_thread_names(config.with_thread_names)
                .with_line_number(config.with_line_numbers);
            Box::new(layer)
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .event_format(fmt::format().compact())
                .with_writer(writer)
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .with_thread_names(config.with_thread_names)
                .with_line_number(config.with_line_numbers);
            Box::new(layer)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Arc};

    use parking_lot::Mutex;
    use tracing_subscriber::{layer::SubscriberExt, registry::Registry};

    use super::*;

    /// Буфер вместо stdout.
    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(format: LogFormat) -> String {
        let buffer = Buffer::default();
        let cfg = LoggingConfig {
            format,
            with_ansi: false,
            ..Default::default()
        };
        let subscriber = Registry::default().with(build_layer(&cfg, buffer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(channel = "alerts", "task neglected");
        });

        let bytes = buffer.0.lock().clone();
        String::from_utf8(bytes).unwrap()
    }

    /// Тест проверяет json-формат: строка разбирается как JSON с полями.
    #[test]
    fn test_json_format() {
        let out = capture(LogFormat::Json);
        let line: serde_json::Value = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(line["fields"]["channel"], "alerts");
        assert_eq!(line["level"], "WARN");
    }

    /// Тест проверяет текстовые форматы.
    #[test]
    fn test_text_formats() {
        for format in [LogFormat::Pretty, LogFormat::Compact] {
            let out = capture(format);
            assert!(out.contains("task neglected"));
            assert!(out.contains("alerts"));
        }
    }
}
