use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::error;

use crate::config::OutputFormat;
use crate::error::PulseError;
use crate::metrics::{FieldValue, Fields, Metric, MetricSink, Tags};

/// Sink that streams every record to a writer as it arrives.
///
/// Write failures don't interrupt the gather cycle; the first one is kept and
/// surfaced by [`MetricWriter::finish`].
pub struct MetricWriter<W: Write> {
    out: W,
    format: OutputFormat,
    pretty: bool,
    written: usize,
    errors: usize,
    write_error: Option<anyhow::Error>,
}

impl<W: Write> MetricWriter<W> {
    pub fn new(out: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            out,
            format,
            pretty,
            written: 0,
            errors: 0,
            write_error: None,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    /// Flushes the writer and returns the first write failure, if any.
    pub fn finish(mut self) -> Result<W> {
        if let Some(err) = self.write_error.take() {
            return Err(err.context("failed to write metrics"));
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_metric(&mut self, metric: &Metric) -> Result<()> {
        match self.format {
            OutputFormat::Line => writeln!(self.out, "{}", line_protocol(metric))?,
            _ if self.pretty => {
                serde_json::to_writer_pretty(&mut self.out, metric)?;
                writeln!(self.out)?;
            }
            _ => {
                serde_json::to_writer(&mut self.out, metric)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }
}

impl<W: Write> MetricSink for MetricWriter<W> {
    fn add_fields(
        &mut self,
        measurement: &str,
        fields: Fields,
        tags: Tags,
        timestamp: DateTime<Utc>,
    ) {
        if self.write_error.is_some() {
            return;
        }

        let metric = Metric {
            name: measurement.to_string(),
            fields,
            tags,
            timestamp,
        };

        match self.write_metric(&metric) {
            Ok(()) => self.written += 1,
            Err(err) => {
                error!("Failed to write metric: {err:#}");
                self.write_error = Some(err);
            }
        }
    }

    fn add_error(&mut self, error: &PulseError) {
        error!("{error}");
        self.errors += 1;
    }
}

/// Renders one record in Influx line protocol with a nanosecond timestamp.
/// Tags with empty values are left out, since the protocol rejects them.
pub fn line_protocol(metric: &Metric) -> String {
    let mut line = escape(&metric.name, &[',', ' ']);

    for (key, value) in metric.tags.iter().filter(|(_, v)| !v.is_empty()) {
        line.push(',');
        line.push_str(&escape(key, &[',', '=', ' ']));
        line.push('=');
        line.push_str(&escape(value, &[',', '=', ' ']));
    }

    let fields: Vec<String> = metric
        .fields
        .iter()
        .map(|(key, value)| {
            let value = match value {
                FieldValue::Int(n) => format!("{n}i"),
                FieldValue::Str(s) => format!("\"{}\"", escape(s, &['"', '\\'])),
            };
            format!("{}={value}", escape(key, &[',', '=', ' ']))
        })
        .collect();

    line.push(' ');
    line.push_str(&fields.join(","));
    line.push(' ');
    line.push_str(
        &metric
            .timestamp
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_string(),
    );
    line
}

fn escape(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn metric() -> Metric {
        let mut fields = Fields::new();
        fields.insert("id".to_string(), FieldValue::Int(42));
        fields.insert("title".to_string(), FieldValue::from(r#"Fix "quoted" path\name"#));
        let mut tags = Tags::new();
        tags.insert("state".to_string(), "OPEN".to_string());
        tags.insert("source_repo".to_string(), "my repo,x".to_string());
        Metric {
            name: "bitbucket".to_string(),
            fields,
            tags,
            timestamp: Utc.timestamp_opt(1_581_007_908, 0).unwrap(),
        }
    }

    #[test]
    fn test_line_protocol_escaping() {
        assert_eq!(
            line_protocol(&metric()),
            r#"bitbucket,state=OPEN,source_repo=my\ repo\,x id=42i,title="Fix \"quoted\" path\\name" 1581007908000000000"#
        );
    }

    #[test]
    fn test_line_protocol_skips_empty_tags() {
        let mut metric = metric();
        metric.tags.insert("source_repo".to_string(), String::new());
        assert!(line_protocol(&metric).starts_with("bitbucket,state=OPEN id=42i"));
    }

    #[test]
    fn test_json_writer_emits_one_line_per_record() {
        let mut writer = MetricWriter::new(Vec::new(), OutputFormat::Json, false);
        let m = metric();
        writer.add_fields(&m.name, m.fields.clone(), m.tags.clone(), m.timestamp);
        writer.add_fields(&m.name, m.fields, m.tags, m.timestamp);
        writer.add_error(&PulseError::Config("boom".to_string()));

        assert_eq!(writer.written(), 2);
        assert_eq!(writer.errors(), 1);

        let out = String::from_utf8(writer.finish().unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["name"], "bitbucket");
        assert_eq!(parsed["fields"]["id"], 42);
        assert_eq!(parsed["tags"]["state"], "OPEN");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_keeps_source_error() {
        let mut writer = MetricWriter::new(BrokenPipe, OutputFormat::Line, false);
        let m = metric();
        writer.add_fields(&m.name, m.fields.clone(), m.tags.clone(), m.timestamp);
        writer.add_fields(&m.name, m.fields, m.tags, m.timestamp);

        assert_eq!(writer.written(), 0);

        let err = writer.finish().err().unwrap();
        let io = err.root_cause().downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::BrokenPipe);
        assert_eq!(format!("{err:#}"), "failed to write metrics: pipe closed");
    }
}
