use std::fmt::Write as _;

use crate::point::DataPoint;

/// Formats data points as lines of the carbon plaintext protocol and buffers them.
///
/// Every line has the form `<group>.<host>.<metric> <value> <timestamp>\n`, and is lowercased as a
/// whole. Lines are stored back to back in a single buffer, which means the buffer itself is a
/// valid multi-line payload at all times and can be handed to the socket without any further
/// joining.
#[derive(Default)]
pub(crate) struct PayloadWriter {
    payload_buf: String,
    offsets: Vec<usize>,
    line_buf: String,
    int_writer: itoa::Buffer,
}

impl PayloadWriter {
    /// Creates a new, empty `PayloadWriter`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of buffered lines.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns `true` if no lines are buffered.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Formats and buffers a single data point.
    pub fn write_point(&mut self, point: &DataPoint) {
        self.line_buf.clear();
        self.line_buf.push_str(point.group());
        self.line_buf.push('.');
        self.line_buf.push_str(point.host());
        self.line_buf.push('.');
        self.line_buf.push_str(point.metric());
        self.line_buf.push(' ');

        // Writing into a `String` cannot fail.
        let _ = write!(self.line_buf, "{:.6}", point.value());

        self.line_buf.push(' ');
        self.line_buf.push_str(self.int_writer.format(point.timestamp().as_secs()));
        self.line_buf.push('\n');

        push_lowercase(&mut self.payload_buf, &self.line_buf);
        self.offsets.push(self.payload_buf.len());
    }

    /// Takes all buffered lines as a single payload, leaving the writer empty.
    pub fn take_payload(&mut self) -> Payload {
        Payload {
            buf: std::mem::take(&mut self.payload_buf),
            offsets: std::mem::take(&mut self.offsets),
        }
    }

    /// Drops all buffered lines.
    pub fn clear(&mut self) {
        self.payload_buf.clear();
        self.offsets.clear();
    }

    /// Puts a payload that could not be sent back in front of any lines buffered since.
    pub fn restore(&mut self, payload: Payload) {
        let Payload { mut buf, mut offsets } = payload;
        let shift = buf.len();

        buf.push_str(&self.payload_buf);
        offsets.extend(self.offsets.iter().map(|offset| offset + shift));

        self.payload_buf = buf;
        self.offsets = offsets;
    }
}

/// A batch of complete, newline-terminated lines.
#[derive(Debug, Default)]
pub(crate) struct Payload {
    buf: String,
    offsets: Vec<usize>,
}

impl Payload {
    /// Builds a payload out of caller-provided lines, lowercasing them.
    ///
    /// Lines are joined with newlines and the payload gets a trailing newline. A line with
    /// embedded newlines counts as every line it holds.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut payload = Payload::default();
        for line in lines {
            let start = payload.buf.len();
            push_lowercase(&mut payload.buf, line.as_ref());
            payload.buf.push('\n');
            let ends = payload.buf[start..].match_indices('\n').map(|(i, _)| start + i + 1);
            payload.offsets.extend(ends);
        }
        payload
    }

    /// Builds a payload out of caller-provided text, lowercasing it but otherwise sending it as is.
    pub fn from_raw(raw: &str) -> Self {
        let mut payload = Payload::default();
        push_lowercase(&mut payload.buf, raw);
        payload.offsets = payload.buf.match_indices('\n').map(|(i, _)| i + 1).collect();
        if !payload.buf.is_empty() && !payload.buf.ends_with('\n') {
            payload.offsets.push(payload.buf.len());
        }
        payload
    }

    /// Returns the number of lines in the payload.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns `true` if there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the payload as raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.buf
    }
}

fn push_lowercase(buf: &mut String, s: &str) {
    if s.is_ascii() {
        let start = buf.len();
        buf.push_str(s);
        buf[start..].make_ascii_lowercase();
    } else {
        buf.push_str(&s.to_lowercase());
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{Payload, PayloadWriter};
    use crate::{host::StaticHostResolver, point::Point};

    fn write(writer: &mut PayloadWriter, point: Point) {
        let point = point.resolve(&StaticHostResolver::new("myhost")).unwrap();
        writer.write_point(&point);
    }

    #[test]
    fn lines() {
        // Cases are defined as: group, host, metric, value, timestamp, expected output.
        let cases = [
            (
                "production",
                "myservername",
                "df_root",
                53.0,
                1_380_000_000,
                "production.myservername.df_root 53.000000 1380000000\n",
            ),
            (
                "Production",
                "DB1.Example.com",
                "Filesystem._Root",
                0.5,
                7,
                "production.db1.filesystem._root 0.500000 7\n",
            ),
            ("g", "10.0.0.5", "m", -1.25, 0, "g.10.0.0.5.m -1.250000 0\n"),
            ("g", "h", "m", 1e20, -5, "g.h.m 100000000000000000000.000000 -5\n"),
            ("g", "h", "m", 1.0 / 3.0, 1, "g.h.m 0.333333 1\n"),
            ("g", "h", "Ünïcode", 2.0, 1, "g.h.ünïcode 2.000000 1\n"),
        ];

        for (group, host, metric, value, timestamp, expected) in cases {
            let mut writer = PayloadWriter::new();
            write(
                &mut writer,
                Point::new(metric)
                    .with_group(group)
                    .with_host(host)
                    .with_value(value)
                    .with_timestamp(timestamp),
            );
            assert_eq!(writer.len(), 1);

            let payload = writer.take_payload();
            assert_eq!(payload.as_str(), expected);
        }
    }

    #[test]
    fn take_drains() {
        let mut writer = PayloadWriter::new();
        write(&mut writer, Point::new("a").with_value(1).with_timestamp(1));
        write(&mut writer, Point::new("b").with_value(2).with_timestamp(2));

        let payload = writer.take_payload();
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.as_str(), "systems.m.myhost.a 1.000000 1\nsystems.m.myhost.b 2.000000 2\n");

        assert!(writer.is_empty());
        assert!(writer.take_payload().is_empty());
    }

    #[test]
    fn restore_keeps_order() {
        let mut writer = PayloadWriter::new();
        write(&mut writer, Point::new("a").with_value(1).with_timestamp(1));
        let payload = writer.take_payload();

        write(&mut writer, Point::new("b").with_value(2).with_timestamp(2));
        writer.restore(payload);
        assert_eq!(writer.len(), 2);

        write(&mut writer, Point::new("c").with_value(3).with_timestamp(3));
        let payload = writer.take_payload();
        assert_eq!(payload.len(), 3);
        assert_eq!(
            payload.as_str(),
            "systems.m.myhost.a 1.000000 1\nsystems.m.myhost.b 2.000000 2\nsystems.m.myhost.c 3.000000 3\n"
        );
    }

    #[test]
    fn explicit_lines() {
        let payload = Payload::from_lines(["A.B 1 2", "c.D 3 4"]);
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.as_str(), "a.b 1 2\nc.d 3 4\n");

        let payload = Payload::from_lines(Vec::<String>::new());
        assert!(payload.is_empty());

        let payload = Payload::from_raw("A.B 1 2\nC.D 3 4\n");
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.as_str(), "a.b 1 2\nc.d 3 4\n");
    }

    #[test]
    fn explicit_lines_with_embedded_newlines() {
        let payload = Payload::from_lines(["A.B 1 2\nC.D 3 4", "e.f 5 6"]);
        assert_eq!(payload.len(), 3);
        assert_eq!(payload.as_str(), "a.b 1 2\nc.d 3 4\ne.f 5 6\n");

        let raw = Payload::from_raw(payload.as_str());
        assert_eq!(raw.len(), payload.len());
    }

    #[test]
    fn clear_drops_everything() {
        let mut writer = PayloadWriter::new();
        write(&mut writer, Point::new("a").with_value(1).with_timestamp(1));
        write(&mut writer, Point::new("b").with_value(2).with_timestamp(2));

        writer.clear();
        assert!(writer.is_empty());

        write(&mut writer, Point::new("c").with_value(3).with_timestamp(3));
        assert_eq!(writer.take_payload().as_str(), "systems.m.myhost.c 3.000000 3\n");
    }

    proptest! {
        #[test]
        fn formatted_line_matches_reference(
            group in "[a-zA-Z][a-zA-Z0-9_.]{0,16}",
            host in "[a-zA-Z][a-zA-Z0-9_-]{0,16}",
            metric in "[a-zA-Z0-9_]{1,24}",
            value in -1.0e12f64..1.0e12f64,
            timestamp in any::<i64>(),
        ) {
            let mut writer = PayloadWriter::new();
            write(
                &mut writer,
                Point::new(metric.clone())
                    .with_group(group.clone())
                    .with_host(host.clone())
                    .with_value(value)
                    .with_timestamp(timestamp),
            );

            let expected = format!("{group}.{host}.{metric} {value:.6} {timestamp}\n").to_lowercase();
            let payload = writer.take_payload();
            prop_assert_eq!(payload.as_str(), expected.as_str());
        }
    }
}
