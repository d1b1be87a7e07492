use std::{fmt, time::Duration};

/// The byte stream every report is written through.
///
/// Writes are assumed to always succeed; this layer has no retry or flow control.
/// Implementations should not buffer beyond what the transport needs, since the
/// alarm path relies on `delay` to let the line drain before the machine moves on.
pub trait OutputSink {
    fn write_str(&mut self, s: &str);

    fn write_char(&mut self, c: char) {
        let mut buffer = [0u8; 4];
        self.write_str(c.encode_utf8(&mut buffer));
    }

    /// Bounded blocking delay. Only the alarm report uses it.
    fn delay(&mut self, duration: Duration);

    // Lets `write!(sink, ...)` format straight into the sink without an intermediate buffer.
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) {
        let _ = fmt::write(&mut SinkAdapter(self), args);
    }
}

struct SinkAdapter<'a, S: ?Sized>(&'a mut S);

impl<'a, S: OutputSink + ?Sized> fmt::Write for SinkAdapter<'a, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

/// Collects output in memory; delays are recorded rather than slept.
///
/// Used by the simulated machine to build each response before pushing it out
/// asynchronously, and by tests.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BufferSink {
    text: String,
    delays: Vec<Duration>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn as_str(&self) -> &str {
        &self.text
    }
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split_terminator("\r\n")
    }
    /// Hands back everything written so far and resets the sink.
    pub fn take(&mut self) -> (String, Duration) {
        let delay = self.total_delay();
        self.delays.clear();
        (std::mem::take(&mut self.text), delay)
    }
}

impl OutputSink for BufferSink {
    fn write_str(&mut self, s: &str) {
        self.text.push_str(s);
    }
    fn delay(&mut self, duration: Duration) {
        self.delays.push(duration);
    }
}
