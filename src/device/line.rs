//! Line-based transport: one face number per line (stdin, files, pipes)
//!
//! Lines may also be `sleep <duration>` to script timing, `# comment`, or blank.

use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::time::Instant;

use super::{DeviceConnection, Transport};
use crate::error::ConnectionError;
use crate::models::Face;
use crate::utils::parse_duration;

type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Transport reading faces from a text stream; it can be connected once
pub struct LineTransport {
    reader: Mutex<Option<BoxedReader>>,
}

impl LineTransport {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        Self {
            reader: Mutex::new(Some(Box::new(reader))),
        }
    }

    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl Transport for LineTransport {
    async fn connect(&self, address: &str) -> Result<Box<dyn DeviceConnection>, ConnectionError> {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| ConnectionError::new("line source already consumed"))?;
        debug!("Reading orientations from text input in place of {}", address);
        Ok(Box::new(LineConnection {
            lines: reader.lines(),
            resume_at: None,
        }))
    }
}

struct LineConnection {
    lines: Lines<BoxedReader>,
    // Pending `sleep`, kept here so a cancelled wait resumes where it left off
    resume_at: Option<Instant>,
}

enum Line {
    Face(Face),
    Sleep(std::time::Duration),
    Skip,
}

fn parse_line(line: &str) -> Result<Line, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(Line::Skip);
    }
    if let Some(rest) = line.strip_prefix("sleep") {
        return parse_duration(rest)
            .map(Line::Sleep)
            .map_err(|e| e.to_string());
    }
    line.parse::<u8>()
        .map(|v| Line::Face(Face(v)))
        .map_err(|_| format!("not a face number: '{}'", line))
}

#[async_trait]
impl DeviceConnection for LineConnection {
    async fn next_reading(&mut self) -> Result<Option<Face>, ConnectionError> {
        loop {
            if let Some(at) = self.resume_at {
                tokio::time::sleep_until(at).await;
                self.resume_at = None;
            }

            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| ConnectionError::new(format!("read failed: {}", e)))?;
            let Some(line) = line else {
                return Ok(None);
            };

            match parse_line(&line) {
                Ok(Line::Face(face)) => return Ok(Some(face)),
                Ok(Line::Sleep(duration)) => self.resume_at = Some(Instant::now() + duration),
                Ok(Line::Skip) => {}
                Err(e) => warn!("Skipping input line: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reads_faces_and_skips_noise() {
        let transport = LineTransport::new(&b"1\n\n# comment\nbogus\n3\n"[..]);
        let mut conn = transport.connect("stdin").await.unwrap();
        assert_eq!(conn.next_reading().await.unwrap(), Some(Face(1)));
        assert_eq!(conn.next_reading().await.unwrap(), Some(Face(3)));
        assert_eq!(conn.next_reading().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_connect_only_once() {
        let transport = LineTransport::new(&b"1\n"[..]);
        assert!(transport.connect("stdin").await.is_ok());
        assert!(transport.connect("stdin").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_directive_delays_next_reading() {
        let transport = LineTransport::new(&b"2\nsleep 1500ms\n4\n"[..]);
        let mut conn = transport.connect("stdin").await.unwrap();
        let start = Instant::now();
        assert_eq!(conn.next_reading().await.unwrap(), Some(Face(2)));
        assert_eq!(conn.next_reading().await.unwrap(), Some(Face(4)));
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_line() {
        assert!(matches!(parse_line(" 7 "), Ok(Line::Face(Face(7)))));
        assert!(matches!(parse_line("sleep 2s"), Ok(Line::Sleep(d)) if d == Duration::from_secs(2)));
        assert!(matches!(parse_line("# x"), Ok(Line::Skip)));
        assert!(parse_line("300").is_err());
        assert!(parse_line("sleep").is_err());
    }
}
