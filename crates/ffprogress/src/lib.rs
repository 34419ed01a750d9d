//! Decoder and loopback sink for ffmpeg's `-progress` telemetry.
//!
//! ffmpeg, pointed at `-progress tcp://host:port`, dials the address and
//! streams newline-delimited ASCII `key=value` records. A block of records
//! ends with a `progress=continue` line while the encode is running, or
//! `progress=end` once the output is finished. [`ProgressDecoder`] turns
//! that stream into [`Progress`] snapshots; [`ProgressSink`] owns the
//! listening socket and feeds a caller-supplied observer.

use std::io;
use std::net::SocketAddr;
use std::sync::LazyLock;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

static BITRATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)kbits/s").expect("valid bitrate regex"));

/// Encode state reported by the last `progress=` record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProgressStatus {
    /// The encoder is still producing output (`progress=continue`).
    #[default]
    Running,
    /// The encoder finished its output (`progress=end`).
    Finished,
}

/// One decoded telemetry snapshot.
///
/// ffmpeg repeats only the fields it refreshed in each block and the
/// decoder resets after every emitted snapshot, so absent fields carry
/// their zero values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    /// Index of the most recently encoded frame.
    pub frame: u64,
    /// Encoding rate as reported, kept as an opaque display string.
    pub fps: String,
    /// Output bitrate in bits per second; 0 when reported as `N/A`.
    pub bitrate: u64,
    /// Total bytes written so far; 0 when reported as `N/A`.
    pub total_size: u64,
    /// Elapsed output time in microseconds — the `out_time_ms` key reports
    /// microseconds despite its name. Negative values decode to 0.
    pub out_time_us: u64,
    /// Frames duplicated to keep the output rate.
    pub dup_frames: u32,
    /// Frames dropped to keep the output rate.
    pub drop_frames: u32,
    /// Encode speed relative to realtime (e.g. `1.02x`), opaque string.
    pub speed: String,
    /// Whether the encoder is still running.
    pub status: ProgressStatus,
}

/// Incremental decoder for the `key=value` record stream.
///
/// Fields accumulate until a `progress=` record completes the snapshot;
/// the accumulator is reset on `continue` as well as `end`, matching
/// ffmpeg's per-block cadence.
#[derive(Debug, Default)]
pub struct ProgressDecoder {
    current: Progress,
}

impl ProgressDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line of the stream.
    ///
    /// Returns a completed snapshot when the line is a `progress=` record,
    /// `None` otherwise. Unknown keys are ignored and unparseable values
    /// degrade to the field's zero value; telemetry loss must never abort
    /// an in-flight encode.
    pub fn push_line(&mut self, line: &str) -> Option<Progress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "frame" => self.current.frame = value.parse().unwrap_or(0),
            "fps" => self.current.fps = value.to_string(),
            "bitrate" => self.current.bitrate = parse_bitrate(value),
            "total_size" => self.current.total_size = parse_unsigned(value),
            "out_time_ms" => {
                // Goes negative while ffmpeg settles initial timestamps.
                self.current.out_time_us = if value.starts_with('-') {
                    0
                } else {
                    value.parse().unwrap_or(0)
                };
            }
            "dup_frames" => self.current.dup_frames = value.parse().unwrap_or(0),
            "drop_frames" => self.current.drop_frames = value.parse().unwrap_or(0),
            "speed" => self.current.speed = value.to_string(),
            "progress" => {
                self.current.status = if value == "end" {
                    ProgressStatus::Finished
                } else {
                    ProgressStatus::Running
                };
                return Some(std::mem::take(&mut self.current));
            }
            _ => {}
        }
        None
    }
}

/// Parse a bitrate value such as `512.3kbits/s` into bits per second.
fn parse_bitrate(value: &str) -> u64 {
    BITRATE_RE
        .captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|kbits| (kbits * 1000.0).round() as u64)
        .unwrap_or(0)
}

/// Parse an unsigned numeric value, treating `N/A` and malformed input as 0.
fn parse_unsigned(value: &str) -> u64 {
    value.parse().unwrap_or(0)
}

/// Loopback listener that receives one encoder's telemetry stream.
pub struct ProgressSink {
    listener: TcpListener,
    addr: SocketAddr,
}

impl ProgressSink {
    /// Bind an ephemeral loopback port.
    pub async fn bind() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The address in the form ffmpeg's `-progress` option expects.
    pub fn progress_url(&self) -> String {
        format!("tcp://{}", self.addr)
    }

    /// Accept exactly one connection and decode its stream, invoking
    /// `on_progress` for every completed snapshot.
    ///
    /// Returns when the peer reports `progress=end`, closes the
    /// connection, or — before any connection arrived — when `token` is
    /// cancelled. Once a connection is established the token is no longer
    /// consulted, so a final `end` block is never cut short.
    pub async fn serve<F>(self, token: CancellationToken, mut on_progress: F)
    where
        F: FnMut(Progress) + Send + 'static,
    {
        let (stream, peer) = tokio::select! {
            _ = token.cancelled() => {
                debug!(addr = %self.addr, "progress sink closed before the encoder connected");
                return;
            }
            accepted = self.listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(addr = %self.addr, error = %e, "failed to accept progress connection");
                    return;
                }
            },
        };
        debug!(%peer, "encoder connected to progress sink");

        let mut lines = BufReader::new(stream).lines();
        let mut decoder = ProgressDecoder::new();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(snapshot) = decoder.push_line(&line) {
                        let finished = snapshot.status == ProgressStatus::Finished;
                        on_progress(snapshot);
                        if finished {
                            debug!("encoder reported end of progress");
                            return;
                        }
                    }
                }
                Ok(None) => {
                    debug!("encoder closed the progress connection");
                    return;
                }
                Err(e) => {
                    debug!(error = %e, "error reading progress stream");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    fn decode_all(input: &str) -> Vec<Progress> {
        let mut decoder = ProgressDecoder::new();
        input.lines().filter_map(|l| decoder.push_line(l)).collect()
    }

    #[test]
    fn full_block_emits_running_snapshot() {
        let snapshots = decode_all(
            "frame=120\nfps=5.0\nbitrate=512.3kbits/s\ntotal_size=4096\nout_time_ms=24000000\nspeed=1.02x\nprogress=continue\n",
        );
        assert_eq!(snapshots.len(), 1);
        let p = &snapshots[0];
        assert_eq!(p.frame, 120);
        assert_eq!(p.fps, "5.0");
        assert_eq!(p.bitrate, 512_300);
        assert_eq!(p.total_size, 4096);
        assert_eq!(p.out_time_us, 24_000_000);
        assert_eq!(p.speed, "1.02x");
        assert_eq!(p.status, ProgressStatus::Running);
    }

    #[test]
    fn not_available_fields_decode_to_zero() {
        let snapshots = decode_all("bitrate=N/A\ntotal_size=N/A\nprogress=end\n");
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].bitrate, 0);
        assert_eq!(snapshots[0].total_size, 0);
        assert_eq!(snapshots[0].status, ProgressStatus::Finished);
    }

    #[test]
    fn malformed_values_degrade_instead_of_panicking() {
        let snapshots =
            decode_all("bitrate=-5kbits/s\nout_time_ms=-1\nframe=oops\ndup_frames=-3\nprogress=continue\n");
        assert_eq!(snapshots.len(), 1);
        // The sign is not part of the bitrate capture, so the magnitude survives.
        assert_eq!(snapshots[0].bitrate, 5_000);
        assert_eq!(snapshots[0].out_time_us, 0);
        assert_eq!(snapshots[0].frame, 0);
        assert_eq!(snapshots[0].dup_frames, 0);

        assert_eq!(decode_all("bitrate=garbage\nprogress=end\n")[0].bitrate, 0);
    }

    #[test]
    fn accumulator_resets_on_every_continue() {
        let snapshots = decode_all(
            "frame=10\nspeed=0.9x\nprogress=continue\ndrop_frames=2\nprogress=continue\nprogress=end\n",
        );
        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[0].frame, 10);
        assert_eq!(snapshots[0].speed, "0.9x");
        // Second block is sparse: the first block's fields must not leak in.
        assert_eq!(snapshots[1].frame, 0);
        assert_eq!(snapshots[1].speed, "");
        assert_eq!(snapshots[1].drop_frames, 2);
        assert_eq!(snapshots[2], Progress {
            status: ProgressStatus::Finished,
            ..Progress::default()
        });
    }

    #[test]
    fn unknown_keys_and_noise_are_ignored() {
        let mut decoder = ProgressDecoder::new();
        assert_eq!(decoder.push_line(""), None);
        assert_eq!(decoder.push_line("no separator here"), None);
        assert_eq!(decoder.push_line("stream_0_0_q=28.0"), None);
        let snapshot = decoder.push_line("progress=end").expect("snapshot");
        assert_eq!(snapshot.status, ProgressStatus::Finished);
    }

    #[tokio::test]
    async fn sink_delivers_snapshots_from_one_connection() {
        let sink = ProgressSink::bind().await.expect("bind loopback");
        let addr = sink.local_addr();
        assert_eq!(sink.progress_url(), format!("tcp://{addr}"));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let server = tokio::spawn(sink.serve(CancellationToken::new(), move |p| {
            let _ = tx.send(p);
        }));

        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream
            .write_all(b"frame=3\nprogress=continue\nframe=9\nprogress=end\n")
            .await
            .expect("write telemetry");
        drop(stream);

        let first = rx.recv().await.expect("first snapshot");
        assert_eq!(first.frame, 3);
        assert_eq!(first.status, ProgressStatus::Running);
        let second = rx.recv().await.expect("second snapshot");
        assert_eq!(second.frame, 9);
        assert_eq!(second.status, ProgressStatus::Finished);
        server.await.expect("serve task");
    }

    #[tokio::test]
    async fn cancelled_sink_exits_without_a_connection() {
        let sink = ProgressSink::bind().await.expect("bind loopback");
        let token = CancellationToken::new();
        let server = tokio::spawn(sink.serve(token.clone(), |_| {}));
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), server)
            .await
            .expect("serve returns after cancellation")
            .expect("serve task");
    }
}
