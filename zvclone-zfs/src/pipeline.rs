//! The full-transfer stream pipeline.
//!
//! A transfer is a chain of independently scheduled stages connected by byte
//! streams: a source process (`zfs send`), an optional in-process codec, a
//! progress meter, and a sink (a receiving process or a bundle file). The
//! join step collects the exit status of **every** stage before the transfer
//! is declared successful — a truncated stream must fail the transfer even
//! when the downstream stage exits cleanly.

use crate::codec::Codec;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use tracing::debug;
use zvclone_core::error::{Result, ZvError};

/// Spawn a pipeline source: stdout piped, stderr captured.
pub fn spawn_source(program: &str, args: &[&str]) -> Result<Child> {
    debug!("pipeline source: {} {}", program, args.join(" "));
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            ZvError::Storage(format!(
                "failed to start '{} {}': {}",
                program,
                args.join(" "),
                e
            ))
        })
}

/// Spawn a pipeline sink: stdin piped, stderr captured.
pub fn spawn_sink(program: &str, args: &[&str]) -> Result<Child> {
    debug!("pipeline sink: {} {}", program, args.join(" "));
    Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            ZvError::Storage(format!(
                "failed to start '{} {}': {}",
                program,
                args.join(" "),
                e
            ))
        })
}

/// Stream a source process into a sink process through the progress meter.
///
/// Returns the number of bytes moved; any failing stage (source, copy, sink)
/// fails the whole transfer.
pub fn stream_to_sink(
    mut source: Child,
    source_name: &str,
    mut sink: Child,
    sink_name: &str,
    label: &str,
    estimated: Option<u64>,
) -> Result<u64> {
    let source_stderr = drain_stderr(&mut source);
    let sink_stderr = drain_stderr(&mut sink);

    let stdout = take_stdout(&mut source)?;
    let stdin = take_stdin(&mut sink)?;

    let pb = progress_bar(label, estimated);
    let copy_result: io::Result<u64> = {
        let mut reader = pb.wrap_read(stdout);
        let mut writer = stdin;
        io::copy(&mut reader, &mut writer)
        // writer drops here, closing the sink's stdin
    };
    pb.finish_and_clear();

    let mut failures = Vec::new();
    wait_stage(source_name, &mut source, source_stderr, &mut failures);
    if let Err(e) = &copy_result {
        failures.push(format!("stream copy: {}", e));
    }
    wait_stage(sink_name, &mut sink, sink_stderr, &mut failures);

    match (copy_result, failures.is_empty()) {
        (Ok(copied), true) => Ok(copied),
        _ => Err(ZvError::Storage(failures.join("; "))),
    }
}

/// Stream a source process into a file, optionally compressed.
///
/// On failure the partial output file is removed: an incomplete stream file
/// is useless to a restore and must not look like a finished artifact.
pub fn stream_to_file(
    mut source: Child,
    source_name: &str,
    path: &Path,
    codec: Codec,
    label: &str,
    estimated: Option<u64>,
) -> Result<u64> {
    let source_stderr = drain_stderr(&mut source);
    let stdout = take_stdout(&mut source)?;

    let pb = progress_bar(label, estimated);
    let write_result: io::Result<u64> = (|| {
        let file = File::create(path)?;
        let mut reader = pb.wrap_read(stdout);
        let mut encoder = StreamEncoder::new(codec, BufWriter::new(file))?;
        let copied = io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?.flush()?;
        Ok(copied)
    })();
    pb.finish_and_clear();

    let mut failures = Vec::new();
    wait_stage(source_name, &mut source, source_stderr, &mut failures);
    if let Err(e) = &write_result {
        failures.push(format!("encode/write: {}", e));
    }

    match (write_result, failures.is_empty()) {
        (Ok(copied), true) => Ok(copied),
        _ => {
            let _ = std::fs::remove_file(path);
            Err(ZvError::Storage(format!(
                "writing stream {} failed: {}",
                path.display(),
                failures.join("; ")
            )))
        }
    }
}

/// Stream a file into a sink process, decompressing on the way.
pub fn stream_from_file(
    path: &Path,
    codec: Codec,
    mut sink: Child,
    sink_name: &str,
    label: &str,
) -> Result<u64> {
    let sink_stderr = drain_stderr(&mut sink);
    let stdin = take_stdin(&mut sink)?;

    let pb = progress_bar(label, None);
    let copy_result: io::Result<u64> = (|| {
        let file = File::open(path)?;
        let decoder = StreamDecoder::new(codec, BufReader::new(file))?;
        let mut reader = pb.wrap_read(decoder);
        let mut writer = stdin;
        io::copy(&mut reader, &mut writer)
    })();
    pb.finish_and_clear();

    let mut failures = Vec::new();
    if let Err(e) = &copy_result {
        failures.push(format!("decode/stream copy: {}", e));
    }
    wait_stage(sink_name, &mut sink, sink_stderr, &mut failures);

    match (copy_result, failures.is_empty()) {
        (Ok(copied), true) => Ok(copied),
        _ => Err(ZvError::Storage(format!(
            "replaying stream {} failed: {}",
            path.display(),
            failures.join("; ")
        ))),
    }
}

fn take_stdout(child: &mut Child) -> Result<std::process::ChildStdout> {
    child
        .stdout
        .take()
        .ok_or_else(|| ZvError::Internal("pipeline source stdout was not captured".to_string()))
}

fn take_stdin(child: &mut Child) -> Result<std::process::ChildStdin> {
    child
        .stdin
        .take()
        .ok_or_else(|| ZvError::Internal("pipeline sink stdin was not captured".to_string()))
}

/// Drain a stage's stderr on its own thread so the pipe never backs up
/// while the byte stream is moving.
fn drain_stderr(child: &mut Child) -> thread::JoinHandle<String> {
    let stderr = child.stderr.take();
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut stream) = stderr {
            let _ = stream.read_to_string(&mut buf);
        }
        buf.trim().to_string()
    })
}

fn wait_stage(
    name: &str,
    child: &mut Child,
    stderr: thread::JoinHandle<String>,
    failures: &mut Vec<String>,
) {
    let stderr_text = stderr.join().unwrap_or_default();
    match child.wait() {
        Ok(status) if status.success() => {}
        Ok(status) => {
            let detail = if stderr_text.is_empty() {
                String::new()
            } else {
                format!(": {}", stderr_text)
            };
            failures.push(format!("{} exited with {:?}{}", name, status.code(), detail));
        }
        Err(e) => failures.push(format!("{}: wait failed: {}", name, e)),
    }
}

fn progress_bar(label: &str, estimated: Option<u64>) -> ProgressBar {
    let pb = match estimated {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::with_template(
                    "{msg:<20} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                )
                .expect("static progress template")
                .progress_chars("=> "),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{msg:<20} {spinner} {bytes} ({bytes_per_sec})")
                    .expect("static progress template"),
            );
            pb
        }
    };
    pb.set_message(label.to_string());
    pb
}

enum StreamEncoder<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
    Zstd(zstd::stream::write::Encoder<'static, W>),
}

impl<W: Write> StreamEncoder<W> {
    fn new(codec: Codec, writer: W) -> io::Result<Self> {
        Ok(match codec {
            Codec::None => StreamEncoder::Plain(writer),
            Codec::Gzip => StreamEncoder::Gzip(GzEncoder::new(writer, Compression::default())),
            Codec::Zstd => StreamEncoder::Zstd(zstd::stream::write::Encoder::new(writer, 0)?),
        })
    }

    fn finish(self) -> io::Result<W> {
        match self {
            StreamEncoder::Plain(w) => Ok(w),
            StreamEncoder::Gzip(e) => e.finish(),
            StreamEncoder::Zstd(e) => e.finish(),
        }
    }
}

impl<W: Write> Write for StreamEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            StreamEncoder::Plain(w) => w.write(buf),
            StreamEncoder::Gzip(e) => e.write(buf),
            StreamEncoder::Zstd(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            StreamEncoder::Plain(w) => w.flush(),
            StreamEncoder::Gzip(e) => e.flush(),
            StreamEncoder::Zstd(e) => e.flush(),
        }
    }
}

enum StreamDecoder<R: Read + io::BufRead> {
    Plain(R),
    Gzip(GzDecoder<R>),
    Zstd(zstd::stream::read::Decoder<'static, R>),
}

impl<R: Read + io::BufRead> StreamDecoder<R> {
    fn new(codec: Codec, reader: R) -> io::Result<Self> {
        Ok(match codec {
            Codec::None => StreamDecoder::Plain(reader),
            Codec::Gzip => StreamDecoder::Gzip(GzDecoder::new(reader)),
            Codec::Zstd => StreamDecoder::Zstd(zstd::stream::read::Decoder::with_buffer(reader)?),
        })
    }
}

impl<R: Read + io::BufRead> Read for StreamDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            StreamDecoder::Plain(r) => r.read(buf),
            StreamDecoder::Gzip(d) => d.read(buf),
            StreamDecoder::Zstd(d) => d.read(buf),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    fn cat_source(path: &Path) -> Child {
        spawn_source("cat", &[path.to_str().unwrap()]).unwrap()
    }

    fn file_sink(path: &Path) -> Child {
        spawn_sink("sh", &["-c", &format!("cat > {}", path.to_str().unwrap())]).unwrap()
    }

    #[test]
    fn test_source_to_sink_moves_all_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        let output = dir.path().join("output");
        fs::write(&input, b"snapshot payload".repeat(1024)).unwrap();

        let copied = stream_to_sink(
            cat_source(&input),
            "cat",
            file_sink(&output),
            "sink",
            "test",
            None,
        )
        .unwrap();

        assert_eq!(copied, 16 * 1024);
        assert_eq!(fs::read(&output).unwrap(), fs::read(&input).unwrap());
    }

    #[test]
    fn test_file_round_trip_with_compression() {
        for codec in [Codec::None, Codec::Gzip, Codec::Zstd] {
            let dir = tempfile::tempdir().unwrap();
            let input = dir.path().join("input");
            let stream = dir.path().join(format!("disk{}", codec.stream_suffix()));
            let restored = dir.path().join("restored");
            fs::write(&input, b"0123456789".repeat(4096)).unwrap();

            stream_to_file(cat_source(&input), "cat", &stream, codec, "export", None).unwrap();
            stream_from_file(&stream, codec, file_sink(&restored), "sink", "restore").unwrap();

            assert_eq!(
                fs::read(&restored).unwrap(),
                fs::read(&input).unwrap(),
                "codec {}",
                codec
            );
        }
    }

    #[test]
    fn test_failing_source_fails_transfer_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let stream = dir.path().join("disk.zfs.stream");

        let source = spawn_source("sh", &["-c", "echo partial; exit 3"]).unwrap();
        let err =
            stream_to_file(source, "reader", &stream, Codec::None, "export", None).unwrap_err();

        assert!(matches!(err, ZvError::Storage(_)));
        assert!(err.to_string().contains("reader"));
        assert!(!stream.exists());
    }

    #[test]
    fn test_failing_sink_fails_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        fs::write(&input, b"payload".repeat(100_000)).unwrap();

        let sink = spawn_sink("sh", &["-c", "exit 2"]).unwrap();
        let err = stream_to_sink(cat_source(&input), "cat", sink, "receiver", "clone", None)
            .unwrap_err();

        assert!(matches!(err, ZvError::Storage(_)));
        assert!(err.to_string().contains("receiver"));
    }
}
