//! Package archiving
//!
//! Packages are written as gzip-compressed tarballs whose single top-level
//! entry is the version-named directory. The streaming variant runs the
//! encoder on a blocking worker and hands fixed-size chunks to the async side
//! through a bounded channel, so a download holds at most a few chunks in
//! memory no matter how large the package is.

use bytes::{Bytes, BytesMut};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ArchiveError;

/// Size of each chunk handed to the transport
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Number of chunks that may be queued ahead of a slow consumer
const CHANNEL_DEPTH: usize = 4;

/// A streaming archive body
///
/// Yields `Err` at most once, as its final item, when packaging fails part
/// way. Dropping the stream stops the packaging worker.
pub type PackageStream = ReceiverStream<io::Result<Bytes>>;

/// Write `dir` as a tar.gz with `name` as its single top-level directory
///
/// Symlinks are archived as symlinks and never followed.
pub fn write_package<W: Write>(dir: &Path, name: &str, writer: W) -> Result<W, ArchiveError> {
    let encoder = GzEncoder::new(writer, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    builder
        .append_dir_all(name, dir)
        .map_err(ArchiveError::Write)?;

    let encoder = builder.into_inner().map_err(ArchiveError::Write)?;
    encoder.finish().map_err(ArchiveError::Write)
}

/// Write `dir` to `<output_dir>/<name>.tar.gz` and return the file path
pub fn write_package_file(
    dir: &Path,
    name: &str,
    output_dir: &Path,
) -> Result<PathBuf, ArchiveError> {
    std::fs::create_dir_all(output_dir).map_err(|source| ArchiveError::Filesystem {
        action: "create output directory",
        path: output_dir.to_path_buf(),
        source,
    })?;

    let tarball_path = output_dir.join(format!("{name}.tar.gz"));
    let file = File::create(&tarball_path).map_err(|source| ArchiveError::Filesystem {
        action: "create",
        path: tarball_path.clone(),
        source,
    })?;

    let mut writer = write_package(dir, name, BufWriter::new(file))?;
    writer.flush().map_err(ArchiveError::Write)?;

    Ok(tarball_path)
}

/// Stream `dir` as a tar.gz with `name` as its top-level directory
///
/// Must be called from within a Tokio runtime.
pub fn stream_package(dir: PathBuf, name: String) -> PackageStream {
    let label = name.clone();
    spawn_packager(label, move |writer| write_package(&dir, &name, writer))
}

/// Run `produce` on a blocking worker, forwarding what it writes as a stream
///
/// The buffered tail is only released after `produce` succeeds, so a failed
/// run never ends on bytes that look like a finished archive.
fn spawn_packager<F>(name: String, produce: F) -> PackageStream
where
    F: FnOnce(ChannelWriter) -> Result<ChannelWriter, ArchiveError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);

    tokio::task::spawn_blocking(move || {
        let writer = ChannelWriter::new(tx.clone());

        let result = produce(writer)
            .and_then(|mut writer| writer.flush().map_err(ArchiveError::Write));

        match result {
            Ok(()) => tracing::info!("Streamed package {}", name),
            Err(_) if tx.is_closed() => {
                tracing::debug!("Consumer of package {} went away, stopped packaging", name);
            }
            Err(e) => {
                tracing::error!("Packaging {} failed mid-stream: {}", name, e);
                let kind = match &e {
                    ArchiveError::Write(io) => io.kind(),
                    _ => io::ErrorKind::Other,
                };
                let _ = tx.blocking_send(Err(io::Error::new(kind, e.to_string())));
            }
        }
    });

    ReceiverStream::new(rx)
}

/// `Write` adapter that forwards fixed-size chunks into a bounded channel
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buffer: BytesMut,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self {
            tx,
            buffer: BytesMut::with_capacity(CHUNK_SIZE),
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let chunk = self.buffer.split().freeze();
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive consumer went away"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        // a full chunk leaves only once more data follows it; flush sends the tail
        if self.buffer.len() >= CHUNK_SIZE {
            self.send_buffered()?;
        }

        let room = CHUNK_SIZE - self.buffer.len();
        let taken = data.len().min(room);
        self.buffer.extend_from_slice(&data[..taken]);

        Ok(taken)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::collections::BTreeSet;
    use tempfile::TempDir;
    use tokio_stream::StreamExt;

    fn sample_package() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("bin")).unwrap();
        std::fs::write(temp_dir.path().join("README.md"), "hello").unwrap();
        std::fs::write(temp_dir.path().join("bin/app"), vec![7u8; 200_000]).unwrap();
        temp_dir
    }

    /// Incompressible bytes, so gzip output grows with the input
    fn noise(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed | 1;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            })
            .collect()
    }

    #[cfg(unix)]
    /// Drain a stream into its data bytes, the positions of its errors and its length
    async fn drain(stream: &mut PackageStream) -> (Vec<u8>, Vec<usize>, usize) {
        let mut bytes = Vec::new();
        let mut error_positions = Vec::new();
        let mut position = 0;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => bytes.extend_from_slice(&chunk),
                Err(_) => error_positions.push(position),
            }
            position += 1;
        }
        (bytes, error_positions, position)
    }

    fn decodes_completely(bytes: &[u8]) -> bool {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        let entries = match archive.entries() {
            Ok(entries) => entries,
            Err(_) => return false,
        };
        for entry in entries {
            let mut entry = match entry {
                Ok(entry) => entry,
                Err(_) => return false,
            };
            if io::copy(&mut entry, &mut io::sink()).is_err() {
                return false;
            }
        }
        let mut rest = Vec::new();
        io::Read::read_to_end(&mut archive.into_inner(), &mut rest).is_ok()
    }

    fn entry_paths(bytes: &[u8]) -> BTreeSet<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_single_top_level_entry() {
        let package = sample_package();
        let bytes = write_package(package.path(), "1.2.0", Vec::new()).unwrap();

        let paths = entry_paths(&bytes);
        assert!(paths.iter().all(|p| p.starts_with("1.2.0")));
        assert!(paths.contains("1.2.0/README.md"));
        assert!(paths.contains("1.2.0/bin/app"));
    }

    #[test]
    fn test_write_package_file() {
        let package = sample_package();
        let output = TempDir::new().unwrap();

        let path = write_package_file(package.path(), "1.2.0", output.path()).unwrap();
        assert_eq!(path, output.path().join("1.2.0.tar.gz"));

        let bytes = std::fs::read(&path).unwrap();
        assert!(entry_paths(&bytes).contains("1.2.0/README.md"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret"), "do not ship").unwrap();

        let package = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), package.path().join("link"))
            .unwrap();

        let bytes = write_package(package.path(), "1.0.0", Vec::new()).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(&bytes[..]));
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            if entry.path().unwrap().ends_with("link") {
                assert!(entry.header().entry_type().is_symlink());
                assert_eq!(entry.header().size().unwrap(), 0);
            }
        }
    }

    #[tokio::test]
    async fn test_stream_matches_direct_write() {
        let package = sample_package();
        let direct = write_package(package.path(), "1.2.0", Vec::new()).unwrap();

        let mut stream = stream_package(package.path().to_path_buf(), "1.2.0".to_string());
        let mut streamed = Vec::new();
        let mut chunks = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= CHUNK_SIZE);
            streamed.extend_from_slice(&chunk);
            chunks += 1;
        }

        assert!(chunks >= 1);
        assert_eq!(entry_paths(&streamed), entry_paths(&direct));
    }

    #[tokio::test]
    async fn test_missing_directory_ends_with_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut stream = stream_package(temp_dir.path().join("gone"), "1.0.0".to_string());

        let mut saw_error = false;
        while let Some(chunk) = stream.next().await {
            if chunk.is_err() {
                saw_error = true;
                assert!(stream.next().await.is_none());
                break;
            }
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_worker() {
        let package = TempDir::new().unwrap();
        for i in 0..32 {
            std::fs::write(package.path().join(format!("blob-{i}")), vec![i as u8; 256 * 1024])
                .unwrap();
        }

        let mut stream = stream_package(package.path().to_path_buf(), "1.0.0".to_string());
        let first = stream.next().await.unwrap().unwrap();
        assert!(!first.is_empty());
        drop(stream);
        // runtime shutdown blocks on the worker, so a hang here means it leaked
    }

    #[tokio::test]
    async fn test_failure_after_data_ends_with_single_error() {
        let mut stream = spawn_packager("4.0.0".to_string(), |writer| {
            let mut encoder = GzEncoder::new(writer, Compression::fast());
            encoder
                .write_all(&noise(5 * CHUNK_SIZE, 11))
                .map_err(ArchiveError::Write)?;
            Err(ArchiveError::Write(io::Error::new(
                io::ErrorKind::Other,
                "package source vanished",
            )))
        });

        let mut chunks = 0;
        let mut bytes = Vec::new();
        let mut errors = 0;
        while let Some(item) = stream.next().await {
            assert_eq!(errors, 0, "nothing may follow the error");
            match item {
                Ok(chunk) => {
                    chunks += 1;
                    bytes.extend_from_slice(&chunk);
                }
                Err(e) => {
                    errors += 1;
                    assert!(e.to_string().contains("package source vanished"));
                }
            }
        }

        assert!(chunks >= 4);
        assert_eq!(errors, 1);
        assert!(!decodes_completely(&bytes));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unarchivable_entry_ends_stream_with_error() {
        let package = TempDir::new().unwrap();
        for i in 0..16 {
            std::fs::write(
                package.path().join(format!("asset-{i:02}.bin")),
                noise(128 * 1024, i + 1),
            )
            .unwrap();
        }
        let _socket =
            std::os::unix::net::UnixListener::bind(package.path().join("control.sock")).unwrap();

        let mut stream = stream_package(package.path().to_path_buf(), "5.0.0".to_string());
        let (bytes, error_positions, items) = drain(&mut stream).await;

        assert_eq!(error_positions, vec![items - 1]);
        assert!(stream.next().await.is_none());
        assert!(bytes.is_empty() || !decodes_completely(&bytes));
    }
}
