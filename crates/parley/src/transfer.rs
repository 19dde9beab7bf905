//! Chunked file relay.
//!
//! A transfer opens with a PUBLISH_FILE announce and continues with any
//! number of FILE_DATA chunks carrying the same message ID. Each chunk is
//! written to the transfer's sink and relayed to recipients right away;
//! the chunk flagged LAST closes the sink and ends the transfer.
//!
//! Transfers are keyed by the announcing connection as well as the message
//! ID, so two clients that both number their messages from 1 don't collide.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use parley_protocol::Packet;
use parley_session::SessionRegistry;
use parley_transport::ConnectionId;

use crate::router::{self, Route};
use crate::BrokerError;

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// A writable destination for one transfer.
pub type Sink = Box<dyn Write + Send>;

/// Where relayed files end up.
pub trait FileStore: Send + 'static {
    /// Opens `filename` for writing, replacing any earlier file of that name.
    ///
    /// `filename` is always a single path component.
    fn create(&mut self, filename: &str) -> io::Result<Sink>;
}

/// Writes files into a directory on disk.
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Creates the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FileStore for DiskStore {
    fn create(&mut self, filename: &str) -> io::Result<Sink> {
        let file = File::create(self.dir.join(filename))?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Keeps files in memory. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileStore {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents written so far under `filename`.
    pub fn contents(&self, filename: &str) -> Option<Vec<u8>> {
        self.lock().get(filename).cloned()
    }

    /// Sorted names of every file created.
    pub fn filenames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FileStore for MemoryFileStore {
    fn create(&mut self, filename: &str) -> io::Result<Sink> {
        self.lock().insert(filename.to_string(), Vec::new());
        Ok(Box::new(MemoryFile {
            name: filename.to_string(),
            files: Arc::clone(&self.files),
        }))
    }
}

struct MemoryFile {
    name: String,
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.entry(self.name.clone()).or_default().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

/// Identifies one in-flight transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferKey {
    pub origin: ConnectionId,
    pub message_id: u32,
}

struct Transfer {
    sender: String,
    route: Route,
    filename: String,
    sink: Sink,
    bytes: u64,
    last_activity: Instant,
}

/// Every in-flight transfer, plus the store new ones are opened in.
pub struct TransferTable {
    transfers: HashMap<TransferKey, Transfer>,
    files: Box<dyn FileStore>,
}

impl TransferTable {
    pub fn new(files: Box<dyn FileStore>) -> Self {
        Self {
            transfers: HashMap::new(),
            files,
        }
    }

    /// Admits a transfer announced by `origin`.
    ///
    /// # Errors
    /// - [`BrokerError::UserUnavailable`] / [`BrokerError::NoSubscribers`]:
    ///   the target is unreachable, nothing is opened
    /// - [`BrokerError::SinkUnavailable`]: the file couldn't be created
    pub(crate) fn announce(
        &mut self,
        registry: &SessionRegistry,
        origin: ConnectionId,
        packet: &Packet,
    ) -> Result<(), BrokerError> {
        let route = Route::of(packet);
        router::check_reachable(registry, &route)?;

        let filename = resolve_filename(&packet.payload_text(), &packet.sender, route.target());
        let sink = self
            .files
            .create(&filename)
            .map_err(|source| BrokerError::SinkUnavailable {
                filename: filename.clone(),
                source,
            })?;

        let key = TransferKey {
            origin,
            message_id: packet.message_id,
        };
        tracing::info!(
            %origin,
            message_id = key.message_id,
            sender = %packet.sender,
            target = route.target(),
            %filename,
            "file transfer started"
        );
        let previous = self.transfers.insert(
            key,
            Transfer {
                sender: packet.sender.clone(),
                route,
                filename,
                sink,
                bytes: 0,
                last_activity: Instant::now(),
            },
        );
        if let Some(previous) = previous {
            tracing::warn!(
                %origin,
                message_id = key.message_id,
                filename = %previous.filename,
                "announce replaced an unfinished transfer"
            );
        }
        Ok(())
    }

    /// Writes one chunk, relays it, and finishes the transfer on LAST.
    ///
    /// A private target that went offline mid-transfer just stops
    /// receiving chunks; the file is still written.
    ///
    /// # Errors
    /// - [`BrokerError::TransferNotFound`]: no transfer for this chunk
    /// - [`BrokerError::SinkUnavailable`]: the write failed; the transfer
    ///   is dropped
    pub(crate) fn write_chunk(
        &mut self,
        registry: &SessionRegistry,
        origin: ConnectionId,
        packet: &Packet,
    ) -> Result<(), BrokerError> {
        let key = TransferKey {
            origin,
            message_id: packet.message_id,
        };
        let transfer = self
            .transfers
            .get_mut(&key)
            .ok_or(BrokerError::TransferNotFound(packet.message_id))?;

        if let Err(source) = transfer.sink.write_all(&packet.payload) {
            let filename = transfer.filename.clone();
            self.transfers.remove(&key);
            return Err(BrokerError::SinkUnavailable { filename, source });
        }
        transfer.bytes += packet.payload.len() as u64;
        transfer.last_activity = Instant::now();

        let targets = router::recipients(registry, origin, &transfer.route);
        router::fan_out(registry, &targets, packet);

        if packet.is_last() {
            if let Some(mut done) = self.transfers.remove(&key) {
                if let Err(e) = done.sink.flush() {
                    tracing::warn!(filename = %done.filename, error = %e, "failed to flush file");
                }
                tracing::info!(
                    sender = %done.sender,
                    target = done.route.target(),
                    filename = %done.filename,
                    bytes = done.bytes,
                    "file transfer completed"
                );
            }
        }
        Ok(())
    }

    /// Drops every transfer announced by `origin`. Returns how many.
    pub(crate) fn discard_from(&mut self, origin: ConnectionId) -> usize {
        let before = self.transfers.len();
        self.transfers.retain(|key, transfer| {
            let keep = key.origin != origin;
            if !keep {
                tracing::info!(%origin, filename = %transfer.filename, "file transfer abandoned");
            }
            keep
        });
        before - self.transfers.len()
    }

    /// Drops transfers with no chunk for at least `idle`. Returns how many.
    pub(crate) fn expire_idle(&mut self, idle: Duration) -> usize {
        self.expire_idle_at(Instant::now(), idle)
    }

    fn expire_idle_at(&mut self, now: Instant, idle: Duration) -> usize {
        let before = self.transfers.len();
        self.transfers.retain(|key, transfer| {
            let keep = now.saturating_duration_since(transfer.last_activity) < idle;
            if !keep {
                tracing::info!(
                    origin = %key.origin,
                    message_id = key.message_id,
                    filename = %transfer.filename,
                    "file transfer expired"
                );
            }
            keep
        });
        before - self.transfers.len()
    }

    pub fn contains(&self, key: TransferKey) -> bool {
        self.transfers.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}

/// The name a transfer is stored under: the final path component of the
/// announced name, or `upload_<sender>_<target>` when that is empty.
pub fn resolve_filename(requested: &str, sender: &str, target: &str) -> String {
    let base = requested.rsplit(['/', '\\']).next().unwrap_or_default();
    match base {
        "" | "." | ".." => format!("upload_{sender}_{target}").replace(['/', '\\'], "_"),
        name => name.to_string(),
    }
}
