//! Live viewer socket.
//!
//! Serves newline-delimited JSON snapshots over a Unix domain socket. Every
//! client receives the latest snapshot of each equipment on connect, then
//! one line per published change:
//!
//! ```json
//! {"equipment":"gc-01","sequence":42,"captured_at_ms":1700000000000,"state":{...}}
//! ```
//!
//! A client that stops reading falls behind and skips snapshots; a client
//! whose socket fails is dropped and its subscriptions removed.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::publisher::{ChangePublisher, SubscriberId};
use crate::sinks::ChannelSink;
use crate::store::Snapshot;

/// Pending snapshots per client before it starts skipping.
const CLIENT_QUEUE: usize = 32;

/// Unix socket server streaming snapshots to viewers.
pub struct ViewerServer {
    listener: UnixListener,
    path: PathBuf,
    publishers: Vec<Arc<ChangePublisher>>,
}

impl ViewerServer {
    /// Bind `path`, replacing a stale socket file. Must be called inside a
    /// tokio runtime.
    pub fn bind(
        path: impl AsRef<Path>,
        publishers: Vec<Arc<ChangePublisher>>,
    ) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale viewer socket {:?}", path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        let listener = UnixListener::bind(&path)?;
        Ok(Self {
            listener,
            path,
            publishers,
        })
    }

    /// Socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept clients until `shutdown` turns true, then remove the socket.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("👀 Viewer socket listening on {:?}", self.path);
        let mut next_client = 0u64;

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        next_client += 1;
                        let client = Client::attach(next_client, &self.publishers);
                        tokio::spawn(client.serve(stream));
                    }
                    Err(e) => warn!("Viewer accept failed: {}", e),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Could not remove viewer socket {:?}: {}", self.path, e);
        }
        info!("Viewer socket closed");
    }
}

struct Client {
    id: u64,
    rx: mpsc::Receiver<Arc<Snapshot>>,
    initial: Vec<Arc<Snapshot>>,
    subscriptions: Vec<(Arc<ChangePublisher>, SubscriberId)>,
}

impl Client {
    fn attach(id: u64, publishers: &[Arc<ChangePublisher>]) -> Self {
        let (sink, rx) = ChannelSink::channel(format!("viewer-{id}"), CLIENT_QUEUE);
        let sink = Arc::new(sink);
        let mut initial = Vec::new();
        let mut subscriptions = Vec::new();
        for publisher in publishers {
            subscriptions.push((Arc::clone(publisher), publisher.subscribe(sink.clone())));
            initial.extend(publisher.store().current());
        }
        Self {
            id,
            rx,
            initial,
            subscriptions,
        }
    }

    async fn serve(mut self, mut stream: UnixStream) {
        debug!("Viewer {} connected", self.id);
        let initial = std::mem::take(&mut self.initial);
        // Last sequence written per equipment.
        let mut sent: Vec<(String, u64)> = Vec::with_capacity(initial.len());

        let result = async {
            for snapshot in &initial {
                write_line(&mut stream, snapshot).await?;
                sent.push((snapshot.equipment.clone(), snapshot.sequence));
            }
            while let Some(snapshot) = self.rx.recv().await {
                match sent.iter_mut().find(|(e, _)| *e == snapshot.equipment) {
                    Some((_, last)) if snapshot.sequence <= *last => continue,
                    Some((_, last)) => *last = snapshot.sequence,
                    None => sent.push((snapshot.equipment.clone(), snapshot.sequence)),
                }
                write_line(&mut stream, &snapshot).await?;
            }
            Ok::<(), io::Error>(())
        }
        .await;

        if let Err(e) = result {
            debug!("Viewer {} dropped: {}", self.id, e);
        }
        for (publisher, id) in &self.subscriptions {
            publisher.unsubscribe(*id);
        }
    }
}

async fn write_line(stream: &mut UnixStream, snapshot: &Snapshot) -> io::Result<()> {
    let mut line = serde_json::to_vec(&snapshot.to_message()).map_err(io::Error::other)?;
    line.push(b'\n');
    stream.write_all(&line).await
}
