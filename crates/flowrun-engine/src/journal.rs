use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use flowrun_core::hub::{Hub, Observer};
use flowrun_core::message::LifecycleMessage;
use flowrun_core::types::FlowId;

/// JSONL lifecycle journal.
///
/// Attaches to the hub like any other observer and writes one JSON object
/// per lifecycle message. Each line is flushed as it is written, so a crash
/// loses at most the message in flight. Messages dropped by the hub because
/// the journal fell behind are not recovered.
pub struct FlowJournal {
    log_dir: PathBuf,
    level: u8,
}

/// A single line of the journal.
#[derive(Serialize)]
struct JournalEntry {
    recorded_at: String,
    flow_id: FlowId,
    event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
    detail: serde_json::Value,
}

impl FlowJournal {
    /// Create a new journal.
    ///
    /// Lines go to `{log_dir}/{timestamp}.jsonl`.
    /// `level` controls verbosity: 1=flow events, 2=+node events, 3=+status pushes.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    /// Attach to the hub now and write in a background task until
    /// cancellation.
    ///
    /// Attaching happens before this returns, so nothing published afterwards
    /// is missed for lack of a subscription.
    pub fn start(self, hub: Arc<Hub>, cancel: CancellationToken) -> JoinHandle<()> {
        let observer = hub.attach();
        tokio::spawn(async move {
            let id = observer.id();
            self.run(observer, cancel).await;
            hub.detach(id);
        })
    }

    async fn run(self, mut observer: Observer, cancel: CancellationToken) {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create journal directory");
            return;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_path = self.log_dir.join(format!("{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open journal file");
                return;
            }
        };

        info!(path = %log_path.display(), "Journal started");
        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Write whatever was already queued before stopping.
                    while let Some(payload) = observer.try_recv() {
                        if !self.write_payload(&mut writer, &payload).await {
                            break;
                        }
                    }
                    debug!("Journal cancelled");
                    break;
                }
                payload = observer.recv() => {
                    let Some(payload) = payload else {
                        debug!("Journal detached from hub");
                        break;
                    };
                    if !self.write_payload(&mut writer, &payload).await {
                        break;
                    }
                }
            }
        }

        // Final flush
        writer.flush().await.ok();
        debug!(path = %log_path.display(), "Journal finished");
    }

    /// Decode, filter and append one payload. Returns false once the file is
    /// no longer writable.
    async fn write_payload(
        &self,
        writer: &mut tokio::io::BufWriter<tokio::fs::File>,
        payload: &[u8],
    ) -> bool {
        let message = match LifecycleMessage::decode(payload) {
            Ok(Some(m)) => m,
            Ok(None) => return true,
            Err(e) => {
                warn!(error = %e, "Undecodable hub payload");
                return true;
            }
        };

        let Some(entry) = self.message_to_entry(&message) else {
            return true;
        };

        if let Ok(json) = serde_json::to_string(&entry) {
            let line = format!("{}\n", json);
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                error!(error = %e, "Failed to write journal entry");
                return false;
            }
            // Flush after each entry for crash resilience
            if let Err(e) = writer.flush().await {
                error!(error = %e, "Failed to flush journal");
            }
        }
        true
    }

    /// Convert a message to a journal line (None if filtered by level).
    fn message_to_entry(&self, message: &LifecycleMessage) -> Option<JournalEntry> {
        let required = match message {
            LifecycleMessage::FlowStarted { .. }
            | LifecycleMessage::FlowCompleted { .. }
            | LifecycleMessage::FlowFailed { .. } => 1,
            LifecycleMessage::NodeStarted { .. } | LifecycleMessage::NodeCompleted { .. } => 2,
            LifecycleMessage::FlowStatus(_) => 3,
        };
        if self.level < required {
            return None;
        }

        let detail = serde_json::to_value(message)
            .ok()
            .and_then(|mut v| v.get_mut("payload").map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null);

        Some(JournalEntry {
            recorded_at: Utc::now().to_rfc3339(),
            flow_id: message.flow_id(),
            event_type: message.kind().to_string(),
            node_id: message.node_id().map(str::to_string),
            detail,
        })
    }
}
