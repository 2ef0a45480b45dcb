// src/rag/worker.rs — Background parse worker
//
// One worker per process. Documents are processed oldest-first; a
// failure is recorded on the document and never stops the loop.

use std::sync::Arc;
use std::time::Duration;

use super::RagStore;

const IDLE_POLL: Duration = Duration::from_secs(5);

pub fn spawn(rag: Arc<RagStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!("rag parse worker started");
        loop {
            let next = match rag.next_pending() {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("parse worker scan failed: {}", e);
                    None
                }
            };

            match next {
                Some((base, meta)) => {
                    tracing::info!("parsing '{}' in base '{}'", meta.filename, base);
                    rag.process_document(&base, meta).await;
                }
                None => {
                    // Sleep until an upload wakes us, or poll again.
                    tokio::select! {
                        _ = rag.wake.notified() => {}
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                    }
                }
            }
        }
    })
}
