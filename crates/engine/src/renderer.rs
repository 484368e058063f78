use std::sync::Arc;
use std::sync::mpsc::Sender;

use pdf::file::FileOptions;
use scanner_core::LoadTicket;

use crate::EngineReport;

/// Opens a byte buffer and reports its page count, or why it could not be
/// opened, as an [`EngineReport::Opened`].
pub trait DocumentRenderer {
    fn open(&self, ticket: LoadTicket, bytes: Arc<[u8]>);
}

#[derive(Debug, Clone)]
pub struct PdfRenderer {
    reports: Sender<EngineReport>,
}

impl PdfRenderer {
    pub fn new(reports: Sender<EngineReport>) -> Self {
        Self { reports }
    }
}

impl DocumentRenderer for PdfRenderer {
    fn open(&self, ticket: LoadTicket, bytes: Arc<[u8]>) {
        let reports = self.reports.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("open-{ticket}"))
            .spawn(move || {
                let result = std::panic::catch_unwind(|| count_pages(&bytes))
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("pdf parser panicked")))
                    .map_err(|err| format!("{err:#}"));
                let _ = reports.send(EngineReport::Opened { ticket, result });
            });

        if let Err(err) = spawned {
            tracing::error!(%ticket, error = %err, "failed to spawn renderer thread");
            let _ = self.reports.send(EngineReport::Opened {
                ticket,
                result: Err(format!("could not start renderer: {err}")),
            });
        }
    }
}

pub fn count_pages(bytes: &[u8]) -> anyhow::Result<u32> {
    if bytes.is_empty() {
        anyhow::bail!("empty document");
    }
    let file = FileOptions::cached().load(bytes.to_vec())?;
    Ok(file.num_pages())
}
