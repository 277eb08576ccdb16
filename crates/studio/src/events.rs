use ai_pipeline::AssetHandle;
use crossbeam_channel::{unbounded, Receiver, Sender};
use jobs::SequenceProgress;
use tracing::debug;

/// Changes to the working view, for whoever renders it
#[derive(Debug, Clone)]
pub enum StudioEvent {
    /// Full result list after a change
    Results(Vec<AssetHandle>),
    /// Selected indices in selection order
    Selection(Vec<usize>),
    BulkProgress(SequenceProgress),
    /// Error banner set or cleared
    Banner(Option<String>),
    HistoryChanged,
}

#[derive(Clone, Default)]
pub(crate) struct StudioEvents {
    subscribers: Vec<Sender<StudioEvent>>,
}

impl StudioEvents {
    pub(crate) fn subscribe(&mut self) -> Receiver<StudioEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Drop every sender; subscribers see their channel disconnect
    pub(crate) fn clear(&mut self) {
        self.subscribers.clear();
    }

    pub(crate) fn emit(&mut self, event: StudioEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if self.subscribers.is_empty() {
            debug!("no studio subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_disconnects_subscribers() {
        let mut events = StudioEvents::default();
        let rx = events.subscribe();
        events.emit(StudioEvent::HistoryChanged);
        events.clear();
        events.emit(StudioEvent::Banner(None));

        let seen: Vec<StudioEvent> = rx.iter().collect();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], StudioEvent::HistoryChanged));
    }
}
