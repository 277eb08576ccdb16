use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Status narrative shown while a video job is being polled; cycles.
pub const PROGRESS_MESSAGES: [&str; 7] = [
    "Warming up the pixels...",
    "Choreographing the digital actors...",
    "Rendering the first few frames...",
    "Applying cinematic magic...",
    "Almost at the director's cut...",
    "Finalizing the special effects...",
    "Adding the final polish...",
];

pub const VIDEO_READY_MESSAGE: &str = "Video is ready! Preparing for download...";
pub const EXTENSION_READY_MESSAGE: &str = "Video extension is ready! Preparing for download...";
pub const ANIMATION_READY_MESSAGE: &str = "Animation is ready! Preparing for download...";
/// Failure reason for a job abandoned before it settled
pub const CANCELLED_MESSAGE: &str = "Cancelled because another job in the batch failed.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    /// Polling, with the current narrative message
    Running(String),
    /// Remote work finished, result being downloaded
    Finishing(String),
    Done,
    Failed(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed(_))
    }

    /// Human-readable line for this status
    pub fn message(&self) -> String {
        match self {
            JobStatus::Pending => "Generating...".to_string(),
            JobStatus::Running(msg) | JobStatus::Finishing(msg) => msg.clone(),
            JobStatus::Done => "Done".to_string(),
            JobStatus::Failed(reason) => format!("Failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobEvent {
    pub slot: usize,
    pub prompt: String,
    pub status: JobStatus,
}

/// Cycling cursor over a fixed message list
#[derive(Debug, Clone)]
pub struct Narrator {
    messages: &'static [&'static str],
    index: usize,
}

impl Default for Narrator {
    fn default() -> Self {
        Self::new(&PROGRESS_MESSAGES)
    }
}

impl Narrator {
    pub fn new(messages: &'static [&'static str]) -> Self {
        Self { messages, index: 0 }
    }

    /// The k-th call returns `messages[(k - 1) % len]`
    pub fn next_message(&mut self) -> &'static str {
        if self.messages.is_empty() {
            return "";
        }
        let msg = self.messages[self.index % self.messages.len()];
        self.index += 1;
        msg
    }
}

/// Producer side of the progress channel. Cheap to clone; each job writes
/// only its own slot.
#[derive(Clone, Default)]
pub struct ProgressSender {
    tx: Option<Sender<JobEvent>>,
}

impl ProgressSender {
    /// Unbounded channel; the receiver is the consumer's to drain
    pub fn channel() -> (ProgressSender, Receiver<JobEvent>) {
        let (tx, rx) = unbounded();
        (ProgressSender { tx: Some(tx) }, rx)
    }

    /// Sender that drops every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, slot: usize, prompt: &str, status: JobStatus) {
        debug!(slot, prompt, status = ?status, "job progress");
        if let Some(tx) = &self.tx {
            if tx
                .send(JobEvent {
                    slot,
                    prompt: prompt.to_string(),
                    status,
                })
                .is_err()
            {
                debug!(slot, "progress receiver dropped");
            }
        }
    }

    /// Reporter bound to one slot, with its own narrative cursor
    pub fn slot(&self, slot: usize, prompt: &str) -> SlotProgress {
        SlotProgress {
            sender: self.clone(),
            slot,
            prompt: prompt.to_string(),
            narrator: Narrator::default(),
            settled: AtomicBool::new(false),
        }
    }
}

/// Progress reporter for a single job. A reporter dropped before `done` or
/// `failed` reports the slot as cancelled, so no entry outlives its batch.
pub struct SlotProgress {
    sender: ProgressSender,
    slot: usize,
    prompt: String,
    narrator: Narrator,
    settled: AtomicBool,
}

impl SlotProgress {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn pending(&self) {
        self.sender.emit(self.slot, &self.prompt, JobStatus::Pending);
    }

    /// Emit the next narrative message
    pub fn advance(&mut self) {
        let msg = self.narrator.next_message();
        self.sender
            .emit(self.slot, &self.prompt, JobStatus::Running(msg.to_string()));
    }

    pub fn finishing(&self, message: &str) {
        self.sender
            .emit(self.slot, &self.prompt, JobStatus::Finishing(message.to_string()));
    }

    pub fn done(&self) {
        self.settled.store(true, Ordering::Relaxed);
        self.sender.emit(self.slot, &self.prompt, JobStatus::Done);
    }

    pub fn failed(&self, reason: impl ToString) {
        self.settled.store(true, Ordering::Relaxed);
        self.sender
            .emit(self.slot, &self.prompt, JobStatus::Failed(reason.to_string()));
    }
}

impl Drop for SlotProgress {
    fn drop(&mut self) {
        if !self.settled.load(Ordering::Relaxed) {
            debug!(slot = self.slot, "job dropped before settling");
            self.failed(CANCELLED_MESSAGE);
        }
    }
}

/// In-flight job as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub slot: usize,
    pub prompt: String,
    pub message: String,
}

/// Consumer-side projection: slot -> latest message. Entries leave the
/// board when their job settles.
#[derive(Debug, Default, Clone)]
pub struct ProgressBoard {
    entries: BTreeMap<usize, ProgressEntry>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins per slot
    pub fn apply(&mut self, event: &JobEvent) {
        if event.status.is_terminal() {
            self.entries.remove(&event.slot);
            return;
        }
        self.entries.insert(
            event.slot,
            ProgressEntry {
                slot: event.slot,
                prompt: event.prompt.clone(),
                message: event.status.message(),
            },
        );
    }

    /// Apply everything currently queued; returns how many events were seen
    pub fn drain(&mut self, rx: &Receiver<JobEvent>) -> usize {
        let mut seen = 0;
        for event in rx.try_iter() {
            self.apply(&event);
            seen += 1;
        }
        seen
    }

    /// Entries sorted by slot ascending
    pub fn entries(&self) -> impl Iterator<Item = &ProgressEntry> {
        self.entries.values()
    }

    pub fn get(&self, slot: usize) -> Option<&ProgressEntry> {
        self.entries.get(&slot)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Run every job concurrently; the first failure fails the whole set.
/// Outputs keep input order.
pub async fn join_all<I, F, T, E>(jobs: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    futures::future::try_join_all(jobs).await
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SequenceProgress {
    pub current: usize,
    pub total: usize,
}

/// Run `op` over `items` one at a time. A failing item does not stop the
/// rest; `after_each` sees the running count and that item's outcome.
pub async fn sequential_tolerant<T, U, E, F, Fut, A>(
    items: Vec<T>,
    mut op: F,
    mut after_each: A,
) -> Vec<Result<U, E>>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<U, E>>,
    A: FnMut(SequenceProgress, &Result<U, E>),
    E: std::fmt::Display,
{
    let total = items.len();
    let mut outcomes = Vec::with_capacity(total);

    for (i, item) in items.into_iter().enumerate() {
        let outcome = op(item).await;
        if let Err(e) = &outcome {
            warn!(item = i, "sequential step failed: {}", e);
        }
        after_each(
            SequenceProgress {
                current: i + 1,
                total,
            },
            &outcome,
        );
        outcomes.push(outcome);
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn narrator_cycles_with_period_seven() {
        let mut narrator = Narrator::default();
        let seen: Vec<&str> = (0..9).map(|_| narrator.next_message()).collect();
        assert_eq!(seen[0], "Warming up the pixels...");
        assert_eq!(seen[6], "Adding the final polish...");
        assert_eq!(seen[7], seen[0]);
        assert_eq!(seen[8], seen[1]);
    }

    #[test]
    fn board_is_last_write_wins_and_sorted() {
        let (tx, rx) = ProgressSender::channel();
        let mut b = tx.slot(2, "A dog");
        let mut a = tx.slot(0, "A cat");
        b.advance();
        a.advance();
        b.advance();

        let mut board = ProgressBoard::new();
        assert_eq!(board.drain(&rx), 3);
        let slots: Vec<usize> = board.entries().map(|e| e.slot).collect();
        assert_eq!(slots, vec![0, 2]);
        assert_eq!(
            board.get(2).map(|e| e.message.as_str()),
            Some("Choreographing the digital actors...")
        );

        b.done();
        a.failed("boom");
        board.drain(&rx);
        assert!(board.is_empty());
    }

    #[test]
    fn dropped_reporter_settles_its_slot() {
        let (tx, rx) = ProgressSender::channel();
        let mut abandoned = tx.slot(0, "A cat");
        abandoned.advance();
        let finished = tx.slot(1, "A dog");
        finished.done();
        drop(abandoned);
        drop(finished);

        let statuses: Vec<(usize, JobStatus)> =
            rx.try_iter().map(|e| (e.slot, e.status)).collect();
        assert_eq!(
            statuses,
            vec![
                (0, JobStatus::Running(PROGRESS_MESSAGES[0].to_string())),
                (1, JobStatus::Done),
                (0, JobStatus::Failed(CANCELLED_MESSAGE.to_string())),
            ]
        );
    }

    #[test]
    fn disabled_sender_is_silent() {
        let tx = ProgressSender::disabled();
        tx.emit(0, "x", JobStatus::Pending);
        tx.slot(1, "y").finishing(VIDEO_READY_MESSAGE);
    }

    #[tokio::test]
    async fn join_all_keeps_order() {
        let jobs = (0..4u64).map(|i| async move {
            tokio::time::sleep(Duration::from_millis(20 - i * 5)).await;
            Ok::<_, String>(i)
        });
        assert_eq!(join_all(jobs).await.unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn join_all_fails_fast() {
        let jobs = (0..3).map(|i| async move {
            if i == 1 {
                Err(format!("job {} failed", i))
            } else {
                Ok(i)
            }
        });
        assert_eq!(join_all(jobs).await.unwrap_err(), "job 1 failed");
    }

    #[tokio::test]
    async fn sequential_tolerant_survives_failures() {
        let mut progress = Vec::new();
        let outcomes = sequential_tolerant(
            vec![1, 2, 3],
            |n| async move {
                if n == 2 {
                    Err(format!("bad {}", n))
                } else {
                    Ok(n * 10)
                }
            },
            |p, _| progress.push(p),
        )
        .await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0], Ok(10));
        assert!(outcomes[1].is_err());
        assert_eq!(outcomes[2], Ok(30));
        assert_eq!(
            progress.last(),
            Some(&SequenceProgress {
                current: 3,
                total: 3
            })
        );
    }
}
