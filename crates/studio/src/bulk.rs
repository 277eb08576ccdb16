use crate::events::StudioEvent;
use crate::session::Studio;
use ai_pipeline::{AssetHandle, GenerationError, GenerationResult};
use jobs::sequential_tolerant;
use tracing::{error, info};

pub const BULK_UPSCALE_FAILED: &str =
    "Failed to upscale one or more images. Check logs for details.";

/// Outcome counts of a bulk pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkReport {
    pub upscaled: usize,
    pub failed: usize,
}

impl Studio {
    /// Upscale every selected image that is not upscaled yet, one at a
    /// time. A failing image is logged and left as is; the rest carry on.
    /// The selection is cleared afterwards.
    pub async fn bulk_upscale(&mut self) -> GenerationResult<BulkReport> {
        let targets: Vec<usize> = self
            .selection
            .indices()
            .iter()
            .copied()
            .filter(|&i| {
                self.results
                    .get(i)
                    .is_some_and(|asset| asset.is_image() && !asset.is_upscaled)
            })
            .collect();

        if targets.is_empty() {
            return Err(self.fail(GenerationError::NothingToUpscale));
        }

        self.set_banner(None);
        info!(images = targets.len(), "bulk upscale started");

        let items: Vec<AssetHandle> = targets.iter().map(|&i| self.results[i].clone()).collect();
        let orchestrator = self.orchestrator.clone();
        let results = &mut self.results;
        let events = &mut self.events;
        let bulk_progress = &mut self.bulk_progress;

        *bulk_progress = Some(jobs::SequenceProgress {
            current: 0,
            total: targets.len(),
        });

        let outcomes = sequential_tolerant(
            items,
            |asset| {
                let orchestrator = orchestrator.clone();
                async move { orchestrator.upscale(&asset).await }
            },
            |progress, outcome| {
                let index = targets[progress.current - 1];
                match outcome {
                    Ok(upscaled) => results[index] = upscaled.clone(),
                    Err(e) => error!(index, "failed to upscale image: {}", e),
                }
                *bulk_progress = Some(progress);
                events.emit(StudioEvent::BulkProgress(progress));
                events.emit(StudioEvent::Results(results.clone()));
            },
        )
        .await;

        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        let report = BulkReport {
            upscaled: outcomes.len() - failed,
            failed,
        };

        if failed > 0 {
            self.set_banner(Some(BULK_UPSCALE_FAILED.to_string()));
        }
        self.bulk_progress = None;
        self.selection.clear();
        self.publish_selection();

        info!(upscaled = report.upscaled, failed = report.failed, "bulk upscale finished");
        Ok(report)
    }
}
