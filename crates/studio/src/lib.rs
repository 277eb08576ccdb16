//! Interactive session over the generation pipeline
//!
//! Holds the results of the latest batch, the image selection and the
//! single error banner, and drives generation, chained operations, bulk
//! upscaling, history and export on top of them.

pub mod bulk;
pub mod events;
pub mod export;
pub mod selection;
pub mod session;

pub use bulk::{BulkReport, BULK_UPSCALE_FAILED};
pub use events::StudioEvent;
pub use export::{export_assets, export_file_name};
pub use selection::{SelectionSet, MAX_SELECTION};
pub use session::Studio;
