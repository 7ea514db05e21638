pub mod errors;
pub mod flags;
pub mod login;
pub mod orchestrator;
pub mod progress;
pub mod record;
pub mod registry;
pub mod request;
pub mod resume;

pub use errors::DownloadError;
pub use flags::ProcessFlags;
pub use login::{LoginSequencer, LoginState};
pub use orchestrator::{Flow, Orchestrator, OrchestratorConfig};
pub use progress::ProgressReporter;
pub use record::TransferRecord;
pub use registry::DownloadRegistry;
pub use request::{XdccRequest, parse_channels, parse_downloads, random_nick};
pub use resume::{ResumeDecision, resolve_offer};
