pub mod backup;
pub mod bluetooth;
pub mod capture;
pub mod identifier;
pub mod models;
pub mod poll;
pub mod state;
pub mod targets;
pub mod transfer_engine;

pub use backup::{BackupReport, BackupRunner};
pub use bluetooth::{LinkStatus, SpeakerManager};
pub use capture::{MicManager, QualityPreset, RecordDuration};
pub use identifier::DeviceIdentifier;
pub use models::{DeviceSessionState, SourceSpec, TransferOutcome, TransferResult};
pub use poll::{PollPolicy, poll_until};
pub use state::StateStore;
pub use targets::{ALL_TARGETS, Resolution, resolve, resolve_many};
