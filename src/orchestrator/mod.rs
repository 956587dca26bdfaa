//! Pipeline acquisition, job waiting and artifact download.

pub mod acquire;
pub mod download;
pub mod run;
pub mod selector;
pub mod types;
pub mod wait;

pub use run::Coordinator;
pub use types::SavedArtifact;
