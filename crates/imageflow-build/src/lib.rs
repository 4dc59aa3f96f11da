//! imageflow image build orchestration
//!
//! This crate decides, per artifact, how to build a container image (Docker API
//! or `docker build`, optionally with BuildKit), whether to push it to a
//! registry, and which reference a deployment manifest should use.

pub mod auth;
pub mod cache;
pub mod context;
pub mod docker;
pub mod engine;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod policy;
pub mod process;
pub mod reference;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::RegistryAuth;
pub use docker::{DockerEngine, split_image_tag};
pub use engine::{BuildRequest, ImageEngine, ImageMetadata};
pub use error::{BuildError, BuildPhase, BuildResult, EngineError, EngineResult};
pub use model::{
    Artifact, BuildOutcome, BuildReport, BuiltArtifact, BuiltImage, BuiltImages, Degradation,
    ImageTags, Staged,
};
pub use pipeline::{Builder, ConsoleWarnings, WarningSink, prune};
pub use policy::{BuildOptions, BuildPolicy, LocalBuild, resolve_policy};
pub use process::{CommandRunner, CommandSpec, SystemRunner};
pub use reference::unique_local_tag;
pub use strategy::BuildStrategy;
pub use tokio_util::sync::CancellationToken;
