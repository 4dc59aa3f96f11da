//! テスト用のインメモリ実装

use crate::engine::{BuildRequest, ImageEngine, ImageMetadata};
use crate::error::{EngineError, EngineResult};
use crate::model::Degradation;
use crate::pipeline::WarningSink;
use crate::process::{CommandRunner, CommandSpec};
use async_trait::async_trait;
use imageflow_config::{ClusterContext, ConfigError};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Build(String),
    Push(String),
    Tag(String, String),
    ImageId(String),
    Inspect(String),
    Pull(String),
    Prune(Vec<String>),
}

#[derive(Default)]
pub struct FakeEngine {
    images: Mutex<HashMap<String, String>>,
    digests: HashMap<String, String>,
    failing_pulls: HashSet<String>,
    failing_lookups: HashSet<String>,
    failing_builds: HashSet<String>,
    failing_pushes: HashSet<String>,
    failing_inspects: HashSet<String>,
    fail_tag: bool,
    calls: Mutex<Vec<Call>>,
    builds: Mutex<Vec<BuildRequest>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// ビルド結果として返す ID
    pub fn id_for(tag: &str) -> String {
        format!("sha256:{}", tag.replace([':', '/'], "-"))
    }

    pub fn with_image(mut self, reference: &str, id: &str) -> Self {
        self.images
            .get_mut()
            .unwrap()
            .insert(reference.to_string(), id.to_string());
        self
    }

    pub fn with_digest(mut self, tag: &str, digest: &str) -> Self {
        self.digests.insert(tag.to_string(), digest.to_string());
        self
    }

    pub fn failing_pull(mut self, image: &str) -> Self {
        self.failing_pulls.insert(image.to_string());
        self
    }

    pub fn failing_lookup(mut self, image: &str) -> Self {
        self.failing_lookups.insert(image.to_string());
        self
    }

    pub fn failing_build(mut self, tag: &str) -> Self {
        self.failing_builds.insert(tag.to_string());
        self
    }

    pub fn failing_push(mut self, tag: &str) -> Self {
        self.failing_pushes.insert(tag.to_string());
        self
    }

    pub fn failing_inspect(mut self, tag: &str) -> Self {
        self.failing_inspects.insert(tag.to_string());
        self
    }

    pub fn failing_tag(mut self) -> Self {
        self.fail_tag = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn built_tags(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Build(tag) => Some(tag),
                _ => None,
            })
            .collect()
    }

    pub fn last_build(&self) -> Option<BuildRequest> {
        self.builds.lock().unwrap().last().cloned()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ImageEngine for FakeEngine {
    async fn build(&self, request: &BuildRequest) -> EngineResult<String> {
        self.record(Call::Build(request.tag.clone()));
        self.builds.lock().unwrap().push(request.clone());

        if self.failing_builds.contains(&request.tag) {
            return Err(EngineError::BuildFailed("RUN exited with 1".to_string()));
        }

        let id = Self::id_for(&request.tag);
        self.images
            .lock()
            .unwrap()
            .insert(request.tag.clone(), id.clone());
        Ok(id)
    }

    async fn push(&self, tag: &str) -> EngineResult<String> {
        self.record(Call::Push(tag.to_string()));
        if self.failing_pushes.contains(tag) {
            return Err(EngineError::PushFailed {
                message: "denied: requested access to the resource is denied".to_string(),
            });
        }
        self.digests
            .get(tag)
            .cloned()
            .ok_or_else(|| EngineError::DigestNotFound(tag.to_string()))
    }

    async fn tag(&self, image_id: &str, tag: &str) -> EngineResult<()> {
        self.record(Call::Tag(image_id.to_string(), tag.to_string()));
        if self.fail_tag {
            return Err(EngineError::ImageNotFound(image_id.to_string()));
        }
        self.images
            .lock()
            .unwrap()
            .insert(tag.to_string(), image_id.to_string());
        Ok(())
    }

    async fn image_id(&self, reference: &str) -> EngineResult<Option<String>> {
        self.record(Call::ImageId(reference.to_string()));
        if self.failing_lookups.contains(reference) {
            return Err(EngineError::Io(std::io::Error::other("daemon unavailable")));
        }
        Ok(self.images.lock().unwrap().get(reference).cloned())
    }

    async fn inspect(&self, reference: &str) -> EngineResult<ImageMetadata> {
        self.record(Call::Inspect(reference.to_string()));
        if self.failing_inspects.contains(reference) {
            return Err(EngineError::ImageNotFound(reference.to_string()));
        }
        let id = self
            .images
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| EngineError::ImageNotFound(reference.to_string()))?;
        Ok(ImageMetadata {
            id,
            repo_tags: vec![reference.to_string()],
            repo_digests: Vec::new(),
        })
    }

    async fn pull(&self, image: &str) -> EngineResult<()> {
        self.record(Call::Pull(image.to_string()));
        if self.failing_pulls.contains(image) {
            return Err(EngineError::PullFailed {
                image: image.to_string(),
                message: "manifest unknown".to_string(),
            });
        }
        self.images
            .lock()
            .unwrap()
            .insert(image.to_string(), Self::id_for(image));
        Ok(())
    }

    async fn prune(&self, image_ids: &[String]) -> EngineResult<()> {
        self.record(Call::Prune(image_ids.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRunner {
    fail: bool,
    specs: Mutex<Vec<CommandSpec>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        self.specs.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> EngineResult<()> {
        self.specs.lock().unwrap().push(spec.clone());
        if self.fail {
            return Err(EngineError::CommandFailed {
                program: spec.program.clone(),
                status: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }
}

pub struct FakeCluster {
    context: Option<String>,
    local: bool,
}

impl FakeCluster {
    pub fn new(context: &str, local: bool) -> Self {
        Self {
            context: Some(context.to_string()),
            local,
        }
    }

    pub fn broken() -> Self {
        Self {
            context: None,
            local: false,
        }
    }
}

impl ClusterContext for FakeCluster {
    fn current_context(&self) -> imageflow_config::Result<String> {
        self.context.clone().ok_or(ConfigError::KubeConfigNotFound)
    }

    fn is_local_cluster(&self) -> imageflow_config::Result<bool> {
        self.current_context().map(|_| self.local)
    }
}

#[derive(Default)]
pub struct RecordingWarnings {
    recorded: Mutex<Vec<Degradation>>,
}

impl RecordingWarnings {
    pub fn recorded(&self) -> Vec<Degradation> {
        self.recorded.lock().unwrap().clone()
    }
}

impl WarningSink for RecordingWarnings {
    fn warn(&self, degradation: &Degradation) {
        self.recorded.lock().unwrap().push(degradation.clone());
    }
}
