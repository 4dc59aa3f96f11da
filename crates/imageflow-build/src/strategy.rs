//! ビルド方式の選択と実行
//!
//! Docker API で直接ビルドするか、`docker build` を実行するか（BuildKit 有効化も含む）を
//! ポリシーから一度だけ選び、どちらも同じ入力からイメージ ID を返します。

use crate::engine::{BuildRequest, ImageEngine};
use crate::error::{BuildError, BuildPhase, BuildResult, EngineError, EngineResult};
use crate::model::Artifact;
use crate::policy::BuildPolicy;
use crate::process::{CommandRunner, CommandSpec};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// ビルド方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStrategy {
    /// Docker API を直接呼ぶ（デフォルト）
    Api,
    /// docker CLI を実行する
    Cli { buildkit: bool },
}

impl BuildStrategy {
    pub fn select(policy: &BuildPolicy) -> Self {
        if policy.use_cli_build || policy.use_buildkit {
            BuildStrategy::Cli {
                buildkit: policy.use_buildkit,
            }
        } else {
            BuildStrategy::Api
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuildStrategy::Api => "docker api",
            BuildStrategy::Cli { buildkit: false } => "docker cli",
            BuildStrategy::Cli { buildkit: true } => "docker cli (buildkit)",
        }
    }

    /// アーティファクトをビルドしてイメージ ID を返す
    pub async fn build(
        &self,
        engine: &dyn ImageEngine,
        runner: &dyn CommandRunner,
        artifact: &Artifact,
        tag: &str,
        force_rm: bool,
    ) -> BuildResult<String> {
        let dockerfile = normalize_dockerfile_path(&artifact.workspace, &artifact.dockerfile)
            .map_err(|e| BuildError::build(BuildPhase::NormalizeDockerfile, e))?;

        match self {
            BuildStrategy::Api => {
                let request = BuildRequest {
                    workspace: artifact.workspace.clone(),
                    dockerfile,
                    tag: tag.to_string(),
                    build_args: artifact.build_args.clone(),
                    cache_from: artifact.cache_from.clone(),
                    force_rm,
                };
                engine
                    .build(&request)
                    .await
                    .map_err(|e| BuildError::build(BuildPhase::RunBuild, e))
            }
            BuildStrategy::Cli { buildkit } => {
                let spec = cli_build_command(
                    &artifact.workspace,
                    &dockerfile,
                    tag,
                    &artifact.build_args,
                    &artifact.cache_from,
                    force_rm,
                    *buildkit,
                );
                runner
                    .run(&spec)
                    .await
                    .map_err(|e| BuildError::build(BuildPhase::RunBuild, e))?;

                engine
                    .image_id(tag)
                    .await
                    .map_err(|e| BuildError::build(BuildPhase::ImageId, e))?
                    .ok_or_else(|| {
                        BuildError::build(
                            BuildPhase::ImageId,
                            EngineError::ImageNotFound(tag.to_string()),
                        )
                    })
            }
        }
    }
}

/// `docker build` のコマンドラインを組み立てる
///
/// `build <workspace> --file <dockerfile> -t <tag> [KEY=VAL ...] [--cache-from <image> ...] [--force-rm]`
pub fn cli_build_command(
    workspace: &Path,
    dockerfile: &Path,
    tag: &str,
    build_args: &BTreeMap<String, String>,
    cache_from: &[String],
    force_rm: bool,
    buildkit: bool,
) -> CommandSpec {
    let mut spec = CommandSpec::new("docker").args([
        "build".to_string(),
        workspace.display().to_string(),
        "--file".to_string(),
        dockerfile.display().to_string(),
        "-t".to_string(),
        tag.to_string(),
    ]);

    spec = spec.args(build_args.iter().map(|(k, v)| format!("{}={}", k, v)));
    for image in cache_from {
        spec = spec.arg("--cache-from").arg(image.as_str());
    }
    if force_rm {
        spec = spec.arg("--force-rm");
    }
    if buildkit {
        spec = spec.env("DOCKER_BUILDKIT", "1");
    }

    spec
}

/// Dockerfile のパスをワークスペース基準に正規化する
///
/// 相対パスはワークスペースに字句的に連結し（`./svc` + `Dockerfile` = `./svc/Dockerfile`）、
/// ワークスペースの外を指すパスはエラーにします。
pub fn normalize_dockerfile_path(workspace: &Path, dockerfile: &Path) -> EngineResult<PathBuf> {
    let outside = || EngineError::DockerfileOutsideWorkspace {
        dockerfile: dockerfile.to_path_buf(),
        workspace: workspace.to_path_buf(),
    };

    let relative = if dockerfile.is_absolute() {
        let root = lexical_clean(&std::path::absolute(workspace)?);
        lexical_clean(dockerfile)
            .strip_prefix(&root)
            .map_err(|_| outside())?
            .to_path_buf()
    } else {
        dockerfile.to_path_buf()
    };

    let mut parts: Vec<OsString> = Vec::new();
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(outside());
                }
            }
            Component::Normal(part) => parts.push(part.to_os_string()),
            Component::RootDir | Component::Prefix(_) => return Err(outside()),
        }
    }

    if parts.is_empty() {
        return Err(outside());
    }

    Ok(parts
        .iter()
        .fold(workspace.to_path_buf(), |path, part| path.join(part)))
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}
