use crate::model::BuiltImages;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// コンテナエンジン・外部プロセスなど協調コンポーネントのエラー
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Push failed: {message}")]
    PushFailed { message: String },

    #[error("Pull failed for {image}: {message}")]
    PullFailed { image: String, message: String },

    #[error("No digest reported for pushed image {0}")]
    DigestNotFound(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("{program} failed: {status}")]
    CommandFailed { program: String, status: String },

    #[error("Dockerfile {dockerfile} is outside of the workspace {workspace}")]
    DockerfileOutsideWorkspace {
        dockerfile: PathBuf,
        workspace: PathBuf,
    },

    #[error("Registry authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// ビルド処理のどの段階で失敗したか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    NormalizeDockerfile,
    RunBuild,
    ImageId,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BuildPhase::NormalizeDockerfile => "normalizing dockerfile path",
            BuildPhase::RunBuild => "running build",
            BuildPhase::ImageId => "getting image id",
        };
        f.write_str(label)
    }
}

/// ビルド呼び出し全体を中断させる致命的エラー
///
/// 各境界で短いラベルを付けて包むため、Display は原因の連鎖をそのまま表示します。
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("converting execution env to build policy: {0}")]
    ConfigDecode(#[source] serde_json::Error),

    #[error("getting current cluster context: {0}")]
    ContextResolution(#[source] imageflow_config::ConfigError),

    #[error("getting imageID for {image}: {source}")]
    CacheLookup {
        image: String,
        #[source]
        source: EngineError,
    },

    #[error("{phase}: {source}")]
    BuildExecution {
        phase: BuildPhase,
        #[source]
        source: EngineError,
    },

    #[error("pushing {tag}: {source}")]
    Push {
        tag: String,
        #[source]
        source: EngineError,
    },

    #[error("tagging {image_id} as {tag}: {source}")]
    Tag {
        image_id: String,
        tag: String,
        #[source]
        source: EngineError,
    },

    #[error("unable to find tag for image {0}")]
    MissingTag(String),

    /// 中断までにビルドされたイメージを `built` に保持する
    #[error("build artifact {image}: {source}")]
    Artifact {
        image: String,
        built: BuiltImages,
        #[source]
        source: Box<BuildError>,
    },

    #[error("pruning images: {0}")]
    Prune(#[source] EngineError),

    #[error("build cancelled")]
    Cancelled,
}

impl BuildError {
    pub(crate) fn build(phase: BuildPhase, source: EngineError) -> Self {
        BuildError::BuildExecution { phase, source }
    }

    /// アーティファクト単位のラベルを外した元のエラー
    pub fn root(&self) -> &BuildError {
        match self {
            BuildError::Artifact { source, .. } => source.root(),
            other => other,
        }
    }

    /// 中断したビルド呼び出しで既にビルドされたイメージ
    pub fn built_images(&self) -> Option<&BuiltImages> {
        match self {
            BuildError::Artifact { built, .. } => Some(built),
            _ => None,
        }
    }

    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self.root() {
            BuildError::ContextResolution(e) => {
                format!(
                    "クラスタコンテキストを取得できません: {}\n\
                     \n\
                     kubectl config current-context が動作するか確認してください。",
                    e
                )
            }
            BuildError::BuildExecution {
                source: EngineError::DockerfileOutsideWorkspace { dockerfile, .. },
                ..
            } => {
                format!(
                    "Dockerfile がビルドコンテキストの外にあります: {}\n\
                     \n\
                     imageflow.yaml の dockerfile は context からの相対パスで指定してください。",
                    dockerfile.display()
                )
            }
            BuildError::Push { tag, .. } => {
                format!(
                    "{} のプッシュに失敗しました\n\
                     \n\
                     docker login でレジストリにログインしているか確認してください。",
                    tag
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
pub type BuildResult<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain_display() {
        let err = BuildError::Artifact {
            image: "app".to_string(),
            built: BuiltImages::new(),
            source: Box::new(BuildError::build(
                BuildPhase::RunBuild,
                EngineError::CommandFailed {
                    program: "docker".to_string(),
                    status: "exit status: 1".to_string(),
                },
            )),
        };

        assert_eq!(
            err.to_string(),
            "build artifact app: running build: docker failed: exit status: 1"
        );
        assert!(matches!(err.root(), BuildError::BuildExecution { .. }));
    }

    #[test]
    fn test_user_message_push() {
        let err = BuildError::Push {
            tag: "ghcr.io/org/app:v1".to_string(),
            source: EngineError::PushFailed {
                message: "denied".to_string(),
            },
        };
        assert!(err.user_message().contains("docker login"));
    }
}
