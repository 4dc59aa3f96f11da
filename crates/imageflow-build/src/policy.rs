//! ビルドポリシーの解決
//!
//! 実行環境のプロパティを型付きの設定に変換し、クラスタがローカルかどうかから
//! プッシュのデフォルトを決めます。ビルド呼び出しごとに一度だけ実行されます。

use crate::error::{BuildError, BuildResult};
use imageflow_config::ClusterContext;
use serde::Deserialize;

/// 実行環境のプロパティ（`local` セクション）
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalBuild {
    /// 未指定の場合はクラスタに応じて決まる
    #[serde(default)]
    pub push: Option<bool>,

    #[serde(default, rename = "useDockerCLI")]
    pub use_docker_cli: bool,

    #[serde(default)]
    pub use_buildkit: bool,
}

/// 実行環境以外から渡されるオプション
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// 中間コンテナを強制削除し、ビルド後にイメージを prune する
    pub prune: bool,
}

/// 1 回のビルド呼び出しで使う不変のポリシー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPolicy {
    pub push_images: bool,
    pub use_cli_build: bool,
    pub use_buildkit: bool,
    pub prune_on_build: bool,
    pub kube_context: String,
    pub local_cluster: bool,
}

impl LocalBuild {
    /// 型なしのプロパティをデコード（null はすべてデフォルト）
    pub fn from_properties(properties: &serde_json::Value) -> BuildResult<Self> {
        let decoded: Option<LocalBuild> =
            serde_json::from_value(properties.clone()).map_err(BuildError::ConfigDecode)?;
        Ok(decoded.unwrap_or_default())
    }
}

/// ビルドポリシーを解決
pub fn resolve_policy(
    properties: &serde_json::Value,
    options: &BuildOptions,
    cluster: &dyn ClusterContext,
) -> BuildResult<BuildPolicy> {
    let local = LocalBuild::from_properties(properties)?;

    let kube_context = cluster
        .current_context()
        .map_err(BuildError::ContextResolution)?;
    let local_cluster = cluster
        .is_local_cluster()
        .map_err(BuildError::ContextResolution)?;

    let push_images = match local.push {
        Some(push) => push,
        None => {
            let push = !local_cluster;
            tracing::debug!(
                "push value not present, defaulting to {} because local cluster is {}",
                push,
                local_cluster
            );
            push
        }
    };

    Ok(BuildPolicy {
        push_images,
        use_cli_build: local.use_docker_cli,
        use_buildkit: local.use_buildkit,
        prune_on_build: options.prune,
        kube_context,
        local_cluster,
    })
}
