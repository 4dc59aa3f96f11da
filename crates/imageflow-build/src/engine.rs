//! コンテナエンジンの抽象化

use crate::error::EngineResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// API ビルドへの入力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub workspace: PathBuf,
    /// 正規化済み（ワークスペース配下）の Dockerfile パス
    pub dockerfile: PathBuf,
    pub tag: String,
    pub build_args: BTreeMap<String, String>,
    pub cache_from: Vec<String>,
    pub force_rm: bool,
}

impl BuildRequest {
    /// ビルドコンテキスト内での Dockerfile の相対パス
    pub fn dockerfile_in_context(&self) -> &Path {
        self.dockerfile
            .strip_prefix(&self.workspace)
            .unwrap_or(&self.dockerfile)
    }
}

/// イメージの検査結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub repo_digests: Vec<String>,
}

/// ビルド・プッシュ・タグ付けを行うコンテナエンジン
#[async_trait]
pub trait ImageEngine: Send + Sync {
    /// ビルドしてイメージ ID を返す
    async fn build(&self, request: &BuildRequest) -> EngineResult<String>;

    /// タグをレジストリにプッシュしてダイジェストを返す
    async fn push(&self, tag: &str) -> EngineResult<String>;

    async fn tag(&self, image_id: &str, tag: &str) -> EngineResult<()>;

    /// ローカルにあればイメージ ID、無ければ None
    async fn image_id(&self, reference: &str) -> EngineResult<Option<String>>;

    async fn inspect(&self, reference: &str) -> EngineResult<ImageMetadata>;

    async fn pull(&self, image: &str) -> EngineResult<()>;

    async fn prune(&self, image_ids: &[String]) -> EngineResult<()>;
}
