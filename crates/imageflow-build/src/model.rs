//! ビルド対象・結果のデータモデル

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

/// イメージ名 -> ビルド前のタグ候補
pub type ImageTags = HashMap<String, String>;

/// ビルド対象のアーティファクト
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(rename = "image")]
    pub image_name: String,

    /// ビルドコンテキスト
    #[serde(rename = "context", default = "default_workspace")]
    pub workspace: PathBuf,

    /// ワークスペースからの相対パス
    #[serde(default = "default_dockerfile")]
    pub dockerfile: PathBuf,

    #[serde(default)]
    pub build_args: BTreeMap<String, String>,

    #[serde(default)]
    pub cache_from: Vec<String>,
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_dockerfile() -> PathBuf {
    PathBuf::from("Dockerfile")
}

impl Artifact {
    pub fn new(image_name: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            image_name: image_name.into(),
            workspace: workspace.into(),
            dockerfile: default_dockerfile(),
            build_args: BTreeMap::new(),
            cache_from: Vec::new(),
        }
    }

    pub fn with_dockerfile(mut self, dockerfile: impl Into<PathBuf>) -> Self {
        self.dockerfile = dockerfile.into();
        self
    }

    pub fn with_build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }

    pub fn with_cache_from(mut self, image: impl Into<String>) -> Self {
        self.cache_from.push(image.into());
        self
    }
}

/// アーティファクトごとの最終的な参照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub final_reference: String,
    /// `tag@digest` 形式か（プッシュした場合のみ）
    pub digest_form: bool,
}

/// 1 アーティファクト分の記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImage {
    pub image_name: String,
    /// プッシュ後の ID 取得に失敗した場合のみ None
    pub image_id: Option<String>,
}

/// 1 回のビルド呼び出しでビルドしたイメージ（追記のみ）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltImages(Vec<BuiltImage>);

impl BuiltImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, image_name: &str, image_id: Option<String>) {
        self.0.push(BuiltImage {
            image_name: image_name.to_string(),
            image_id,
        });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuiltImage> {
        self.0.iter()
    }

    /// 削除対象の ID（重複と欠損を除く、記録順）
    pub fn image_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for id in self.0.iter().filter_map(|b| b.image_id.as_ref()) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

/// ビルドを止めない劣化（警告として報告される）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    /// cache-from イメージを pull できなかった
    CachePullMiss { image: String, reason: String },
    /// プッシュ後にローカルのイメージ ID を取得できなかった
    ImageIdLookup { tag: String, reason: String },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::CachePullMiss { image, reason } => {
                write!(f, "Cache-From image couldn't be pulled: {} ({})", image, reason)
            }
            Degradation::ImageIdLookup { tag, reason } => write!(
                f,
                "unable to inspect image {} ({}): built images may not be cleaned up correctly",
                tag, reason
            ),
        }
    }
}

/// 各ステージの結果
///
/// `Err` は致命的、`Ok` で `degraded` が空でなければ劣化しつつ継続。
#[derive(Debug, Clone, PartialEq)]
pub struct Staged<T> {
    pub value: T,
    pub degraded: Vec<Degradation>,
}

impl<T> Staged<T> {
    pub fn done(value: T) -> Self {
        Self {
            value,
            degraded: Vec::new(),
        }
    }

    pub fn with(value: T, degraded: Vec<Degradation>) -> Self {
        Self { value, degraded }
    }
}

/// ビルド済みアーティファクト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltArtifact {
    pub image_name: String,
    pub tag: String,
    pub outcome: BuildOutcome,
}

/// ビルド呼び出し全体の結果
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub artifacts: Vec<BuiltArtifact>,
    pub built_images: BuiltImages,
    pub degraded: Vec<Degradation>,
}
