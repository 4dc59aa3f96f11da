//! ビルド定義ファイル (imageflow.yaml)
//!
//! ```yaml
//! local:
//!   push: false
//!   useBuildkit: true
//! artifacts:
//!   - image: myapp
//!     context: ./svc
//!     dockerfile: Dockerfile
//!     buildArgs:
//!       KEY: VAL
//!     cacheFrom:
//!       - myapp:latest
//! ```

use anyhow::Context;
use imageflow_build::{Artifact, ImageTags};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct BuildFile {
    /// 実行環境のプロパティ（型なしのままポリシー解決に渡す）
    #[serde(default)]
    pub local: Option<serde_json::Value>,

    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

/// CLI フラグによるプロパティの上書き
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyOverrides {
    pub push: Option<bool>,
    pub use_docker_cli: bool,
    pub use_buildkit: bool,
}

impl BuildFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("ビルド定義ファイルを読み込めません: {}", path.display()))?;
        let mut file = Self::parse(&content)
            .with_context(|| format!("ビルド定義ファイルの解析に失敗しました: {}", path.display()))?;

        // context はビルド定義ファイルのディレクトリからの相対パス
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            for artifact in &mut file.artifacts {
                if artifact.workspace.is_relative() {
                    artifact.workspace = base.join(&artifact.workspace);
                }
            }
        }

        Ok(file)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let file: BuildFile = serde_yaml::from_str(content)?;

        let mut seen = HashSet::new();
        for artifact in &file.artifacts {
            if !seen.insert(artifact.image_name.as_str()) {
                anyhow::bail!("イメージ '{}' が重複しています", artifact.image_name);
            }
        }

        Ok(file)
    }

    /// ファイルのプロパティに CLI の上書きを反映
    pub fn properties(&self, overrides: &PropertyOverrides) -> serde_json::Value {
        let mut properties = self.local.clone().unwrap_or(serde_json::Value::Null);

        let mut set = |key: &str, value: bool| {
            if !properties.is_object() {
                properties = serde_json::Value::Object(serde_json::Map::new());
            }
            if let Some(map) = properties.as_object_mut() {
                map.insert(key.to_string(), serde_json::Value::Bool(value));
            }
        };

        if let Some(push) = overrides.push {
            set("push", push);
        }
        if overrides.use_docker_cli {
            set("useDockerCLI", true);
        }
        if overrides.use_buildkit {
            set("useBuildkit", true);
        }

        properties
    }

    /// 各アーティファクトのタグ候補 `<image>:<tag>`
    pub fn tags(&self, tag: &str) -> ImageTags {
        self.artifacts
            .iter()
            .map(|a| (a.image_name.clone(), format!("{}:{}", a.image_name, tag)))
            .collect()
    }
}
