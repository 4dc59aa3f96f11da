//! imageflow の設定とクラスタコンテキスト
//!
//! グローバル設定ファイル (`~/.config/imageflow/config.yaml`) の読み込みと、
//! kubeconfig から現在のコンテキストを解決してローカルクラスタかどうかを判定する機能を提供します。

pub mod cluster;
pub mod error;
pub mod kube;

pub use cluster::{ClusterContext, KubeContext, is_known_local_context};
pub use error::*;
pub use kube::{KubeConfig, find_kubeconfig};

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// グローバル設定ファイルのパスを上書きする環境変数
pub const CONFIG_PATH_ENV: &str = "IMAGEFLOW_CONFIG";

/// imageflow のグローバル設定
///
/// ```yaml
/// local-cluster: false
/// kube-contexts:
///   my-cluster:
///     local-cluster: true
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct GlobalConfig {
    /// 全コンテキスト共通のローカルクラスタ指定
    #[serde(default)]
    pub local_cluster: Option<bool>,

    /// コンテキストごとの設定
    #[serde(default)]
    pub kube_contexts: HashMap<String, ContextConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ContextConfig {
    #[serde(default)]
    pub local_cluster: Option<bool>,
}

impl GlobalConfig {
    /// 設定ファイルを読み込む（存在しない場合はデフォルト）
    pub fn load() -> Result<Self> {
        match find_config_file() {
            Some(path) => Self::from_path(&path),
            None => {
                tracing::debug!("global config not found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// コンテキストに対する明示的なローカルクラスタ指定
    ///
    /// コンテキスト個別の設定がグローバル設定より優先されます。
    pub fn local_cluster_for(&self, context: &str) -> Option<bool> {
        self.kube_contexts
            .get(context)
            .and_then(|c| c.local_cluster)
            .or(self.local_cluster)
    }
}

/// グローバル設定ファイルを探す
///
/// 1. 環境変数 IMAGEFLOW_CONFIG
/// 2. ~/.config/imageflow/config.yaml
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Some(path);
        }
    }

    let global = dirs::config_dir()?.join("imageflow").join("config.yaml");
    global.exists().then_some(global)
}
