use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "kubeconfig が見つかりません。以下の場所を確認してください:\n\
        - KUBECONFIG 環境変数\n\
        - ~/.kube/config"
    )]
    KubeConfigNotFound,

    #[error("kubeconfig に current-context が設定されていません: {0}")]
    NoCurrentContext(PathBuf),

    #[error("YAML の解析に失敗しました ({path}): {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
