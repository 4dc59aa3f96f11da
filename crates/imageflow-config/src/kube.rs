//! kubeconfig の読み込み

use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// kubeconfig のうち imageflow が参照する部分
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KubeConfig {
    #[serde(default)]
    pub current_context: Option<String>,
}

impl KubeConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// current-context を返す（未設定や空文字はエラー）
    pub fn current_context(&self, path: &Path) -> Result<String> {
        match self.current_context.as_deref() {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => Err(ConfigError::NoCurrentContext(path.to_path_buf())),
        }
    }
}

/// kubeconfig のパスを探す
///
/// 1. 環境変数 KUBECONFIG（複数指定時は最初に存在するもの）
/// 2. ~/.kube/config
pub fn find_kubeconfig() -> Result<PathBuf> {
    if let Some(paths) = std::env::var_os("KUBECONFIG")
        && let Some(path) = std::env::split_paths(&paths).find(|p| p.is_file())
    {
        return Ok(path);
    }

    let default = dirs::home_dir()
        .map(|h| h.join(".kube").join("config"))
        .ok_or(ConfigError::KubeConfigNotFound)?;

    if default.is_file() {
        Ok(default)
    } else {
        Err(ConfigError::KubeConfigNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: kind-dev
contexts:
  - name: kind-dev
    context:
      cluster: kind-dev
      user: kind-dev
  - name: gke_prod
    context:
      cluster: gke_prod
      user: gke_prod
"#;

    #[test]
    fn test_current_context() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config");
        fs::write(&path, KUBECONFIG).unwrap();

        let config = KubeConfig::from_path(&path).unwrap();
        assert_eq!(config.current_context(&path).unwrap(), "kind-dev");
    }

    #[test]
    fn test_missing_current_context() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config");
        fs::write(&path, "apiVersion: v1\ncurrent-context: \"\"\n").unwrap();

        let config = KubeConfig::from_path(&path).unwrap();
        assert!(matches!(
            config.current_context(&path),
            Err(ConfigError::NoCurrentContext(_))
        ));
    }

    #[test]
    #[serial]
    fn test_find_kubeconfig_env_list() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("missing");
        let present = temp_dir.path().join("config");
        fs::write(&present, KUBECONFIG).unwrap();

        let joined = std::env::join_paths([&missing, &present]).unwrap();
        temp_env::with_var("KUBECONFIG", Some(joined), || {
            assert_eq!(find_kubeconfig().unwrap(), present.clone());
        });
    }

    #[test]
    #[serial]
    fn test_find_kubeconfig_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("missing");

        temp_env::with_vars(
            [
                ("KUBECONFIG", Some(missing.as_os_str())),
                ("HOME", Some(temp_dir.path().as_os_str())),
            ],
            || {
                assert!(matches!(
                    find_kubeconfig(),
                    Err(ConfigError::KubeConfigNotFound)
                ));
            },
        );
    }
}
