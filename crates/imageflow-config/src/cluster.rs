//! クラスタコンテキストの解決とローカルクラスタ判定

use crate::GlobalConfig;
use crate::error::Result;
use crate::kube::{KubeConfig, find_kubeconfig};
use std::path::PathBuf;

/// 現在のクラスタコンテキストを提供するトレイト
pub trait ClusterContext: Send + Sync {
    /// 現在のコンテキスト名
    fn current_context(&self) -> Result<String>;

    /// 現在のコンテキストがローカルクラスタ（ローカルの Docker デーモンを共有する）かどうか
    fn is_local_cluster(&self) -> Result<bool>;
}

/// kubeconfig とグローバル設定に基づく ClusterContext
#[derive(Debug, Clone)]
pub struct KubeContext {
    kubeconfig: PathBuf,
    global: GlobalConfig,
}

impl KubeContext {
    pub fn new(kubeconfig: PathBuf, global: GlobalConfig) -> Self {
        Self { kubeconfig, global }
    }

    /// 環境変数とホームディレクトリから kubeconfig / グローバル設定を探して作成
    pub fn discover() -> Result<Self> {
        let kubeconfig = find_kubeconfig()?;
        let global = GlobalConfig::load()?;
        tracing::debug!("using kubeconfig: {}", kubeconfig.display());
        Ok(Self::new(kubeconfig, global))
    }
}

impl ClusterContext for KubeContext {
    fn current_context(&self) -> Result<String> {
        KubeConfig::from_path(&self.kubeconfig)?.current_context(&self.kubeconfig)
    }

    fn is_local_cluster(&self) -> Result<bool> {
        let context = self.current_context()?;

        if let Some(local) = self.global.local_cluster_for(&context) {
            tracing::debug!("local-cluster for '{}' set in config: {}", context, local);
            return Ok(local);
        }

        Ok(is_known_local_context(&context))
    }
}

/// ローカルの Docker デーモンを共有する既知のコンテキスト名か判定
///
/// - `minikube`, `docker-desktop`, `docker-for-desktop`, `orbstack`, `rancher-desktop`
/// - `kind-*`, `k3d-*`, `colima*`
pub fn is_known_local_context(context: &str) -> bool {
    const EXACT: [&str; 5] = [
        "minikube",
        "docker-desktop",
        "docker-for-desktop",
        "orbstack",
        "rancher-desktop",
    ];
    const PREFIXES: [&str; 3] = ["kind-", "k3d-", "colima"];

    EXACT.contains(&context) || PREFIXES.iter().any(|p| context.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContextConfig;
    use std::fs;

    fn write_kubeconfig(dir: &std::path::Path, context: &str) -> PathBuf {
        let path = dir.join("config");
        fs::write(&path, format!("current-context: {}\n", context)).unwrap();
        path
    }

    #[test]
    fn test_known_local_contexts() {
        assert!(is_known_local_context("minikube"));
        assert!(is_known_local_context("docker-desktop"));
        assert!(is_known_local_context("kind-dev"));
        assert!(is_known_local_context("k3d-test"));
        assert!(is_known_local_context("colima"));
        assert!(!is_known_local_context("gke_project_zone_prod"));
        assert!(!is_known_local_context("arn:aws:eks:ap-northeast-1:1234:cluster/prod"));
    }

    #[test]
    fn test_kube_context_heuristic() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_kubeconfig(temp_dir.path(), "kind-dev");

        let ctx = KubeContext::new(path, GlobalConfig::default());
        assert_eq!(ctx.current_context().unwrap(), "kind-dev");
        assert!(ctx.is_local_cluster().unwrap());
    }

    #[test]
    fn test_kube_context_config_override() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_kubeconfig(temp_dir.path(), "minikube");

        let mut global = GlobalConfig::default();
        global.kube_contexts.insert(
            "minikube".to_string(),
            ContextConfig {
                local_cluster: Some(false),
            },
        );

        let ctx = KubeContext::new(path, global);
        assert!(!ctx.is_local_cluster().unwrap());
    }

    #[test]
    fn test_kube_context_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ctx = KubeContext::new(temp_dir.path().join("nope"), GlobalConfig::default());
        assert!(ctx.current_context().is_err());
        assert!(ctx.is_local_cluster().is_err());
    }
}
