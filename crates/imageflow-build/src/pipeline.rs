//! アーティファクトのビルドパイプライン
//!
//! 各アーティファクトを宣言順に 1 つずつ
//! キャッシュ準備 → ビルド → プッシュ or ローカルタグ → 記録 の順で処理します。
//! 致命的エラーが起きた時点で残りのアーティファクトは処理しません。

use crate::cache::warm_cache;
use crate::engine::ImageEngine;
use crate::error::{BuildError, BuildResult};
use crate::model::{
    Artifact, BuildOutcome, BuildReport, BuiltArtifact, BuiltImages, Degradation, ImageTags,
};
use crate::policy::BuildPolicy;
use crate::process::CommandRunner;
use crate::reference::resolve_reference;
use crate::strategy::BuildStrategy;
use colored::Colorize;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 劣化（警告）の通知先
pub trait WarningSink: Send + Sync {
    fn warn(&self, degradation: &Degradation);
}

/// 標準エラーに警告を出す
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleWarnings;

impl WarningSink for ConsoleWarnings {
    fn warn(&self, degradation: &Degradation) {
        eprintln!("  {} {}", "⚠".yellow(), degradation);
    }
}

/// ビルドパイプライン
pub struct Builder {
    policy: BuildPolicy,
    strategy: BuildStrategy,
    engine: Arc<dyn ImageEngine>,
    runner: Arc<dyn CommandRunner>,
    warnings: Arc<dyn WarningSink>,
}

impl Builder {
    pub fn new(
        policy: BuildPolicy,
        engine: Arc<dyn ImageEngine>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let strategy = BuildStrategy::select(&policy);
        Self {
            policy,
            strategy,
            engine,
            runner,
            warnings: Arc::new(ConsoleWarnings),
        }
    }

    /// 警告の通知先を指定
    pub fn with_warnings(mut self, warnings: Arc<dyn WarningSink>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn policy(&self) -> &BuildPolicy {
        &self.policy
    }

    pub fn strategy(&self) -> BuildStrategy {
        self.strategy
    }

    /// すべてのアーティファクトを順番にビルド
    pub async fn build_artifacts(
        &self,
        artifacts: &[Artifact],
        tags: &ImageTags,
        cancel: &CancellationToken,
    ) -> BuildResult<BuildReport> {
        if self.policy.local_cluster {
            println!(
                "Found [{}] context, using local docker daemon.",
                self.policy.kube_context.cyan()
            );
        }
        tracing::debug!(
            "building {} artifact(s) with {} (push: {})",
            artifacts.len(),
            self.strategy.name(),
            self.policy.push_images
        );

        let mut report = BuildReport::default();

        for artifact in artifacts {
            let Some(tag) = tags.get(&artifact.image_name) else {
                return Err(abort(
                    artifact,
                    &mut report,
                    BuildError::MissingTag(artifact.image_name.clone()),
                ));
            };

            println!();
            println!(
                "{}",
                format!("🔨 {} をビルド中...", artifact.image_name)
                    .green()
                    .bold()
            );

            let outcome = match self.build_one(artifact, tag, &mut report, cancel).await {
                Ok(outcome) => outcome,
                Err(e) => return Err(abort(artifact, &mut report, e)),
            };

            println!("  {} {}", "✓".green(), outcome.final_reference.cyan());
            report.artifacts.push(BuiltArtifact {
                image_name: artifact.image_name.clone(),
                tag: tag.clone(),
                outcome,
            });
        }

        Ok(report)
    }

    async fn build_one(
        &self,
        artifact: &Artifact,
        tag: &str,
        report: &mut BuildReport,
        cancel: &CancellationToken,
    ) -> BuildResult<BuildOutcome> {
        let engine = self.engine.as_ref();

        let warmed = cancellable(cancel, warm_cache(engine, artifact)).await?;
        self.report_degraded(warmed.degraded, report);

        let image_id = cancellable(
            cancel,
            self.strategy.build(
                engine,
                self.runner.as_ref(),
                artifact,
                tag,
                self.policy.prune_on_build,
            ),
        )
        .await?;
        tracing::debug!("built {} -> {}", tag, image_id);

        let resolved = cancellable(
            cancel,
            resolve_reference(
                engine,
                self.policy.push_images,
                artifact,
                tag,
                &image_id,
                &mut report.built_images,
            ),
        )
        .await?;
        self.report_degraded(resolved.degraded, report);

        Ok(resolved.value)
    }

    fn report_degraded(&self, degraded: Vec<Degradation>, report: &mut BuildReport) {
        for degradation in degraded {
            self.warnings.warn(&degradation);
            report.degraded.push(degradation);
        }
    }
}

/// アーティファクト名を付け、それまでの記録をエラーに移す
fn abort(artifact: &Artifact, report: &mut BuildReport, source: BuildError) -> BuildError {
    BuildError::Artifact {
        image: artifact.image_name.clone(),
        built: std::mem::take(&mut report.built_images),
        source: Box::new(source),
    }
}

/// ビルドしたイメージを削除
pub async fn prune(
    engine: &dyn ImageEngine,
    built: &BuiltImages,
    cancel: &CancellationToken,
) -> BuildResult<()> {
    let ids = built.image_ids();
    if ids.is_empty() {
        return Ok(());
    }

    tracing::debug!("pruning {} image(s)", ids.len());
    cancellable(cancel, async {
        engine.prune(&ids).await.map_err(BuildError::Prune)
    })
    .await
}

/// キャンセルされたら外部呼び出しを打ち切る
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> BuildResult<T>
where
    F: Future<Output = BuildResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BuildError::Cancelled),
        result = fut => result,
    }
}
