use crate::build_file::{BuildFile, PropertyOverrides};
use colored::Colorize;
use imageflow_build::{
    BuildError, BuildOptions, BuildReport, Builder, BuiltImages, CancellationToken, DockerEngine,
    ImageEngine, SystemRunner, prune, resolve_policy,
};
use imageflow_config::KubeContext;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(clap::Args, Debug)]
pub struct BuildArgs {
    /// ビルド定義ファイル
    #[arg(short, long, default_value = "imageflow.yaml", env = "IMAGEFLOW_FILE")]
    pub file: PathBuf,

    /// ビルド前のタグ
    #[arg(short, long, default_value = "latest", env = "IMAGEFLOW_TAG")]
    pub tag: String,

    /// レジストリにプッシュする（未指定ならクラスタがローカルでない場合のみ）
    #[arg(long, conflicts_with = "no_push")]
    pub push: bool,

    /// プッシュしない
    #[arg(long)]
    pub no_push: bool,

    /// docker CLI でビルドする
    #[arg(long)]
    pub cli: bool,

    /// BuildKit を有効にして docker CLI でビルドする
    #[arg(long)]
    pub buildkit: bool,

    /// 中間コンテナを削除し、ビルド後にイメージを削除する
    #[arg(long)]
    pub prune: bool,

    /// ビルド結果を JSON で書き出す
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl BuildArgs {
    fn overrides(&self) -> PropertyOverrides {
        let push = if self.push {
            Some(true)
        } else if self.no_push {
            Some(false)
        } else {
            None
        };

        PropertyOverrides {
            push,
            use_docker_cli: self.cli,
            use_buildkit: self.buildkit,
        }
    }
}

/// `--output` に書き出す内容
#[derive(Debug, Serialize)]
struct BuildOutput<'a> {
    builds: Vec<BuildOutputEntry<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildOutputEntry<'a> {
    image_name: &'a str,
    tag: &'a str,
}

/// ビルドコマンドを処理
pub async fn handle_build_command(args: &BuildArgs) -> anyhow::Result<()> {
    let file = BuildFile::load(&args.file)?;
    tracing::debug!(
        "loaded {} artifacts from {}",
        file.artifacts.len(),
        args.file.display()
    );

    if file.artifacts.is_empty() {
        println!("{}", "ビルド対象のアーティファクトがありません".yellow());
        return Ok(());
    }

    let cluster =
        KubeContext::discover().map_err(|e| report_error(BuildError::ContextResolution(e)))?;
    let policy = resolve_policy(
        &file.properties(&args.overrides()),
        &BuildOptions { prune: args.prune },
        &cluster,
    )
    .map_err(report_error)?;

    println!("{}", "Dockerイメージをビルド中...".green());
    println!("コンテキスト: {}", policy.kube_context.cyan());
    println!(
        "プッシュ: {}",
        (if policy.push_images { "する" } else { "しない" }).cyan()
    );

    let engine = Arc::new(connect_docker().await?);
    let builder = Builder::new(policy, engine.clone(), Arc::new(SystemRunner));
    println!("ビルド方式: {}", builder.strategy().name().cyan());

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling build");
            watcher.cancel();
        }
    });

    let report = match builder
        .build_artifacts(&file.artifacts, &file.tags(&args.tag), &cancel)
        .await
    {
        Ok(report) => report,
        Err(err) => {
            // 中断時もそれまでにビルドしたイメージを削除する
            if args.prune
                && let Some(built) = err.built_images()
                && let Err(e) = prune_images(engine.as_ref(), built, &CancellationToken::new()).await
            {
                tracing::warn!("failed to prune images after aborted build: {}", e);
            }
            return Err(report_error(err));
        }
    };

    print_summary(&report);

    if let Some(path) = &args.output {
        write_output(path, &report)?;
        println!("ビルド結果を書き出しました: {}", path.display().to_string().cyan());
    }

    if args.prune {
        prune_images(engine.as_ref(), &report.built_images, &cancel)
            .await
            .map_err(report_error)?;
    }

    Ok(())
}

async fn prune_images(
    engine: &dyn ImageEngine,
    built: &BuiltImages,
    cancel: &CancellationToken,
) -> Result<(), BuildError> {
    prune(engine, built, cancel).await?;
    println!(
        "{} {} 個のイメージを削除しました",
        "✓".green(),
        built.image_ids().len()
    );
    Ok(())
}

fn report_error(err: BuildError) -> anyhow::Error {
    eprintln!();
    eprintln!("{} {}", "✗".red().bold(), err.user_message());
    anyhow::Error::new(err)
}

async fn connect_docker() -> anyhow::Result<DockerEngine> {
    match DockerEngine::connect().await {
        Ok(engine) => Ok(engine),
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Docker接続エラー".red().bold());
            eprintln!();
            eprintln!("{}", "原因:".yellow());
            eprintln!("  {}", e);
            eprintln!();
            eprintln!("{}", "解決方法:".yellow());
            eprintln!("  • Dockerが起動しているか確認してください");
            eprintln!("  • docker ps コマンドが正常に動作するか確認してください");
            Err(anyhow::anyhow!("Docker接続に失敗しました"))
        }
    }
}

fn print_summary(report: &BuildReport) {
    println!();
    println!("{}", "✓ すべてのイメージがビルドされました！".green().bold());
    if !report.degraded.is_empty() {
        println!(
            "{}",
            format!("  (警告 {} 件)", report.degraded.len()).yellow()
        );
    }

    println!();
    println!("{}", "結果サマリー:".bold());
    for built in &report.artifacts {
        println!(
            "  {} {}: {}",
            "✓".green(),
            built.image_name,
            built.outcome.final_reference.cyan()
        );
    }
}

fn write_output(path: &Path, report: &BuildReport) -> anyhow::Result<()> {
    let output = BuildOutput {
        builds: report
            .artifacts
            .iter()
            .map(|a| BuildOutputEntry {
                image_name: &a.image_name,
                tag: &a.outcome.final_reference,
            })
            .collect(),
    };
    std::fs::write(path, serde_json::to_string_pretty(&output)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageflow_build::{BuildOutcome, BuiltArtifact};

    #[test]
    fn test_write_output() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("build.json");

        let report = BuildReport {
            artifacts: vec![BuiltArtifact {
                image_name: "myapp".to_string(),
                tag: "myapp:v1".to_string(),
                outcome: BuildOutcome {
                    final_reference: "myapp:v1@sha256:def456".to_string(),
                    digest_form: true,
                },
            }],
            ..Default::default()
        };

        write_output(&path, &report).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            written,
            serde_json::json!({
                "builds": [{ "imageName": "myapp", "tag": "myapp:v1@sha256:def456" }]
            })
        );
    }

    #[test]
    fn test_overrides_from_flags() {
        let args = BuildArgs {
            file: PathBuf::from("imageflow.yaml"),
            tag: "latest".to_string(),
            push: false,
            no_push: true,
            cli: false,
            buildkit: true,
            prune: false,
            output: None,
        };
        let overrides = args.overrides();
        assert_eq!(overrides.push, Some(false));
        assert!(overrides.use_buildkit);
        assert!(!overrides.use_docker_cli);
    }
}
