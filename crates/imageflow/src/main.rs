mod build;
mod build_file;

use clap::{Parser, Subcommand};
use colored::Colorize;
use imageflow_config::{ClusterContext, KubeContext};

#[derive(Parser)]
#[command(name = "imageflow")]
#[command(about = "コンテナイメージをビルドし、デプロイできる参照を返す", long_about = None)]
struct Cli {
    /// デバッグログを表示
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// アーティファクトをビルドしてプッシュ（またはローカルにタグ付け）
    Build(build::BuildArgs),
    /// 現在のクラスタコンテキストを表示
    Context,
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Build(args) => build::handle_build_command(&args).await,
        Commands::Context => handle_context_command(),
        Commands::Version => {
            println!("imageflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn handle_context_command() -> anyhow::Result<()> {
    let cluster = KubeContext::discover()?;
    let context = cluster.current_context()?;
    let local = cluster.is_local_cluster()?;

    println!("コンテキスト: {}", context.cyan());
    println!(
        "ローカルクラスタ: {}",
        if local { "yes".green() } else { "no".yellow() }
    );
    println!(
        "デフォルトのプッシュ: {}",
        if local { "しない" } else { "する" }
    );
    Ok(())
}
