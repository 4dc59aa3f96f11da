//! 外部コマンドの実行

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// 実行するコマンド
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// 既存の環境変数に追加で設定する値
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// ログ表示用のコマンドライン
    pub fn display(&self) -> String {
        let mut line = String::new();
        for (k, v) in &self.envs {
            line.push_str(&format!("{}={} ", k, v));
        }
        line.push_str(&self.program);
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// 外部コマンドを実行するトレイト
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// 標準出力・標準エラーをそのまま流しながら実行し、終了を待つ
    async fn run(&self, spec: &CommandSpec) -> EngineResult<()>;
}

/// tokio::process による実装
///
/// future を drop すると子プロセスも kill されます（キャンセル時）。
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> EngineResult<()> {
        tracing::debug!("Running: {}", spec.display());

        let status = Command::new(&spec.program)
            .args(&spec.args)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .status()
            .await?;

        if !status.success() {
            return Err(EngineError::CommandFailed {
                program: spec.program.clone(),
                status: status.to_string(),
            });
        }

        Ok(())
    }
}
