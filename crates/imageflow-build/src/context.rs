use crate::error::EngineResult;
use flate2::Compression;
use flate2::write::GzEncoder;
use glob::Pattern;
use std::path::{Path, PathBuf};
use tar::Builder;

/// API ビルド用のビルドコンテキスト
pub struct ContextBuilder;

impl ContextBuilder {
    /// ワークスペースを tar.gz アーカイブにする
    ///
    /// `.dockerignore` に一致するパスは除外します（Dockerfile と .dockerignore は常に含める）。
    pub fn create_context(workspace: &Path, dockerfile_in_context: &Path) -> EngineResult<Vec<u8>> {
        tracing::debug!("Creating build context from: {}", workspace.display());

        let ignore = DockerIgnore::load(workspace)?;
        let mut files = Vec::new();
        collect_files(workspace, Path::new(""), &ignore, &mut files)?;

        let always = [dockerfile_in_context, Path::new(".dockerignore")];
        for path in always {
            if workspace.join(path).is_file() && !files.iter().any(|f| f == path) {
                files.push(path.to_path_buf());
            }
        }

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);
            for relative in &files {
                tar.append_path_with_name(workspace.join(relative), relative)?;
            }
            tar.into_inner()?.finish()?;
        }

        tracing::debug!(
            "Build context created: {} files, {} bytes",
            files.len(),
            archive_data.len()
        );
        Self::check_context_size(archive_data.len());

        Ok(archive_data)
    }

    fn check_context_size(size: usize) {
        const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024; // 500MB

        if size > MAX_CONTEXT_SIZE {
            tracing::warn!(
                "警告: ビルドコンテキストが大きすぎます（{}MB）\n\
                 .dockerignoreファイルで不要なファイルを除外することを推奨します。",
                size / 1024 / 1024
            );
        }
    }
}

/// `.dockerignore` の除外パターン
struct DockerIgnore {
    patterns: Vec<(Pattern, bool)>,
}

impl DockerIgnore {
    fn load(workspace: &Path) -> EngineResult<Self> {
        let path = workspace.join(".dockerignore");
        if !path.is_file() {
            return Ok(Self {
                patterns: Vec::new(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    fn parse(content: &str) -> Self {
        let patterns = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(|line| {
                let (negated, raw) = match line.strip_prefix('!') {
                    Some(rest) => (true, rest),
                    None => (false, line),
                };
                let raw = raw.trim_start_matches("./").trim_matches('/');
                match Pattern::new(raw) {
                    Ok(p) => Some((p, negated)),
                    Err(e) => {
                        tracing::warn!("invalid .dockerignore pattern '{}': {}", line, e);
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    /// 最後に一致したパターンで決まる（`!` は再包含）
    fn is_ignored(&self, relative: &Path) -> bool {
        let mut ignored = false;
        for (pattern, negated) in &self.patterns {
            if pattern.matches_path(relative) {
                ignored = !negated;
            }
        }
        ignored
    }
}

fn collect_files(
    root: &Path,
    relative: &Path,
    ignore: &DockerIgnore,
    files: &mut Vec<PathBuf>,
) -> EngineResult<()> {
    let mut entries = std::fs::read_dir(root.join(relative))?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let child = relative.join(entry.file_name());
        if ignore.is_ignored(&child) {
            continue;
        }

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(root, &child, ignore, files)?;
        } else {
            files.push(child);
        }
    }

    Ok(())
}
