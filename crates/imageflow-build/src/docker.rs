//! bollard による ImageEngine 実装

use crate::auth::RegistryAuth;
use crate::context::ContextBuilder;
use crate::engine::{BuildRequest, ImageEngine, ImageMetadata};
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::BuildInfo;
use bytes::Bytes;
use colored::Colorize;
use futures_util::stream::StreamExt;
use http_body_util::{Either, Full};
use std::collections::HashMap;

/// ローカルの Docker デーモン
pub struct DockerEngine {
    docker: Docker,
    auth: RegistryAuth,
}

impl DockerEngine {
    pub fn new(docker: Docker) -> Self {
        Self {
            docker,
            auth: RegistryAuth::new(),
        }
    }

    /// ローカルの Docker に接続して疎通を確認
    pub async fn connect() -> EngineResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        docker.ping().await?;
        Ok(Self::new(docker))
    }

    /// ビルド出力を表示し、エラーとイメージ ID を拾う
    fn handle_build_output(output: BuildInfo, image_id: &mut Option<String>) -> EngineResult<()> {
        if let Some(stream) = output.stream {
            print!("{}", stream);
        }

        if let Some(error) = output.error {
            return Err(EngineError::BuildFailed(error));
        }

        if let Some(error_detail) = output.error_detail {
            let message = error_detail
                .message
                .unwrap_or_else(|| "Unknown build error".to_string());
            return Err(EngineError::BuildFailed(message));
        }

        if let Some(status) = output.status {
            println!("{}", status.cyan());
        }

        if let Some(id) = output.aux.and_then(|aux| aux.id) {
            *image_id = Some(id);
        }

        Ok(())
    }
}

#[async_trait]
impl ImageEngine for DockerEngine {
    async fn build(&self, request: &BuildRequest) -> EngineResult<String> {
        tracing::info!("Building image: {}", request.tag);

        let context =
            ContextBuilder::create_context(&request.workspace, request.dockerfile_in_context())?;
        let dockerfile = request
            .dockerfile_in_context()
            .to_string_lossy()
            .replace('\\', "/");

        let buildargs: HashMap<&str, &str> = request
            .build_args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let cachefrom: Vec<&str> = request.cache_from.iter().map(String::as_str).collect();

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: dockerfile.as_str(),
            t: request.tag.as_str(),
            buildargs,
            cachefrom,
            rm: true,
            forcerm: request.force_rm,
            ..Default::default()
        };
        tracing::debug!("Build options: {:?}", options);

        let body = Full::new(Bytes::from(context));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        let mut image_id = None;
        while let Some(msg) = stream.next().await {
            Self::handle_build_output(msg?, &mut image_id)?;
        }

        match image_id {
            Some(id) => Ok(id),
            None => self
                .image_id(&request.tag)
                .await?
                .ok_or_else(|| EngineError::ImageNotFound(request.tag.clone())),
        }
    }

    async fn push(&self, reference: &str) -> EngineResult<String> {
        let (image, tag) = split_image_tag(reference);
        let credentials = self.auth.credentials_for(reference)?;

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> { tag: tag.clone() };

        println!("  → {}", reference.cyan());

        #[allow(deprecated)]
        let mut stream = self.docker.push_image(&image, Some(options), credentials);

        let mut digest = None;
        let mut last_status = String::new();
        while let Some(result) = stream.next().await {
            let info = result.map_err(|e| EngineError::PushFailed {
                message: e.to_string(),
            })?;

            if let Some(err) = info.error {
                return Err(EngineError::PushFailed { message: err });
            }

            if let Some(status) = info.status {
                if let Some(d) = parse_push_digest(&status) {
                    digest = Some(d);
                }
                if status != last_status && !matches!(status.as_str(), "Preparing" | "Waiting") {
                    tracing::debug!("push {}: {}", reference, status);
                    last_status = status;
                }
            }
        }

        if let Some(digest) = digest {
            return Ok(digest);
        }

        // 進捗に digest が出なかった場合は RepoDigests から探す
        let metadata = self.inspect(reference).await?;
        digest_from_repo_digests(&image, &metadata.repo_digests)
            .ok_or_else(|| EngineError::DigestNotFound(reference.to_string()))
    }

    async fn tag(&self, image_id: &str, tag: &str) -> EngineResult<()> {
        let (repo, tag) = split_image_tag(tag);

        #[allow(deprecated)]
        let options = bollard::image::TagImageOptions {
            repo: repo.as_str(),
            tag: tag.as_str(),
        };

        self.docker.tag_image(image_id, Some(options)).await?;
        Ok(())
    }

    async fn image_id(&self, reference: &str) -> EngineResult<Option<String>> {
        match self.docker.inspect_image(reference).await {
            Ok(image) => Ok(image.id),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(EngineError::DockerConnection(e)),
        }
    }

    async fn inspect(&self, reference: &str) -> EngineResult<ImageMetadata> {
        match self.docker.inspect_image(reference).await {
            Ok(image) => Ok(ImageMetadata {
                id: image.id.unwrap_or_default(),
                repo_tags: image.repo_tags.unwrap_or_default(),
                repo_digests: image.repo_digests.unwrap_or_default(),
            }),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(EngineError::ImageNotFound(reference.to_string())),
            Err(e) => Err(EngineError::DockerConnection(e)),
        }
    }

    async fn pull(&self, image: &str) -> EngineResult<()> {
        let (name, tag) = split_image_tag(image);
        let credentials = self.auth.credentials_for(image)?;

        println!("  ↓ イメージをプル中: {}", image.cyan());

        #[allow(deprecated)]
        let options = bollard::image::CreateImageOptions {
            from_image: name.as_str(),
            tag: tag.as_str(),
            ..Default::default()
        };

        #[allow(deprecated)]
        let mut stream = self.docker.create_image(Some(options), None, credentials);

        while let Some(info) = stream.next().await {
            if let Err(e) = info {
                return Err(EngineError::PullFailed {
                    image: image.to_string(),
                    message: e.to_string(),
                });
            }
        }

        Ok(())
    }

    async fn prune(&self, image_ids: &[String]) -> EngineResult<()> {
        for id in image_ids {
            #[allow(deprecated)]
            let options = bollard::image::RemoveImageOptions {
                force: true,
                noprune: false,
            };

            match self.docker.remove_image(id, Some(options), None).await {
                Ok(_) => tracing::debug!("removed image {}", id),
                Err(bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                }) => tracing::debug!("image already removed: {}", id),
                Err(e) => return Err(EngineError::DockerConnection(e)),
            }
        }
        Ok(())
    }
}

/// イメージ名とタグを分離
///
/// - `ghcr.io/org/app:v1.0` -> `("ghcr.io/org/app", "v1.0")`
/// - `ghcr.io/org/app` -> `("ghcr.io/org/app", "latest")`
/// - `localhost:5000/app` -> `("localhost:5000/app", "latest")`
/// - `app@sha256:abc` -> `("app", "sha256:abc")`（digest 指定はタグより優先）
pub fn split_image_tag(image: &str) -> (String, String) {
    if let Some((name, digest)) = image.split_once('@') {
        let (repo, _) = split_image_tag(name);
        return (repo, digest.to_string());
    }

    if let Some(pos) = image.rfind(':') {
        let potential_tag = &image[pos + 1..];
        // `localhost:5000/app` の `:` はポート番号
        if !potential_tag.contains('/') {
            return (image[..pos].to_string(), potential_tag.to_string());
        }
    }

    (image.to_string(), "latest".to_string())
}

/// プッシュ進捗の `v1: digest: sha256:... size: 1234` から digest を取り出す
pub fn parse_push_digest(status: &str) -> Option<String> {
    let (_, rest) = status.split_once("digest: ")?;
    rest.split_whitespace()
        .next()
        .filter(|d| d.contains(':'))
        .map(str::to_string)
}

/// `repo@sha256:...` の一覧からリポジトリに一致する digest を探す
pub fn digest_from_repo_digests(repo: &str, repo_digests: &[String]) -> Option<String> {
    repo_digests.iter().find_map(|entry| {
        let (name, digest) = entry.split_once('@')?;
        (name == repo).then(|| digest.to_string())
    })
}
