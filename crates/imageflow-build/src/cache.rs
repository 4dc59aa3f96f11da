//! cache-from イメージの事前取得

use crate::engine::ImageEngine;
use crate::error::{BuildError, BuildResult};
use crate::model::{Artifact, Degradation, Staged};

/// アーティファクトの cache-from イメージをローカルに用意する
///
/// pull の失敗はビルドを止めず `Degradation::CachePullMiss` として返します。
/// ローカル存在確認そのものの失敗は致命的です。
pub async fn warm_cache(engine: &dyn ImageEngine, artifact: &Artifact) -> BuildResult<Staged<()>> {
    let mut degraded = Vec::new();

    for image in &artifact.cache_from {
        let present = engine
            .image_id(image)
            .await
            .map_err(|source| BuildError::CacheLookup {
                image: image.clone(),
                source,
            })?;

        if present.is_some() {
            tracing::debug!("cache-from image already present: {}", image);
            continue;
        }

        if let Err(e) = engine.pull(image).await {
            degraded.push(Degradation::CachePullMiss {
                image: image.clone(),
                reason: e.to_string(),
            });
        }
    }

    Ok(Staged::with((), degraded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeEngine};

    #[tokio::test]
    async fn test_no_cache_from_is_noop() {
        let engine = FakeEngine::new();
        let artifact = Artifact::new("app", ".");

        let staged = warm_cache(&engine, &artifact).await.unwrap();
        assert!(staged.degraded.is_empty());
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_present_image_is_skipped() {
        let engine = FakeEngine::new().with_image("app:cache", "sha256:aaa");
        let artifact = Artifact::new("app", ".").with_cache_from("app:cache");

        let staged = warm_cache(&engine, &artifact).await.unwrap();
        assert!(staged.degraded.is_empty());
        assert_eq!(engine.calls(), vec![Call::ImageId("app:cache".to_string())]);
    }

    #[tokio::test]
    async fn test_missing_image_is_pulled() {
        let engine = FakeEngine::new();
        let artifact = Artifact::new("app", ".").with_cache_from("app:cache");

        let staged = warm_cache(&engine, &artifact).await.unwrap();
        assert!(staged.degraded.is_empty());
        assert_eq!(
            engine.calls(),
            vec![
                Call::ImageId("app:cache".to_string()),
                Call::Pull("app:cache".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_pull_failure_degrades_and_continues() {
        let engine = FakeEngine::new().failing_pull("base:missing");
        let artifact = Artifact::new("app", ".")
            .with_cache_from("base:missing")
            .with_cache_from("base:other");

        let staged = warm_cache(&engine, &artifact).await.unwrap();
        assert_eq!(staged.degraded.len(), 1);
        assert!(matches!(
            &staged.degraded[0],
            Degradation::CachePullMiss { image, .. } if image == "base:missing"
        ));
        assert!(engine.calls().contains(&Call::Pull("base:other".to_string())));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_fatal() {
        let engine = FakeEngine::new().failing_lookup("broken:1");
        let artifact = Artifact::new("app", ".")
            .with_cache_from("broken:1")
            .with_cache_from("never:1");

        let result = warm_cache(&engine, &artifact).await;
        assert!(matches!(
            result,
            Err(BuildError::CacheLookup { ref image, .. }) if image == "broken:1"
        ));
        assert!(!engine.calls().contains(&Call::ImageId("never:1".to_string())));
    }
}
