//! デプロイに使うイメージ参照の決定（プッシュ or ローカルタグ）

use crate::engine::ImageEngine;
use crate::error::{BuildError, BuildResult};
use crate::model::{Artifact, BuildOutcome, BuiltImages, Degradation, Staged};

/// ビルド済みイメージから最終的な参照を決定する
///
/// - プッシュする場合: `tag@digest`
/// - プッシュしない場合: `<image>:<id のハッシュ部分>` のタグを付けてそれを返す
///
/// どちらの場合も `built` に 1 件記録します。
pub async fn resolve_reference(
    engine: &dyn ImageEngine,
    push_images: bool,
    artifact: &Artifact,
    tag: &str,
    image_id: &str,
    built: &mut BuiltImages,
) -> BuildResult<Staged<BuildOutcome>> {
    if push_images {
        let digest = engine.push(tag).await.map_err(|source| BuildError::Push {
            tag: tag.to_string(),
            source,
        })?;

        // prune 用のローカル ID（取れなくてもビルドは成功扱い）
        let mut degraded = Vec::new();
        let local_id = match engine.inspect(tag).await {
            Ok(metadata) => Some(metadata.id),
            Err(e) => {
                degraded.push(Degradation::ImageIdLookup {
                    tag: tag.to_string(),
                    reason: e.to_string(),
                });
                None
            }
        };
        built.record(&artifact.image_name, local_id);

        return Ok(Staged::with(
            BuildOutcome {
                final_reference: format!("{}@{}", tag, digest),
                digest_form: true,
            },
            degraded,
        ));
    }

    // Kubernetes はイメージ ID を参照として解決できないため、ID 由来のタグを付けて使う
    built.record(&artifact.image_name, Some(image_id.to_string()));
    let unique_tag = unique_local_tag(&artifact.image_name, image_id);
    engine
        .tag(image_id, &unique_tag)
        .await
        .map_err(|source| BuildError::Tag {
            image_id: image_id.to_string(),
            tag: unique_tag.clone(),
            source,
        })?;

    Ok(Staged::done(BuildOutcome {
        final_reference: unique_tag,
        digest_form: false,
    }))
}

/// `myapp` + `sha256:abc123` -> `myapp:abc123`
pub fn unique_local_tag(image_name: &str, image_id: &str) -> String {
    let hash = image_id.split_once(':').map_or(image_id, |(_, hash)| hash);
    format!("{}:{}", image_name, hash)
}
