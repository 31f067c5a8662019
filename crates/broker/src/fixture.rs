//! 테스트 픽스처 파일
//!
//! 크롤링 결과를 디스커버리 메시지 본문의 JSON 배열로 저장해 두고,
//! 레지스트리를 다시 크롤링하지 않고도 같은 메시지 묶음을 재발행할 수 있습니다.
//!
//! ```json
//! ["{\"name\":\"nginx\"}", "{\"name\":\"acme/tool\"}"]
//! ```

use std::path::Path;

use tracing::info;

use dofinder_core::types::ImageReference;

use crate::codec::{decode_image, encode_image};
use crate::error::BrokerClientError;

fn fixture_error(path: &Path, reason: impl ToString) -> BrokerClientError {
    BrokerClientError::Fixture {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// 이미지 참조 목록을 픽스처 파일로 저장합니다. 기존 파일은 덮어씁니다.
pub async fn save_fixture(
    path: impl AsRef<Path>,
    images: &[ImageReference],
) -> Result<(), BrokerClientError> {
    let path = path.as_ref();
    let payloads = images
        .iter()
        .map(|image| {
            let bytes = encode_image(image)?;
            String::from_utf8(bytes).map_err(|e| fixture_error(path, e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let json = serde_json::to_string_pretty(&payloads).map_err(|e| fixture_error(path, e))?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| fixture_error(path, e))?;

    info!(path = %path.display(), count = payloads.len(), "fixture saved");
    Ok(())
}

/// 픽스처 파일을 읽어 이미지 참조 목록으로 돌려줍니다.
///
/// 항목 하나라도 디스커버리 메시지 형식이 아니면 실패합니다.
pub async fn load_fixture(path: impl AsRef<Path>) -> Result<Vec<ImageReference>, BrokerClientError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| fixture_error(path, e))?;
    let payloads: Vec<String> =
        serde_json::from_str(&content).map_err(|e| fixture_error(path, e))?;

    payloads
        .iter()
        .enumerate()
        .map(|(index, payload)| {
            decode_image(payload.as_bytes())
                .map_err(|e| fixture_error(path, format!("entry {index}: {e}")))
        })
        .collect()
}
