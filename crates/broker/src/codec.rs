//! 디스커버리 메시지 코덱
//!
//! 와이어 형식은 UTF-8 JSON 객체 하나입니다: `{"name": "<repository>"}`

use dofinder_core::types::ImageReference;

use crate::error::BrokerClientError;

/// 이미지 참조를 메시지 본문으로 직렬화합니다.
pub fn encode_image(image: &ImageReference) -> Result<Vec<u8>, BrokerClientError> {
    serde_json::to_vec(image).map_err(|e| BrokerClientError::Decode(e.to_string()))
}

/// 메시지 본문을 이미지 참조로 역직렬화합니다.
///
/// 저장소 이름이 비어 있거나 공백을 포함하면 거부합니다.
pub fn decode_image(payload: &[u8]) -> Result<ImageReference, BrokerClientError> {
    let image: ImageReference = serde_json::from_slice(payload)
        .map_err(|e| BrokerClientError::Decode(format!("{e}")))?;

    let name = image.repository.trim();
    if name.is_empty() {
        return Err(BrokerClientError::Decode("empty repository name".to_owned()));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(BrokerClientError::Decode(format!(
            "repository name contains whitespace: {name:?}"
        )));
    }

    Ok(ImageReference::new(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_name_field() {
        let payload = encode_image(&ImageReference::new("acme/tool")).unwrap();
        assert_eq!(payload, br#"{"name":"acme/tool"}"#);
    }

    #[test]
    fn decodes_wire_message() {
        let image = decode_image(br#"{"name": "nginx"}"#).unwrap();
        assert_eq!(image.repository, "nginx");
    }

    #[test]
    fn ignores_unknown_fields() {
        let image = decode_image(br#"{"name": "redis", "page": 3}"#).unwrap();
        assert_eq!(image.repository, "redis");
    }

    #[test]
    fn rejects_missing_name() {
        assert!(decode_image(br#"{"repo": "nginx"}"#).is_err());
    }

    #[test]
    fn rejects_non_json() {
        let err = decode_image(b"nginx").unwrap_err();
        assert!(matches!(err, BrokerClientError::Decode(_)));
    }

    #[test]
    fn rejects_blank_and_spaced_names() {
        assert!(decode_image(br#"{"name": "  "}"#).is_err());
        assert!(decode_image(br#"{"name": "acme tool"}"#).is_err());
    }
}
