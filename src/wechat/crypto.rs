use aes::Aes128;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use serde_json::{Map, Value};
use thiserror::Error;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("failed to decode encrypted data")]
    InvalidEncryptedData,
    #[error("failed to decode session key")]
    InvalidSessionKey,
    #[error("failed to decode iv")]
    InvalidIv,
    #[error("failed to decrypt payload")]
    DecryptFailed,
    #[error("the given payload is invalid")]
    InvalidPayload,
}

/// 解密微信加密数据（AES-128-CBC + PKCS#7），明文必须是JSON对象。
/// 解密失败都是数据/客户端问题，不做重试。
pub fn decrypt_data(
    session_key: &str,
    iv: &str,
    encrypted: &str,
) -> Result<Map<String, Value>, DecryptError> {
    let encrypted_data = BASE64
        .decode(encrypted)
        .map_err(|_| DecryptError::InvalidEncryptedData)?;
    let session_key_data = BASE64
        .decode(session_key)
        .map_err(|_| DecryptError::InvalidSessionKey)?;
    let iv_data = BASE64.decode(iv).map_err(|_| DecryptError::InvalidIv)?;

    if session_key_data.len() != 16 {
        return Err(DecryptError::InvalidSessionKey);
    }
    if iv_data.len() != 16 {
        return Err(DecryptError::InvalidIv);
    }

    let plaintext = Aes128CbcDec::new(
        session_key_data.as_slice().into(),
        iv_data.as_slice().into(),
    )
    .decrypt_padded_vec_mut::<Pkcs7>(&encrypted_data)
    .map_err(|_| DecryptError::DecryptFailed)?;

    let decoded: Value =
        serde_json::from_slice(&plaintext).map_err(|_| DecryptError::InvalidPayload)?;
    match decoded {
        Value::Object(map) => Ok(map),
        _ => Err(DecryptError::InvalidPayload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbc::cipher::{BlockEncryptMut, KeyIvInit};

    type Aes128CbcEnc = cbc::Encryptor<Aes128>;

    fn encrypt(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> String {
        let ciphertext = Aes128CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        BASE64.encode(ciphertext)
    }

    #[test]
    fn round_trip_returns_original_object() {
        let key = [7u8; 16];
        let iv = [9u8; 16];
        let plaintext = br#"{"phoneNumber":"+8613800138000","countryCode":"86"}"#;
        let encrypted = encrypt(&key, &iv, plaintext);

        let result = decrypt_data(&BASE64.encode(key), &BASE64.encode(iv), &encrypted).unwrap();
        assert_eq!(result["phoneNumber"], "+8613800138000");
        assert_eq!(result["countryCode"], "86");
    }

    #[test]
    fn corrupted_base64_iv_fails() {
        let key = [7u8; 16];
        let iv = [9u8; 16];
        let encrypted = encrypt(&key, &iv, b"{}");

        let err = decrypt_data(&BASE64.encode(key), "not base64!!!", &encrypted).unwrap_err();
        assert!(matches!(err, DecryptError::InvalidIv));
    }

    #[test]
    fn wrong_key_length_fails() {
        let key = [7u8; 16];
        let iv = [9u8; 16];
        let encrypted = encrypt(&key, &iv, b"{}");

        let short_key = BASE64.encode([1u8; 8]);
        let err = decrypt_data(&short_key, &BASE64.encode(iv), &encrypted).unwrap_err();
        assert!(matches!(err, DecryptError::InvalidSessionKey));
    }

    #[test]
    fn wrong_key_fails_on_padding() {
        let key = [7u8; 16];
        let iv = [9u8; 16];
        let encrypted = encrypt(&key, &iv, br#"{"a":1}"#);

        let other_key = BASE64.encode([8u8; 16]);
        let err = decrypt_data(&other_key, &BASE64.encode(iv), &encrypted).unwrap_err();
        assert!(matches!(
            err,
            DecryptError::DecryptFailed | DecryptError::InvalidPayload
        ));
    }

    #[test]
    fn non_json_plaintext_fails() {
        let key = [7u8; 16];
        let iv = [9u8; 16];
        let encrypted = encrypt(&key, &iv, b"hello world");

        let err = decrypt_data(&BASE64.encode(key), &BASE64.encode(iv), &encrypted).unwrap_err();
        assert!(matches!(err, DecryptError::InvalidPayload));
    }

    #[test]
    fn json_scalar_plaintext_fails() {
        let key = [7u8; 16];
        let iv = [9u8; 16];
        let encrypted = encrypt(&key, &iv, b"42");

        let err = decrypt_data(&BASE64.encode(key), &BASE64.encode(iv), &encrypted).unwrap_err();
        assert!(matches!(err, DecryptError::InvalidPayload));
    }
}
