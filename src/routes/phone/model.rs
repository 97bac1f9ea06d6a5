use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct UploadPhoneNumberParams {
    /// getPhoneNumber 的授权code
    #[serde(default)]
    pub code: String,
    /// 注册来源
    #[serde(default)]
    pub source: String,
}

/// 直接上送号码串的方式
#[derive(Debug, Deserialize)]
pub struct UploadUserPhoneParams {
    #[serde(default, rename = "phoneNumber")]
    pub phone_number: String,
}

/// 旧方式：前端自己拿到 sessionKey 后上送加密数据
#[derive(Debug, Deserialize)]
pub struct ChangePhoneNumberParams {
    #[serde(default, rename = "sessionKey")]
    pub session_key: String,
    #[serde(default)]
    pub iv: String,
    #[serde(default, rename = "encryptedData")]
    pub encrypted_data: String,
}

#[derive(Debug, Deserialize)]
pub struct GetUserInfoByPhoneParams {
    #[serde(default, rename = "phoneNumber")]
    pub phone_number: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_user_phone_params_rename_and_default() {
        let params: UploadUserPhoneParams =
            serde_json::from_str(r#"{"phoneNumber":"+8613800138000"}"#).unwrap();
        assert_eq!(params.phone_number, "+8613800138000");

        let params: UploadUserPhoneParams = serde_json::from_str("{}").unwrap();
        assert!(params.phone_number.is_empty());
    }

    #[test]
    fn change_phone_number_params_renames() {
        let params: ChangePhoneNumberParams = serde_json::from_str(
            r#"{"sessionKey":"k","iv":"i","encryptedData":"e"}"#,
        )
        .unwrap();
        assert_eq!(params.session_key, "k");
        assert_eq!(params.iv, "i");
        assert_eq!(params.encrypted_data, "e");
    }
}
