use serde::Deserialize;

/// wx.login 登录参数。appId 缺省时退回唯一有效账号；
/// code 开发环境可用 mock_{"openid":"XXX","unionid":"YYY","session_key":"123"} 模拟指定用户登录
#[derive(Debug, Deserialize)]
pub struct CodeToSessionParams {
    #[serde(default, rename = "appId")]
    pub app_id: String,
    pub code: String,
}

/// 旧版 wx.getUserProfile 授权数据
#[derive(Debug, Deserialize)]
pub struct UpdateProfileParams {
    #[serde(default, rename = "appId")]
    pub app_id: String,
    pub code: String,
    pub iv: String,
    #[serde(rename = "encryptedData")]
    pub encrypted_data: String,
}

#[derive(Debug, Deserialize)]
pub struct DecryptDataParams {
    #[serde(default, rename = "appId")]
    pub app_id: String,
    pub code: String,
    pub iv: String,
    #[serde(rename = "encryptedData")]
    pub encrypted_data: String,
}
