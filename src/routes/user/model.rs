use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ReportAuthorizeResultParams {
    /// 已授权scope列表
    pub scopes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GetUserInfoByUnionIdParams {
    #[serde(default, rename = "unionId")]
    pub union_id: String,
}
