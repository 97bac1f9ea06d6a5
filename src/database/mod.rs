// 数据库实体与操作

pub mod models;

pub use models::account::Account;
pub use models::auth_log::AuthLog;
pub use models::phone_number::PhoneNumber;
pub use models::session_log::CodeSessionLog;
pub use models::wechat_user::{Gender, Language, WechatUser};
