pub mod account;
pub mod auth_log;
pub mod phone_number;
pub mod session_log;
pub mod wechat_user;
