// 微信小程序服务端接口与加解密

pub mod client;
pub mod crypto;

pub use client::{CodeSessionResponse, PhoneInfo, WechatClient, parse_mock_code};
pub use crypto::{DecryptError, decrypt_data};
