pub mod phone;
pub mod rpc;
pub mod session;
pub mod user;
