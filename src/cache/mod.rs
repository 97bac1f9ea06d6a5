// 缓存与分布式锁

pub mod lock;

pub use lock::LockManager;
