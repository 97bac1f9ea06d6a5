pub mod hooks;
pub mod user_manager;

pub use hooks::{
    AfterExchangeContext, BeforeExchangeContext, CodeToSessionHook, HookRegistry, PhoneNumberHook,
    PhoneReportContext,
};
pub use user_manager::{BusinessUser, DatabaseUserManager, UserManager};
