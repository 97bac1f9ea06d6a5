use std::sync::Arc;

use serde_json::{Map, Value};

use crate::database::{Account, CodeSessionLog, WechatUser};
use crate::error::ApiError;
use crate::infrastructure::user_manager::BusinessUser;

/// code2session 扩展点的两个阶段：
/// before 可以整体接管流程（例如测试桩登录），after 只能改结果。
/// 监听器按注册顺序同步执行。
pub struct BeforeExchangeContext<'a> {
    pub account: &'a Account,
    pub code: &'a str,
    pub log: &'a CodeSessionLog,
}

pub struct AfterExchangeContext<'a> {
    pub biz_user: &'a BusinessUser,
    pub wechat_user: &'a WechatUser,
    pub log: &'a CodeSessionLog,
}

pub trait CodeToSessionHook: Send + Sync {
    /// 返回 Some 时流程提前结束，直接把这个结果回给客户端
    fn before(&self, _ctx: &BeforeExchangeContext) -> Option<Map<String, Value>> {
        None
    }

    fn after(&self, _ctx: &AfterExchangeContext, _result: &mut Map<String, Value>) {}
}

/// 待上报的手机号。监听器看到的是候选值而不是数据库行：
/// 否决时库里不会留下任何痕迹。
pub struct PhoneReportContext<'a> {
    pub wechat_user: &'a WechatUser,
    pub phone_number: &'a str,
    pub country_code: Option<&'a str>,
    pub source: &'a str,
}

pub trait PhoneNumberHook: Send + Sync {
    /// 持久化前调用，返回 Err 即否决本次上报
    fn on_report(
        &self,
        _ctx: &PhoneReportContext,
        _result: &mut Map<String, Value>,
    ) -> Result<(), ApiError> {
        Ok(())
    }
}

/// 宿主应用在启动时注册监听器
#[derive(Default)]
pub struct HookRegistry {
    code_to_session: Vec<Arc<dyn CodeToSessionHook>>,
    phone_number: Vec<Arc<dyn PhoneNumberHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_code_to_session(&mut self, hook: Arc<dyn CodeToSessionHook>) {
        self.code_to_session.push(hook);
    }

    pub fn register_phone_number(&mut self, hook: Arc<dyn PhoneNumberHook>) {
        self.phone_number.push(hook);
    }

    /// 第一个返回 Some 的监听器胜出
    pub fn run_before(&self, ctx: &BeforeExchangeContext) -> Option<Map<String, Value>> {
        for hook in &self.code_to_session {
            if let Some(result) = hook.before(ctx) {
                return Some(result);
            }
        }
        None
    }

    pub fn run_after(&self, ctx: &AfterExchangeContext, result: &mut Map<String, Value>) {
        for hook in &self.code_to_session {
            hook.after(ctx, result);
        }
    }

    pub fn run_phone_report(
        &self,
        ctx: &PhoneReportContext,
        result: &mut Map<String, Value>,
    ) -> Result<(), ApiError> {
        for hook in &self.phone_number {
            hook.on_report(ctx, result)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_log() -> CodeSessionLog {
        CodeSessionLog {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            code: "code-1".into(),
            open_id: "openid-abc".into(),
            union_id: None,
            session_key: "key".into(),
            raw_data: None,
            created_from_ip: None,
            created_at: Utc::now(),
        }
    }

    fn sample_account() -> Account {
        Account {
            id: Uuid::new_v4(),
            app_id: "wx123".into(),
            app_secret: "secret".into(),
            name: "测试小程序".into(),
            valid: true,
            created_at: Utc::now(),
        }
    }

    struct Override;
    impl CodeToSessionHook for Override {
        fn before(&self, _ctx: &BeforeExchangeContext) -> Option<Map<String, Value>> {
            let mut map = Map::new();
            map.insert("mock".into(), Value::Bool(true));
            Some(map)
        }
    }

    struct Tagger(&'static str);
    impl CodeToSessionHook for Tagger {
        fn after(&self, _ctx: &AfterExchangeContext, result: &mut Map<String, Value>) {
            let tags = result
                .entry("tags")
                .or_insert_with(|| Value::Array(vec![]));
            if let Value::Array(arr) = tags {
                arr.push(Value::String(self.0.to_string()));
            }
        }
    }

    #[test]
    fn before_short_circuits_with_first_override() {
        let mut registry = HookRegistry::new();
        registry.register_code_to_session(Arc::new(Tagger("a")));
        registry.register_code_to_session(Arc::new(Override));

        let account = sample_account();
        let log = sample_log();
        let ctx = BeforeExchangeContext {
            account: &account,
            code: "code-1",
            log: &log,
        };
        let result = registry.run_before(&ctx).unwrap();
        assert_eq!(result["mock"], Value::Bool(true));
    }

    #[test]
    fn after_runs_in_registration_order() {
        let mut registry = HookRegistry::new();
        registry.register_code_to_session(Arc::new(Tagger("first")));
        registry.register_code_to_session(Arc::new(Tagger("second")));

        let account = sample_account();
        let log = sample_log();
        let biz_user = BusinessUser {
            id: Uuid::new_v4(),
            identifier: "openid-abc".into(),
            identity: None,
            nickname: "微信用户".into(),
            avatar_url: None,
            mobile: None,
            created_at: Utc::now(),
        };
        let wechat_user = WechatUser {
            id: Uuid::new_v4(),
            account_id: account.id,
            open_id: "openid-abc".into(),
            union_id: None,
            nick_name: None,
            avatar_url: None,
            gender: 0,
            country: None,
            province: None,
            city: None,
            language: "zh_CN".into(),
            raw_data: None,
            authorize_scopes: None,
            sys_user_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let ctx = AfterExchangeContext {
            biz_user: &biz_user,
            wechat_user: &wechat_user,
            log: &log,
        };
        let mut result = Map::new();
        registry.run_after(&ctx, &mut result);
        assert_eq!(
            result["tags"],
            Value::Array(vec!["first".into(), "second".into()])
        );
    }

    /// 按候选号码决定是否否决，模拟黑名单监听器
    struct Blacklist(&'static str);
    impl PhoneNumberHook for Blacklist {
        fn on_report(
            &self,
            ctx: &PhoneReportContext,
            _result: &mut Map<String, Value>,
        ) -> Result<(), ApiError> {
            if ctx.phone_number == self.0 {
                return Err(ApiError::PhoneRetrieval("黑名单号码".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn phone_hook_vetoes_on_candidate_value() {
        let mut registry = HookRegistry::new();
        registry.register_phone_number(Arc::new(Blacklist("+8613800138000")));

        let account = sample_account();
        let wechat_user = WechatUser {
            id: Uuid::new_v4(),
            account_id: account.id,
            open_id: "openid-abc".into(),
            union_id: None,
            nick_name: None,
            avatar_url: None,
            gender: 0,
            country: None,
            province: None,
            city: None,
            language: "zh_CN".into(),
            raw_data: None,
            authorize_scopes: None,
            sys_user_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let ctx = PhoneReportContext {
            wechat_user: &wechat_user,
            phone_number: "+8613800138000",
            country_code: Some("86"),
            source: "",
        };
        let mut result = Map::new();
        assert!(registry.run_phone_report(&ctx, &mut result).is_err());

        let ctx = PhoneReportContext {
            wechat_user: &wechat_user,
            phone_number: "+8613900139000",
            country_code: Some("86"),
            source: "",
        };
        assert!(registry.run_phone_report(&ctx, &mut result).is_ok());
    }
}
