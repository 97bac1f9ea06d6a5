mod handler;
mod model;

pub use handler::{get_current_user, get_user_info_by_union_id, report_authorize_result};
pub use model::{GetUserInfoByUnionIdParams, ReportAuthorizeResultParams};
