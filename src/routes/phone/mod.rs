mod handler;
mod model;

pub use handler::{
    change_phone_number, get_user_info_by_phone, upload_phone_number, upload_user_phone,
};
pub use model::{
    ChangePhoneNumberParams, GetUserInfoByPhoneParams, UploadPhoneNumberParams,
    UploadUserPhoneParams,
};
