mod handler;
mod model;

pub use handler::{code_to_session, decrypt_data, update_profile};
pub use model::{CodeToSessionParams, DecryptDataParams, UpdateProfileParams};
