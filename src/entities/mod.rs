pub mod password_reset_token;
pub mod record;
pub mod topic;
pub mod user;
