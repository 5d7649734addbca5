pub mod compare;
pub mod compose;
pub mod init;
pub mod issue_codes;
pub mod list_models;
pub mod submit;
pub mod validate;
