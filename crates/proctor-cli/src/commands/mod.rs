pub mod init;
pub mod login;
pub mod run;
pub mod sessions;
pub mod validate;
