pub mod chat;
pub mod meta;
pub mod projects;
