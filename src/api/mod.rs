pub mod chat;
pub mod records;
pub mod search;
