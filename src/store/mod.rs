//! Persistent sync state: accounts, mirror entities, lists, and member links.

pub mod accounts;
pub mod db;
pub mod entities;
pub mod lists;

pub use db::Db;
pub use entities::{EntityHandle, EntityRecord};
pub use lists::{LinkRecord, ListEntityRecord};
