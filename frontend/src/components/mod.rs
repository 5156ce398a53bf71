pub mod chat;
pub mod diff;
pub mod editor;
pub mod login;
pub mod sidebar;
