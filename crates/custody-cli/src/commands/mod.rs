pub mod dispatch;
pub mod entry;
pub mod hold;
pub mod retention;
pub mod shared;
pub mod verify;
