mod entry;
mod hold;
mod retention;

pub use entry::EntryCommands;
pub use hold::{HoldCommands, HoldCreateArgs};
pub use retention::RetentionCommands;
