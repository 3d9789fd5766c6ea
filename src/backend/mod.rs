pub mod commands;
pub mod memory;
pub mod postgres;

pub use commands::{CommandAction, CommandApi, CommandError, EdgeFunctionClient};
pub use memory::{MemoryFeed, MemorySnapshots, SnapshotRelease};
pub use postgres::{PgChangeFeed, PgSnapshotSource};
