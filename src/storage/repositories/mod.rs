/*!
 * Table access: one small struct per table, straight sqlx, borrowing the manager
 */

pub mod command_aliases;
pub mod command_hashes;

pub use command_aliases::CommandAliases;
pub use command_hashes::CommandHashes;
