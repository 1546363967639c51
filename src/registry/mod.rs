/*!
 * Command registry and loader
 *
 * - `descriptor`: command file format and validation
 * - `command_registry`: live name -> descriptor map shared with the rest of the app
 * - `loader`: plan/commit/apply of file loads and retirements
 * - `name_locks`: per-name async locks the loader takes around each write
 */

pub mod command_registry;
pub mod descriptor;
pub mod loader;
pub mod name_locks;

pub use command_registry::{CommandRegistry, RegistryEntry};
pub use descriptor::{is_valid_name, CommandDescriptor, Scope};
pub use loader::{LoadOutcome, LoadedCommand, ModuleLoader};
