pub mod cat;
pub mod cleanup;
pub mod copy;
pub mod history;
pub mod init;
pub mod list;
pub mod mkdir;
pub mod put;
pub mod verify;

pub use cat::cat_command;
pub use cleanup::cleanup_command;
pub use copy::{copy_command, move_command, remove_command};
pub use history::{history_command, prune_command, recover_command};
pub use init::init_command;
pub use list::{list_command, stat_command};
pub use mkdir::mkdir_command;
pub use put::put_command;
pub use verify::verify_command;
