mod check;
mod config_cmd;
mod describe;
mod sync_cmd;

pub use check::CheckCommand;
pub use config_cmd::ConfigCommand;
pub use describe::DescribeCommand;
pub use sync_cmd::SyncCommand;
