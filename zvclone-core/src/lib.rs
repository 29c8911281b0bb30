pub mod command;
pub mod error;
pub mod output_macros;
pub mod units;

pub use command::is_tool_installed;
