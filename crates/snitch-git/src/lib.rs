pub mod command;
pub mod inspector;
pub mod parse;

pub use command::GitError;
pub use inspector::{origin_url, toplevel, user_name, GitInspector, RevisionSource};
pub use parse::{CommitBlock, RawEntry};
