pub mod common;
pub mod logging;

pub use common::{expand_path, home_dir, VerbosityArgs};
pub use logging::{init_logging, Verbosity};
