pub mod agent;
pub mod debounce;
pub mod fs;
pub mod pipeline;
pub mod throttle;

pub use agent::{start, Agent, Trigger};
pub use debounce::Debouncer;
pub use fs::{FsEvent, FsEventKind, FsWatcher};
pub use pipeline::{Cycle, Pipeline};
pub use throttle::Throttle;
