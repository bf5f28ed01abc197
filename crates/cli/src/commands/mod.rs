pub mod correlate;
pub mod matches;
pub mod project;
pub mod runs;
pub mod util;

pub use correlate::*;
pub use matches::*;
pub use project::*;
pub use runs::*;
pub use util::*;
