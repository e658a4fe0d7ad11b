pub mod controls;
pub mod dispatcher;
pub mod error;
pub mod geometry;
pub mod object;
pub mod signal;
pub mod time;
pub mod timer;

pub use dispatcher::EventDispatcher;
pub use object::{Message, Object, ObjectCore};
pub use signal::{ConnectionType, Signal};
pub use timer::Timer;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;
