mod catalog;
mod clock;
mod error;
mod router;
mod rules;

pub mod app;
pub mod buffer;
pub mod state;
pub mod transport;

mod runner;
pub use runner::Runner;

pub use app::{AppStatus, Application, Context, DataStatus, Processor};
pub use buffer::{BufferError, DataBuffer, Projection, Series};
pub use catalog::Catalog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AppError, CallbackError, ProcessError, RunnerError, TransportError};
pub use router::{Route, Routes, resolve};
pub use rules::{Rules, SharedRules};
pub use state::{Callback, State, Stored, TimerInfo};
pub use transport::{AsyncTransport, Correlator, Transport};

#[cfg(test)]
mod __tests__;
