//! Search for strix: a Lazy SMP alpha-beta engine over any [`strix_core::Position`].

pub mod config;
pub mod error;
pub mod search;
pub mod time;

pub use config::SearchOptions;
pub use error::OptionError;
pub use search::SearchResult;
pub use search::control::SearchControl;
pub use search::limits::SearchLimits;
pub use search::pool::ThreadPool;
pub use search::report::{InfoFull, InfoIteration, InfoShort, NullListener, Score, ScoreBound, SearchListener};
pub use time::TimeManager;
