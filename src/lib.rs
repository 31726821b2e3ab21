pub mod cancel;
pub mod config;
pub mod converge;
pub mod domain;
pub mod fleet;
pub mod id;
pub mod jitter;
pub mod logging;
pub mod logicmonitor;
pub mod ops;
pub mod ring;
pub mod version;
