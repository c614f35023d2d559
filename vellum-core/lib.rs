use smartstring::{LazyCompact, SmartString};

pub mod collections;
pub mod command;
pub mod diff;
pub mod history;
pub mod postpone;
pub mod session;
pub mod tree;

pub type Tendril = SmartString<LazyCompact>;
