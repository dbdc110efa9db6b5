// Core encoding engine - independent of the console front-end

pub mod core;
pub mod hardware;
pub mod probe;
pub mod scale;

pub use core::*;
