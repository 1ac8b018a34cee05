#![doc = include_str!("../README.md")]

mod error;

pub mod config;
pub mod pipeline;
pub mod product;
pub mod reassembly;
pub mod sbn;
pub mod source;
pub mod writer;

pub use error::{Error, Result};
pub use product::{Fragment, ProductContainer};
pub use reassembly::{EngineStats, Event, FeedSequenceTracker, Outcome, ReassemblyEngine};
