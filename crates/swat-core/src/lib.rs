//! Orchestration of the SWAT+ watershed model: text-file editing, sampled
//! parallel runs, time-series extraction and performance indicators.

pub mod common;
pub mod domain;
pub mod metrics;
pub mod numerics;
pub mod sensitivity;
pub mod table;
pub mod timeseries;
pub mod txtinout;
