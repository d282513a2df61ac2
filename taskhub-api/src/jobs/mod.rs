//! Background jobs.

pub mod timeout_sweep;

pub use timeout_sweep::{
    run_once, timeout_sweep_task, TimeoutSweepConfig, TimeoutSweepMetrics, TimeoutSweepSnapshot,
};
