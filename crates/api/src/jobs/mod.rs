//! Background job scheduler and job implementations.

mod pool_metrics;
mod scheduler;
mod tunnel_sweep;

pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobError, JobFrequency, JobScheduler};
pub use tunnel_sweep::TunnelSweepJob;
