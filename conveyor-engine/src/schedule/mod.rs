//! Cron parsing and the scheduling loop.

pub mod cron;
pub mod scheduler;

pub use cron::CronSchedule;
pub use scheduler::Scheduler;
