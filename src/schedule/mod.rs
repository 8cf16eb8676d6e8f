pub mod expression;

pub use expression::{minute_slot, Schedule, ScheduleError};
