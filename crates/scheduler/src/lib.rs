//! Resume Scheduler - quota-aware resumption of paused automation
//!
//! When backend quota is exhausted, automation for a work unit pauses and
//! a timer is armed for the suggested reset time. When the timer fires
//! the live quota state is re-checked: recovered quota resumes the unit,
//! still-exhausted quota re-arms the timer with an updated timestamp.
//! Manual cancellation always wins, even against a timer firing in the
//! same instant.

mod event;
mod scheduler;

pub use event::{ResumeEvent, ResumeEventKind};
pub use scheduler::{QuotaProbe, ResumeScheduler, UnitState};
