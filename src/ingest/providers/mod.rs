// src/ingest/providers/mod.rs
pub mod ics;
pub mod schedule_page;

pub use ics::IcsFeedProvider;
pub use schedule_page::SchedulePageProvider;
