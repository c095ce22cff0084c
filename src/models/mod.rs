pub mod job;
pub mod mapstate;
pub mod metadata;
pub mod report;
