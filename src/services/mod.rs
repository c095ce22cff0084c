pub mod command;
pub mod overlay;
pub mod packaging;
pub mod pipeline;
pub mod queue;
pub mod renderer;
pub mod scheduler;
pub mod store;
pub mod transform;
pub mod worker;
