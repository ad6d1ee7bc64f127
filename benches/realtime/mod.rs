mod context;
mod decision;
mod scheduler;

pub use context::bench_context;
pub use decision::bench_decision;
pub use scheduler::bench_scheduler;
