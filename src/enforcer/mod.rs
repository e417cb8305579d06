mod controller;
mod loop_worker;

pub use controller::EnforcerController;
pub use loop_worker::{enforcement_loop, EnforcerDeps};
