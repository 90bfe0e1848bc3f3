pub mod executor;
pub mod frame_counter;
pub mod gpu_timer;
pub mod orchestrator;
pub mod plan;
