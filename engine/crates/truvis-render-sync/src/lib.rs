//! GPU 资源的状态跟踪
//!
//! 每个 image / buffer 都持有自己当前的 (stage, access, layout)，
//! 只能通过 [`tracker::TrackedImage::transition`] / [`tracker::TrackedBuffer::transition`] 修改。
//! 每次状态转换都会产生恰好一个 barrier，并无条件地把资源状态更新为目标状态。

pub mod barrier;
pub mod resource_state;
pub mod tracker;
