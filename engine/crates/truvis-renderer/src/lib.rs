//! 单网格渲染器
//!
//! - [`resources`]：静态资源与分辨率相关资源的生命周期
//! - [`raytracing`]：加速结构的构建与逐帧更新，SBT 布局
//! - [`frame`]：每帧的执行计划（barrier 由 render-sync 的 tracker 计算）以及录制
//! - [`passes`]：raster、ray tracing、present copy 三个 pass
//! - [`renderer::Renderer`]：把以上组合起来，对外提供 `render_frame` / `resize`

pub mod frame;
pub mod passes;
pub mod present;
pub mod raytracing;
pub mod renderer;
pub mod resources;
pub mod settings;
