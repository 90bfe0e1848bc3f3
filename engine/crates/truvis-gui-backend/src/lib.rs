//! 基于 imgui-rs 的 overlay 绘制
//!
//! 参考 imgui-rs-vulkan-renderer：每个 frame slot 持有一份 host 可见的 vertex / index buffer，
//! 字体纹理在初始化时上传一次。

pub mod gui_mesh;
pub mod gui_pass;
pub mod gui_vertex_layout;
