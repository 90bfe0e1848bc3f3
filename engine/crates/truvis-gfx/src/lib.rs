//! Vulkan RHI (Rendering Hardware Interface) 抽象层
//!
//! 提供对 Vulkan API 的薄封装，包括设备管理、命令缓冲、描述符、管线、加速结构等。
//! 所有 Vulkan 资源通过 [`gfx::Gfx`] 单例访问设备与分配器，简化生命周期和借用关系。
//!
//! 资源都提供显式的 `destroy()`；buffer、pipeline 这类资源在 `Drop` 中自行释放，
//! image、image view、command pool 等资源的 `Drop` 只检查是否遗漏了销毁。

pub mod basic;
pub mod commands;
pub mod descriptors;
pub mod foundation;
pub mod gfx;
pub mod gfx_core;
pub mod pipelines;
pub mod query;
pub mod raytracing;
pub mod resources;
pub mod swapchain;
