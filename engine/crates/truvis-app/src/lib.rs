//! mesh viewer 的应用层
//!
//! 平台相关的部分（窗口、事件循环）由 `truvis-winit-app` 提供，
//! 这里只处理与平台无关的逻辑：输入事件、相机与动画、overlay 面板、资源加载和配置。

pub mod app_config;
pub mod assets;
pub mod gui_front;
pub mod overlay;
pub mod platform;
pub mod render_app;
pub mod scene;
