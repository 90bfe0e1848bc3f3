//! GLSL 着色器编译器
//!
//! 使用 glslc (来自 Vulkan SDK) 将 GLSL 着色器编译为 SPIR-V

use anyhow::Context;

use crate::common::{EnvPath, ShaderCompileTask};

#[derive(Debug, Default)]
pub struct GlslCompiler;

impl GlslCompiler {
    pub const fn new() -> Self {
        Self
    }

    pub fn compile(&self, task: &ShaderCompileTask) -> anyhow::Result<()> {
        // 确保输出目录存在
        if let Some(parent) = task.output_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create dir: {}", parent.display()))?;
        }

        let output = std::process::Command::new("glslc")
            .arg(format!("-I{}", EnvPath::shader_include_path().display()))
            .arg(format!("-fshader-stage={}", task.shader_stage.glslc_name()))
            .args([
                "-g", // 生成调试信息
                "--target-env=vulkan1.2",
                "--target-spv=spv1.4", // Ray tracing 最低版本为 spv1.4
                "-o",
            ])
            .arg(&task.output_path)
            .arg(&task.shader_path)
            .output()
            .context("failed to execute glslc, is the Vulkan SDK installed?")?;

        if !output.stdout.is_empty() {
            log::info!("stdout: {}", String::from_utf8_lossy(&output.stdout));
        }
        anyhow::ensure!(
            output.status.success(),
            "glslc failed on {}:\n{}",
            task.shader_path.display(),
            String::from_utf8_lossy(&output.stderr)
        );
        Ok(())
    }
}
