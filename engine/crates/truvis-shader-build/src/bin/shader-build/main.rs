//! Shader 编译工具
//!
//! 将 `engine/shader/src` 下的所有 shader 文件编译为 SPIR-V 文件，输出到 `engine/shader/.build` 目录

mod common;
mod glsl;

use common::{EnvPath, ShaderCompileTask};
use glsl::GlslCompiler;
use rayon::prelude::*;
use truvis_crate_tools::init_log::init_log;

fn main() {
    init_log();

    log::info!("Shader include path: {:?}", EnvPath::shader_include_path());
    log::info!("Shader src path: {:?}", EnvPath::shader_src_path());
    log::info!("Shader output path: {:?}", EnvPath::shader_build_path());

    // 编译 shader 目录下的所有 shader 文件
    let failed_cnt = walkdir::WalkDir::new(EnvPath::shader_src_path())
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| ShaderCompileTask::new(entry.path(), EnvPath::shader_src_path(), EnvPath::shader_build_path()))
        .par_bridge() // 并行化编译
        .map(|task| {
            log::info!("Compiling shader: {:?}", task.shader_path);
            GlslCompiler::new().compile(&task).map_err(|e| log::error!("{:?}", e)).is_err()
        })
        .filter(|failed| *failed)
        .count();

    if failed_cnt > 0 {
        log::error!("{} shader(s) failed to compile.", failed_cnt);
        std::process::exit(1);
    }
    log::info!("Shader compilation completed.");
}
