//! 着色器编译的共享类型和工具

use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use truvis_crate_tools::truvis_path::TruvisPath;

/// Shader 的执行阶段，对应 glslc 的 `-fshader-stage`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,

    // Ray Tracing 阶段
    RayGen,
    ClosestHit,
    Miss,
}
impl ShaderStage {
    /// 根据文件名解析 shader stage，不支持的扩展名返回 None
    pub fn from_file_name(shader_name: &str) -> Option<Self> {
        let ext = Path::new(shader_name).extension()?.to_str()?;
        let stage = match ext {
            "vert" => Self::Vertex,
            "frag" => Self::Fragment,
            "comp" => Self::Compute,
            "rgen" => Self::RayGen,
            "rchit" => Self::ClosestHit,
            "rmiss" => Self::Miss,
            _ => return None,
        };
        Some(stage)
    }

    pub fn glslc_name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
            Self::RayGen => "rgen",
            Self::ClosestHit => "rchit",
            Self::Miss => "rmiss",
        }
    }
}

/// 当前项目的环境路径，基于 workspace 根目录
pub struct EnvPath;

impl EnvPath {
    /// Shader 源码路径
    pub fn shader_src_path() -> &'static Path {
        static PATH: OnceLock<PathBuf> = OnceLock::new();
        PATH.get_or_init(TruvisPath::shader_src_path)
    }

    /// 编译 shader 的输出路径
    pub fn shader_build_path() -> &'static Path {
        static PATH: OnceLock<PathBuf> = OnceLock::new();
        PATH.get_or_init(TruvisPath::shader_build_root_path)
    }

    /// Shader 的 include 目录
    pub fn shader_include_path() -> &'static Path {
        static PATH: OnceLock<PathBuf> = OnceLock::new();
        PATH.get_or_init(|| TruvisPath::shader_root_path().join("include"))
    }
}

/// 一个具体的编译任务
#[derive(Debug)]
pub struct ShaderCompileTask {
    pub shader_path: PathBuf,
    /// `<build>/<relative>/<name>.<ext>.spv`
    pub output_path: PathBuf,
    pub shader_stage: ShaderStage,
}

impl ShaderCompileTask {
    /// 不在 `src_root` 之下或者扩展名不被支持时返回 None
    pub fn new(shader_path: &Path, src_root: &Path, build_root: &Path) -> Option<Self> {
        let relative_path = shader_path.strip_prefix(src_root).ok()?;
        let shader_name = shader_path.file_name()?.to_str()?;
        let shader_stage = ShaderStage::from_file_name(shader_name)?;

        let mut output_path = build_root.join(relative_path);
        output_path.set_file_name(format!("{}.spv", shader_name));

        Some(Self {
            shader_path: shader_path.to_path_buf(),
            output_path,
            shader_stage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stage() {
        assert_eq!(ShaderStage::from_file_name("mesh.vert"), Some(ShaderStage::Vertex));
        assert_eq!(ShaderStage::from_file_name("copy.comp"), Some(ShaderStage::Compute));
        assert_eq!(ShaderStage::from_file_name("mesh.rchit"), Some(ShaderStage::ClosestHit));
        assert_eq!(ShaderStage::from_file_name("common.glsl"), None);
        assert_eq!(ShaderStage::from_file_name("README"), None);
    }

    #[test]
    fn test_task_output_path() {
        let task = ShaderCompileTask::new(
            Path::new("/ws/engine/shader/src/rt/mesh.rgen"),
            Path::new("/ws/engine/shader/src"),
            Path::new("/ws/engine/shader/.build"),
        )
        .unwrap();
        assert_eq!(task.output_path, Path::new("/ws/engine/shader/.build/rt/mesh.rgen.spv"));
        assert_eq!(task.shader_stage, ShaderStage::RayGen);
    }

    #[test]
    fn test_task_outside_src_is_skipped() {
        assert!(
            ShaderCompileTask::new(
                Path::new("/elsewhere/mesh.vert"),
                Path::new("/ws/engine/shader/src"),
                Path::new("/ws/engine/shader/.build"),
            )
            .is_none()
        );
    }
}
