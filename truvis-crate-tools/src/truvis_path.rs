use std::path::{Path, PathBuf};

/// 统一资源路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
/// 避免使用硬编码相对路径，确保在不同构建环境下路径一致。
///
/// # 使用示例
/// ```ignore
/// let model = TruvisPath::assets_path("bunny.obj");          // assets/bunny.obj
/// let shader = TruvisPath::shader_build_path_str("rt/raygen.rgen"); // engine/shader/.build/rt/raygen.rgen.spv
/// ```
pub struct TruvisPath {}
// 核心路径
impl TruvisPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        // 本 crate 位于工作区根目录之下
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.parent().unwrap_or(manifest_dir).to_path_buf()
    }
}
// 根目录下
impl TruvisPath {
    pub fn engine_path() -> PathBuf {
        Self::workspace_path().join("engine")
    }

    /// 获取 `assets/` 目录下的文件路径
    pub fn assets_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("assets").join(filename)
    }

    /// 工作区根目录下的配置文件
    pub fn config_path(filename: &str) -> PathBuf {
        Self::workspace_path().join(filename)
    }
}
// engine 目录下
impl TruvisPath {
    pub fn shader_root_path() -> PathBuf {
        Self::engine_path().join("shader")
    }

    pub fn shader_src_path() -> PathBuf {
        Self::shader_root_path().join("src")
    }

    pub fn shader_build_root_path() -> PathBuf {
        Self::shader_root_path().join(".build")
    }

    /// 获取 `shader/.build/` 目录下的着色器路径（编译后的 SPIR-V）
    pub fn shader_build_path_str(filename: &str) -> String {
        let shader_path = Self::shader_build_root_path().join(filename);
        format!("{}.spv", shader_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_build_path_appends_spv() {
        let path = TruvisPath::shader_build_path_str("present/copy.comp");
        assert!(path.ends_with("copy.comp.spv"));
        assert!(Path::new(&path).starts_with(TruvisPath::shader_build_root_path()));
    }

    #[test]
    fn test_workspace_contains_engine() {
        assert!(TruvisPath::engine_path().starts_with(TruvisPath::workspace_path()));
    }
}
