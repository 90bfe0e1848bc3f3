//! 启动配置：工作区根目录下的 `mesh-viewer.toml`，文件不存在时全部使用默认值

use serde::Deserialize;
use truvis_crate_tools::{
    config::{env_flag, load_toml_config},
    truvis_path::TruvisPath,
};
use truvis_renderer::settings::RendererSettings;

pub const CONFIG_FILE_NAME: &str = "mesh-viewer.toml";
/// 覆盖配置文件中的 validation 选项
pub const VALIDATION_ENV: &str = "TRUVIS_VALIDATION";

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}
impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Mesh Viewer".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// 启动时各个开关的初始值
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ToggleConfig {
    pub vsync: bool,
    pub animate: bool,
    pub raytracing: bool,
    pub spp4: bool,
    pub show_texture_lod: bool,
    pub show_ui: bool,
}
impl Default for ToggleConfig {
    fn default() -> Self {
        let settings = RendererSettings::default();
        Self {
            vsync: settings.vsync,
            animate: settings.animate,
            raytracing: settings.raytracing,
            spp4: settings.spp4,
            show_texture_lod: settings.show_texture_lod,
            show_ui: settings.show_ui,
        }
    }
}

/// 资源路径相对于 `assets/` 目录
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AssetConfig {
    pub mesh: String,
    pub texture: String,
    /// 网格包围盒的最大边长
    pub mesh_scale: f32,
}
impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            mesh: "model/mesh.obj".to_string(),
            texture: "model/diffuse.jpg".to_string(),
            mesh_scale: 1.25,
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub toggles: ToggleConfig,
    pub assets: AssetConfig,
    pub validation: bool,
}
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            toggles: ToggleConfig::default(),
            assets: AssetConfig::default(),
            validation: cfg!(debug_assertions),
        }
    }
}

// new & init
impl AppConfig {
    /// 读取配置文件，再应用环境变量覆盖
    pub fn load() -> anyhow::Result<Self> {
        let config: Self = load_toml_config(TruvisPath::config_path(CONFIG_FILE_NAME))?;
        Ok(config.with_validation_override(env_flag(VALIDATION_ENV)))
    }

    fn with_validation_override(mut self, validation: Option<bool>) -> Self {
        if let Some(validation) = validation {
            log::info!("{} overrides validation: {}", VALIDATION_ENV, validation);
            self.validation = validation;
        }
        self
    }
}

// getters
impl AppConfig {
    pub fn initial_settings(&self) -> RendererSettings {
        let toggles = &self.toggles;
        RendererSettings {
            vsync: toggles.vsync,
            animate: toggles.animate,
            raytracing: toggles.raytracing,
            spp4: toggles.spp4,
            show_texture_lod: toggles.show_texture_lod,
            show_ui: toggles.show_ui,
        }
    }
}

#[cfg(test)]
mod tests {
    use truvis_crate_tools::config::parse_toml_config;

    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: AppConfig = parse_toml_config(
            r#"
            validation = false

            [window]
            width = 1280

            [toggles]
            raytracing = true
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "Mesh Viewer");
        assert!(config.toggles.raytracing);
        assert!(config.toggles.vsync);
        assert_eq!(config.assets, AssetConfig::default());
        assert!(!config.validation);
    }

    #[test]
    fn test_default_mesh_scale() {
        assert_eq!(AppConfig::default().assets.mesh_scale, 1.25);
    }

    #[test]
    fn test_validation_override() {
        let config = AppConfig {
            validation: false,
            ..Default::default()
        };
        assert!(config.clone().with_validation_override(Some(true)).validation);
        assert!(!config.with_validation_override(None).validation);
    }

    #[test]
    fn test_initial_settings_follow_toggles() {
        let mut config = AppConfig::default();
        config.toggles.spp4 = true;
        config.toggles.show_ui = false;
        let settings = config.initial_settings();
        assert!(settings.spp4);
        assert!(!settings.show_ui);
        assert_eq!(settings.vsync, RendererSettings::default().vsync);
    }

    #[test]
    fn test_wrong_type_is_an_error() {
        assert!(parse_toml_config::<AppConfig>("[window]\nwidth = \"wide\"").is_err());
    }
}
