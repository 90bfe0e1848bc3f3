//! 场景状态：模型绕 Y 轴旋转，相机始终看向原点

use std::time::Duration;

use ash::vk;
use truvis_renderer::resources::static_resources::SceneUniforms;

/// 每秒绕 Y 轴旋转的角度
const ROTATION_DEG_PER_SECOND: f32 = 20.0;
/// 每次按键相机沿 z 轴移动的距离
pub const CAMERA_STEP: f32 = 0.2;

const FOV_Y_DEG: f32 = 45.0;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 50.0;

pub struct SceneAnimation {
    /// 只在 animate 打开时前进
    sim_time: f64,
    camera_pos: glam::Vec3,
}

impl Default for SceneAnimation {
    fn default() -> Self {
        Self {
            sim_time: 0.0,
            camera_pos: glam::vec3(0.0, 0.5, 3.0),
        }
    }
}

// getters
impl SceneAnimation {
    #[inline]
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    #[inline]
    pub fn camera_pos(&self) -> glam::Vec3 {
        self.camera_pos
    }

    pub fn model_matrix(&self) -> glam::Mat4 {
        glam::Mat4::from_rotation_y(self.sim_time as f32 * ROTATION_DEG_PER_SECOND.to_radians())
    }

    pub fn view_matrix(&self) -> glam::Mat4 {
        glam::Mat4::look_at_rh(self.camera_pos, glam::Vec3::ZERO, glam::Vec3::Y)
    }

    /// 3x4 row-major 的 camera to world 矩阵
    ///
    /// 旋转部分是 view 矩阵旋转部分的转置，平移部分是相机位置
    pub fn camera_to_world(&self) -> [glam::Vec4; 3] {
        let view = self.view_matrix();
        let (r0, r1, r2) = (view.row(0), view.row(1), view.row(2));
        std::array::from_fn(|i| glam::vec4(r0[i], r1[i], r2[i], self.camera_pos[i]))
    }

    /// extent 为 0 时按 1x1 处理
    pub fn uniforms(&self, extent: vk::Extent2D) -> SceneUniforms {
        let aspect = extent.width.max(1) as f32 / extent.height.max(1) as f32;
        let fov_y = FOV_Y_DEG.to_radians();
        let projection = glam::Mat4::perspective_rh(fov_y, aspect, Z_NEAR, Z_FAR);
        let model = self.model_matrix();
        let tan_half = (fov_y * 0.5).tan();

        SceneUniforms {
            model_view_proj: projection * self.view_matrix() * model,
            model,
            camera_to_world: self.camera_to_world(),
            projection_params: glam::vec4(tan_half * aspect, tan_half, Z_NEAR, Z_FAR),
        }
    }
}

// update
impl SceneAnimation {
    pub fn advance(&mut self, delta: Duration, animate: bool) {
        if animate {
            self.sim_time += delta.as_secs_f64();
        }
    }

    /// 正数远离原点
    pub fn move_camera_z(&mut self, delta: f32) {
        self.camera_pos.z += delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_only_when_animating() {
        let mut scene = SceneAnimation::default();
        scene.advance(Duration::from_millis(500), true);
        scene.advance(Duration::from_secs(10), false);
        assert!((scene.sim_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_model_rotation_rate() {
        let mut scene = SceneAnimation::default();
        scene.advance(Duration::from_secs_f64(4.5), true);
        // 4.5s * 20° = 90°：+X 转到 -Z
        let x = scene.model_matrix().transform_vector3(glam::Vec3::X);
        assert!((x - glam::Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_camera_to_world_is_view_inverse() {
        let mut scene = SceneAnimation::default();
        scene.move_camera_z(-CAMERA_STEP);
        let inverse = scene.view_matrix().inverse();
        let rows = scene.camera_to_world();
        for (i, row) in rows.iter().enumerate() {
            assert!((*row - inverse.row(i)).length() < 1e-5, "row {}: {:?} vs {:?}", i, row, inverse.row(i));
        }
        assert_eq!(rows[2].w, scene.camera_pos().z);
    }

    #[test]
    fn test_projection_params() {
        let uniforms = SceneAnimation::default().uniforms(vk::Extent2D {
            width: 800,
            height: 400,
        });
        let tan_half = (22.5f32).to_radians().tan();
        assert!((uniforms.projection_params.y - tan_half).abs() < 1e-6);
        assert!((uniforms.projection_params.x - 2.0 * tan_half).abs() < 1e-6);
    }

    #[test]
    fn test_origin_projects_to_screen_center() {
        let uniforms = SceneAnimation::default().uniforms(vk::Extent2D {
            width: 800,
            height: 600,
        });
        let clip = uniforms.model_view_proj * glam::Vec4::W;
        assert!((clip.x / clip.w).abs() < 1e-5);
        assert!((clip.y / clip.w).abs() < 1e-5);
        assert!(clip.z / clip.w > 0.0 && clip.z / clip.w < 1.0);
    }

    #[test]
    fn test_zero_extent_does_not_produce_nan() {
        let uniforms = SceneAnimation::default().uniforms(vk::Extent2D::default());
        assert!(uniforms.model_view_proj.is_finite());
    }
}
