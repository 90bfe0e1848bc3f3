//! 网格与纹理加载
//!
//! 文件缺失或者解析失败时不会终止程序，而是给出警告并使用程序生成的立方体 / 棋盘格纹理。

use std::path::Path;

use anyhow::Context;
use itertools::Itertools;
use truvis_gfx::resources::layout::MeshVertex;
use truvis_renderer::resources::static_resources::{MeshData, TextureData};

/// 加载 OBJ，所有 model 合并为一个网格，并归一化到 `scale` 大小
pub fn load_obj_mesh(path: &Path, scale: f32) -> anyhow::Result<MeshData> {
    let _span = tracy_client::span!("load_obj_mesh");
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ignore_lines: true,
            ignore_points: true,
            ..Default::default()
        },
    )
    .with_context(|| format!("load obj: {}", path.display()))?;

    let mut mesh = MeshData {
        vertices: vec![],
        indices: vec![],
    };
    for model in models {
        let m = model.mesh;
        let base = mesh.vertices.len() as u32;
        let vertex_cnt = m.positions.len() / 3;

        mesh.vertices.extend((0..vertex_cnt).map(|i| MeshVertex {
            position: [m.positions[3 * i], m.positions[3 * i + 1], m.positions[3 * i + 2]],
            normal: if m.normals.len() >= 3 * vertex_cnt {
                [m.normals[3 * i], m.normals[3 * i + 1], m.normals[3 * i + 2]]
            } else {
                [0.0, 1.0, 0.0]
            },
            // OBJ 的 v 轴朝上
            uv: if m.texcoords.len() >= 2 * vertex_cnt {
                [m.texcoords[2 * i], 1.0 - m.texcoords[2 * i + 1]]
            } else {
                [0.0, 0.0]
            },
        }));
        mesh.indices.extend(m.indices.iter().map(|idx| base + idx));
    }
    anyhow::ensure!(!mesh.indices.is_empty(), "obj file {} contains no triangles", path.display());

    normalize_mesh(&mut mesh.vertices, scale);
    log::info!("load mesh {}: {} vertices, {} triangles", path.display(), mesh.vertices.len(), mesh.indices.len() / 3);
    Ok(mesh)
}

/// 平移到包围盒中心，并缩放使得包围盒最大边长为 `scale`
pub fn normalize_mesh(vertices: &mut [MeshVertex], scale: f32) {
    let Some((min, max)) = vertices.iter().map(|v| glam::Vec3::from(v.position)).fold(None, |acc, p| match acc {
        None => Some((p, p)),
        Some((min, max)) => Some((min.min(p), max.max(p))),
    }) else {
        return;
    };

    let center = (min + max) * 0.5;
    let extent = (max - min).max_element();
    let factor = if extent > f32::EPSILON { scale / extent } else { 1.0 };
    for v in vertices {
        v.position = ((glam::Vec3::from(v.position) - center) * factor).into();
    }
}

/// 边长为 `scale` 的立方体，每个面 4 个顶点
pub fn cube_mesh(scale: f32) -> MeshData {
    // (法线, 切线 u, 切线 v)
    let faces = [
        (glam::Vec3::X, glam::Vec3::NEG_Z, glam::Vec3::Y),
        (glam::Vec3::NEG_X, glam::Vec3::Z, glam::Vec3::Y),
        (glam::Vec3::Y, glam::Vec3::X, glam::Vec3::NEG_Z),
        (glam::Vec3::NEG_Y, glam::Vec3::X, glam::Vec3::Z),
        (glam::Vec3::Z, glam::Vec3::X, glam::Vec3::Y),
        (glam::Vec3::NEG_Z, glam::Vec3::NEG_X, glam::Vec3::Y),
    ];
    let corners = [(-1.0, -1.0, [0.0, 1.0]), (1.0, -1.0, [1.0, 1.0]), (1.0, 1.0, [1.0, 0.0]), (-1.0, 1.0, [0.0, 0.0])];

    let half = scale * 0.5;
    let vertices = faces
        .iter()
        .flat_map(|&(n, u, v)| {
            corners.iter().map(move |&(cu, cv, uv)| MeshVertex {
                position: ((n + u * cu + v * cv) * half).into(),
                normal: n.into(),
                uv,
            })
        })
        .collect_vec();
    let indices = (0..faces.len() as u32).flat_map(|f| [0, 1, 2, 0, 2, 3].map(|i| f * 4 + i)).collect_vec();

    MeshData { vertices, indices }
}

pub fn load_mesh_or_cube(path: &Path, scale: f32) -> MeshData {
    load_obj_mesh(path, scale).unwrap_or_else(|e| {
        log::warn!("{:#}, use a cube instead", e);
        cube_mesh(scale)
    })
}

pub fn load_texture(path: &Path) -> anyhow::Result<TextureData> {
    let _span = tracy_client::span!("load_texture");
    let image = image::open(path).with_context(|| format!("load texture: {}", path.display()))?.into_rgba8();
    let (width, height) = image.dimensions();
    log::info!("load texture {}: {}x{}", path.display(), width, height);
    Ok(TextureData {
        width,
        height,
        rgba: image.into_raw(),
    })
}

/// `size` x `size` 的棋盘格，每个格子 `cell` 像素
pub fn checkerboard_texture(size: u32, cell: u32) -> TextureData {
    const LIGHT: [u8; 4] = [200, 200, 200, 255];
    const DARK: [u8; 4] = [60, 60, 60, 255];

    let cell = cell.max(1);
    let rgba = (0..size)
        .cartesian_product(0..size)
        .flat_map(|(y, x)| if (x / cell + y / cell) % 2 == 0 { LIGHT } else { DARK })
        .collect_vec();
    TextureData {
        width: size,
        height: size,
        rgba,
    }
}

pub fn load_texture_or_checkerboard(path: &Path) -> TextureData {
    load_texture(path).unwrap_or_else(|e| {
        log::warn!("{:#}, use a checkerboard instead", e);
        checkerboard_texture(256, 32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(vertices: &[MeshVertex]) -> (glam::Vec3, glam::Vec3) {
        let points = vertices.iter().map(|v| glam::Vec3::from(v.position)).collect_vec();
        let min = points.iter().fold(glam::Vec3::splat(f32::MAX), |a, p| a.min(*p));
        let max = points.iter().fold(glam::Vec3::splat(f32::MIN), |a, p| a.max(*p));
        (min, max)
    }

    fn vertex(position: [f32; 3]) -> MeshVertex {
        MeshVertex {
            position,
            normal: [0.0, 1.0, 0.0],
            uv: [0.0, 0.0],
        }
    }

    #[test]
    fn test_normalize_centers_and_scales() {
        let mut vertices = vec![vertex([10.0, 2.0, 4.0]), vertex([14.0, 3.0, 5.0]), vertex([12.0, 2.5, 4.5])];
        normalize_mesh(&mut vertices, 1.25);

        let (min, max) = bounds(&vertices);
        assert!(((min + max) * 0.5).length() < 1e-5);
        assert!(((max - min).max_element() - 1.25).abs() < 1e-5);
        // 比例保持不变
        assert!(((max - min).y - 1.25 / 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_normalize_degenerate_mesh() {
        let mut vertices = vec![vertex([3.0, 3.0, 3.0])];
        normalize_mesh(&mut vertices, 1.25);
        assert_eq!(vertices[0].position, [0.0, 0.0, 0.0]);

        normalize_mesh(&mut [], 1.25);
    }

    #[test]
    fn test_cube_mesh() {
        let cube = cube_mesh(2.0);
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube.indices.iter().all(|&i| (i as usize) < cube.vertices.len()));

        let (min, max) = bounds(&cube.vertices);
        assert_eq!(min, glam::Vec3::splat(-1.0));
        assert_eq!(max, glam::Vec3::splat(1.0));

        // 每个顶点都在自己法线所指的面上
        for v in &cube.vertices {
            let p = glam::Vec3::from(v.position);
            let n = glam::Vec3::from(v.normal);
            assert!((p.dot(n) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_checkerboard() {
        let texture = checkerboard_texture(4, 2);
        assert_eq!(texture.rgba.len(), 4 * 4 * 4);
        let pixel = |x: usize, y: usize| &texture.rgba[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(pixel(0, 0), pixel(1, 1));
        assert_ne!(pixel(0, 0), pixel(2, 0));
        assert_eq!(pixel(2, 2), pixel(0, 0));
    }

    #[test]
    fn test_missing_files_fall_back() {
        let mesh = load_mesh_or_cube(Path::new("/definitely/not/here.obj"), 1.25);
        assert_eq!(mesh.indices.len(), 36);
        let texture = load_texture_or_checkerboard(Path::new("/definitely/not/here.png"));
        assert_eq!((texture.width, texture.height), (256, 256));
    }

    #[test]
    fn test_obj_without_faces_falls_back_to_cube() {
        let path = std::env::temp_dir().join(format!("mesh-viewer-no-faces-{}.obj", std::process::id()));
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\n").unwrap();

        assert!(load_obj_mesh(&path, 1.25).is_err());
        let mesh = load_mesh_or_cube(&path, 1.25);
        assert_eq!(mesh.indices.len(), 36);

        std::fs::remove_file(&path).unwrap();
    }
}
