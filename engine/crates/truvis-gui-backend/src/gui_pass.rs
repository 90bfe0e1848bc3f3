use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
use truvis_crate_tools::truvis_path::TruvisPath;
use truvis_gfx::{
    basic::color::LabelColor,
    commands::command_buffer::GfxCommandBuffer,
    descriptors::{
        descriptor::{GfxDescriptorBinding, GfxDescriptorSet, GfxDescriptorSetLayout},
        descriptor_pool::{GfxDescriptorPool, GfxDescriptorPoolCreateInfo},
        sampler::{GfxSampler, GfxSamplerCreateInfo},
        write_descriptor_set::GfxDescriptorCursor,
    },
    gfx::Gfx,
    pipelines::{
        graphics_pipeline::{GfxBlendMode, GfxGraphicsPipeline, GfxGraphicsPipelineCreateInfo},
        pipeline_layout::GfxPipelineLayout,
    },
    resources::{
        image::GfxImage,
        image_view::{GfxImageView, GfxImageViewDesc},
        layout::GfxVertexLayout,
    },
};

use crate::{gui_mesh::GuiMesh, gui_vertex_layout::ImGuiVertexLayoutAoS};

const FONT_TEXTURE_ID: usize = 0;

const BINDING_FONT: GfxDescriptorBinding =
    GfxDescriptorBinding::new(0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT);

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct PushConstant {
    ortho: glam::Mat4,
}

/// 将 imgui 的 clip rect 转换为 framebuffer 上的 scissor，完全在画布外时返回 None
pub fn clip_rect_to_scissor(
    clip_rect: [f32; 4],
    clip_offset: [f32; 2],
    clip_scale: [f32; 2],
    extent: vk::Extent2D,
) -> Option<vk::Rect2D> {
    let min_x = ((clip_rect[0] - clip_offset[0]) * clip_scale[0]).max(0.0);
    let min_y = ((clip_rect[1] - clip_offset[1]) * clip_scale[1]).max(0.0);
    let max_x = ((clip_rect[2] - clip_offset[0]) * clip_scale[0]).min(extent.width as f32);
    let max_y = ((clip_rect[3] - clip_offset[1]) * clip_scale[1]).min(extent.height as f32);
    if max_x <= min_x || max_y <= min_y {
        return None;
    }

    Some(vk::Rect2D {
        offset: vk::Offset2D {
            x: min_x as i32,
            y: min_y as i32,
        },
        extent: vk::Extent2D {
            width: (max_x - min_x) as u32,
            height: (max_y - min_y) as u32,
        },
    })
}

/// 在画布上叠加 imgui 的绘制结果，使用 LOAD 保留画布原有内容
pub struct GuiPass {
    pipeline: GfxGraphicsPipeline,
    pipeline_layout: Rc<GfxPipelineLayout>,

    font_image: GfxImage,
    font_view: GfxImageView,
    font_sampler: GfxSampler,
    descriptor_set_layout: GfxDescriptorSetLayout,
    descriptor_pool: GfxDescriptorPool,
    font_set: GfxDescriptorSet,

    /// 每个 frame slot 一份
    meshes: Vec<GuiMesh>,
}

// new & init
impl GuiPass {
    pub fn new(imgui: &mut imgui::Context, color_format: vk::Format, frames_in_flight: usize) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("GuiPass::new");

        let fonts = imgui.fonts();
        let font_atlas = fonts.build_rgba32_texture();
        let font_image =
            GfxImage::from_rgba8_mipmapped(font_atlas.width, font_atlas.height, font_atlas.data, "imgui-fonts")?;
        fonts.tex_id = imgui::TextureId::new(FONT_TEXTURE_ID);

        // 字体只使用第 0 层 mip
        let font_view = GfxImageView::new(
            font_image.handle(),
            GfxImageViewDesc::new_2d(font_image.format(), vk::ImageAspectFlags::COLOR),
            "imgui-fonts",
        )?;
        let font_sampler = GfxSampler::new(
            &GfxSamplerCreateInfo::new().max_lod(0.0).address_mode(vk::SamplerAddressMode::CLAMP_TO_EDGE),
            "imgui-fonts",
        )?;

        let descriptor_set_layout = GfxDescriptorSetLayout::new(&[BINDING_FONT], "imgui")?;
        let descriptor_pool = GfxDescriptorPool::new(
            &GfxDescriptorPoolCreateInfo::new(
                vk::DescriptorPoolCreateFlags::empty(),
                1,
                vec![vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    descriptor_count: 1,
                }],
            ),
            "imgui",
        )?;
        let font_set = GfxDescriptorSet::new(&descriptor_pool, &descriptor_set_layout, "imgui-fonts")?;
        Gfx::get().gfx_device().write_descriptor_sets(&[BINDING_FONT.write_image(
            font_set.handle(),
            vec![
                vk::DescriptorImageInfo::default()
                    .image_view(font_view.handle())
                    .sampler(font_sampler.handle())
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            ],
        )]);

        let pipeline_layout = Rc::new(GfxPipelineLayout::new(
            &[descriptor_set_layout.handle()],
            &[vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::VERTEX,
                offset: 0,
                size: size_of::<PushConstant>() as u32,
            }],
            "uipass",
        )?);

        let create_info = GfxGraphicsPipelineCreateInfo::new(
            TruvisPath::shader_build_path_str("imgui/imgui.vert"),
            TruvisPath::shader_build_path_str("imgui/imgui.frag"),
            color_format,
        )
        .vertex_layout(ImGuiVertexLayoutAoS::vertex_input_bindings(), ImGuiVertexLayoutAoS::vertex_input_attributes())
        .cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE)
        .blend_mode(GfxBlendMode::Alpha);

        let pipeline = GfxGraphicsPipeline::new(&create_info, pipeline_layout.clone(), "uipass")?;

        let meshes = (0..frames_in_flight).map(|idx| GuiMesh::new(&format!("frame-{idx}"))).collect_vec();

        Ok(Self {
            pipeline,
            pipeline_layout,
            font_image,
            font_view,
            font_sampler,
            descriptor_set_layout,
            descriptor_pool,
            font_set,
            meshes,
        })
    }
}

// draw
impl GuiPass {
    /// 上传本帧的 mesh 数据；需要在该 slot 上一次提交的命令执行完毕之后调用
    pub fn prepare(&mut self, frame_index: usize, draw_data: &imgui::DrawData) -> anyhow::Result<()> {
        let mesh = &mut self.meshes[frame_index];
        mesh.grow_if_needed(draw_data)?;
        mesh.fill(draw_data)
    }

    /// 画布需要处于 COLOR_ATTACHMENT_OPTIMAL
    pub fn draw(
        &self,
        cmd: &GfxCommandBuffer,
        frame_index: usize,
        canvas_color_view: vk::ImageView,
        canvas_extent: vk::Extent2D,
        draw_data: &imgui::DrawData,
    ) {
        let mesh = &self.meshes[frame_index];
        let (Some(vertex_buffer), Some(index_buffer)) = (&mesh.vertex_buffer, &mesh.index_buffer) else {
            return;
        };
        if draw_data.total_idx_count == 0 {
            return;
        }

        cmd.begin_label("uipass", LabelColor::COLOR_PASS);

        let color_attach_info = vk::RenderingAttachmentInfo::default()
            .image_view(canvas_color_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE);

        let render_info = vk::RenderingInfo::default()
            .layer_count(1)
            .render_area(canvas_extent.into())
            .color_attachments(std::slice::from_ref(&color_attach_info));

        let viewport = vk::Viewport {
            width: canvas_extent.width as f32,
            height: canvas_extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
            ..Default::default()
        };

        cmd.begin_rendering(&render_info);
        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
        cmd.set_viewport(viewport);

        let push_constant = PushConstant {
            ortho: glam::Mat4::orthographic_rh(
                draw_data.display_pos[0],
                draw_data.display_pos[0] + draw_data.display_size[0],
                draw_data.display_pos[1],
                draw_data.display_pos[1] + draw_data.display_size[1],
                -1.0,
                1.0,
            ),
        };
        cmd.push_constants(self.pipeline_layout.handle(), vk::ShaderStageFlags::VERTEX, 0, &push_constant);
        cmd.bind_descriptor_set(
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline_layout.handle(),
            self.font_set.handle(),
            &[],
        );

        cmd.bind_index_buffer::<imgui::DrawIdx>(index_buffer);
        cmd.bind_vertex_buffer(vertex_buffer);

        let mut index_offset = 0;
        let mut vertex_offset = 0;
        let clip_offset = draw_data.display_pos;
        let clip_scale = draw_data.framebuffer_scale;

        // 对于每个 command，设置正确的 scissor 和 offset 即可
        for draw_list in draw_data.draw_lists() {
            for command in draw_list.commands() {
                match command {
                    imgui::DrawCmd::Elements {
                        count,
                        cmd_params:
                            imgui::DrawCmdParams {
                                clip_rect,
                                texture_id,
                                vtx_offset,
                                idx_offset,
                            },
                    } => {
                        if texture_id.id() != FONT_TEXTURE_ID {
                            log::warn!("imgui texture {:?} is not registered", texture_id);
                            continue;
                        }
                        let Some(scissor) = clip_rect_to_scissor(clip_rect, clip_offset, clip_scale, canvas_extent)
                        else {
                            continue;
                        };
                        cmd.set_scissor(scissor);

                        cmd.draw_indexed(
                            count as u32,
                            index_offset + idx_offset as u32,
                            vertex_offset + vtx_offset as i32,
                        );
                    }
                    imgui::DrawCmd::ResetRenderState => {
                        log::warn!("imgui reset render state");
                    }
                    imgui::DrawCmd::RawCallback { .. } => {
                        log::warn!("imgui raw callback");
                    }
                }
            }

            index_offset += draw_list.idx_buffer().len() as u32;
            vertex_offset += draw_list.vtx_buffer().len() as i32;
        }
        cmd.end_rendering();
        cmd.end_label();
    }
}

// destroy
impl GuiPass {
    pub fn destroy(self) {
        let Self {
            pipeline,
            pipeline_layout,
            font_image,
            font_view,
            font_sampler,
            descriptor_set_layout,
            descriptor_pool,
            meshes,
            ..
        } = self;

        pipeline.destroy();
        drop(pipeline_layout);
        meshes.into_iter().for_each(GuiMesh::destroy);
        descriptor_pool.destroy();
        descriptor_set_layout.destroy();
        font_sampler.destroy();
        font_view.destroy();
        font_image.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    #[test]
    fn test_scissor_inside_canvas() {
        let scissor = clip_rect_to_scissor([10.0, 20.0, 110.0, 70.0], [0.0, 0.0], [1.0, 1.0], EXTENT).unwrap();
        assert_eq!(scissor.offset, vk::Offset2D { x: 10, y: 20 });
        assert_eq!(
            scissor.extent,
            vk::Extent2D {
                width: 100,
                height: 50
            }
        );
    }

    #[test]
    fn test_scissor_clamped_and_scaled() {
        let scissor = clip_rect_to_scissor([-10.0, 0.0, 500.0, 400.0], [0.0, 0.0], [2.0, 2.0], EXTENT).unwrap();
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(scissor.extent, EXTENT);
    }

    #[test]
    fn test_scissor_outside_canvas() {
        assert!(clip_rect_to_scissor([900.0, 0.0, 1000.0, 10.0], [0.0, 0.0], [1.0, 1.0], EXTENT).is_none());
    }
}
