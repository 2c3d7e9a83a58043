use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat3, Vec3};
use log::{debug, warn};
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::{Frame, OutputEncoding, RenderSurface, RendererSettings, SurfaceConfig};
use crate::scene::{DirectionalLight, HemisphereLight, MeshData, Scene, VERTEX_STRIDE};

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.03,
    g: 0.03,
    b: 0.05,
    a: 1.0,
};

/// Window surface drawn with wgpu.
pub struct WgpuSurface {
    _window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    max_samples: u32,
    sample_count: u32,
    depth: RenderTarget,
    msaa: Option<RenderTarget>,
    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    pipeline: wgpu::RenderPipeline,
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    object_layout: wgpu::BindGroupLayout,
    meshes: Vec<MeshBuffers>,
}

impl WgpuSurface {
    /// Creates the device and swapchain for `window`.
    pub async fn new(window: Arc<Window>, settings: &RendererSettings) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }
        if settings.xr_enabled {
            warn!("immersive sessions need the browser build; drawing to the window only");
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("failed to acquire GPU adapter"))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("surface-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to create GPU device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = pick_format(&caps.formats, settings.output_encoding)
            .ok_or_else(|| anyhow!("surface reports no texture formats"))?;
        let max_samples = if adapter
            .get_texture_format_features(format)
            .flags
            .sample_count_supported(4)
        {
            4
        } else {
            1
        };
        debug!("surface format {format:?}, up to {max_samples}x MSAA");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let sample_count = if settings.antialias { max_samples } else { 1 };
        let depth = RenderTarget::depth(&device, config.width, config.height, sample_count);
        let msaa = (sample_count > 1)
            .then(|| RenderTarget::color(&device, &config, sample_count));

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("scene-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let global_layout = uniform_layout::<GlobalUniform>(&device, "global-bind-layout");
        let object_layout = uniform_layout::<ObjectConstants>(&device, "object-bind-layout");

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene-pipeline-layout"),
            bind_group_layouts: &[&global_layout, &object_layout],
            push_constant_ranges: &[],
        });

        let global_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global-bind-group"),
            layout: &global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });

        let pipeline = build_pipeline(&device, &pipeline_layout, &shader, format, sample_count);

        Ok(Self {
            _window: window,
            surface,
            device,
            queue,
            config,
            max_samples,
            sample_count,
            depth,
            msaa,
            shader,
            pipeline_layout,
            pipeline,
            global_buffer,
            global_bind_group,
            object_layout,
            meshes: Vec::new(),
        })
    }

    fn sync_meshes(&mut self, scene: &Scene) {
        let draw_list = scene.draw_list();
        if draw_list.len() == self.meshes.len() {
            return;
        }
        debug!("uploading {} mesh(es)", draw_list.len());
        self.meshes = draw_list
            .iter()
            .enumerate()
            .map(|(index, item)| MeshBuffers::from_mesh(&self.device, item.mesh, index))
            .collect();
    }
}

impl RenderSurface for WgpuSurface {
    fn label(&self) -> &str {
        "wgpu"
    }

    fn configure(&mut self, config: &SurfaceConfig) {
        let sample_count = config.sample_count.clamp(1, self.max_samples);
        if sample_count != self.sample_count {
            self.sample_count = sample_count;
            self.pipeline = build_pipeline(
                &self.device,
                &self.pipeline_layout,
                &self.shader,
                self.config.format,
                sample_count,
            );
        }
        self.config.width = config.width;
        self.config.height = config.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = RenderTarget::depth(&self.device, config.width, config.height, sample_count);
        self.msaa = (sample_count > 1)
            .then(|| RenderTarget::color(&self.device, &self.config, sample_count));
    }

    fn render(&mut self, frame: &Frame<'_>) -> Result<()> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(err) => return Err(anyhow!("failed to acquire frame: {err}")),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.queue.write_buffer(
            &self.global_buffer,
            0,
            bytes_of(&GlobalUniform::from_frame(frame)),
        );
        self.sync_meshes(frame.scene);

        let bind_groups: Vec<wgpu::BindGroup> = frame
            .scene
            .draw_list()
            .iter()
            .map(|item| {
                let constants = ObjectConstants {
                    model: item.model.to_cols_array_2d(),
                    normal: mat3_to_3x4(item.normal),
                    color: item.mesh.color.extend(1.0).into(),
                };
                let buffer = self
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("object-uniform"),
                        contents: bytes_of(&constants),
                        usage: wgpu::BufferUsages::UNIFORM,
                    });
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("object-bind-group"),
                    layout: &self.object_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                })
            })
            .collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene-encoder"),
            });
        let (target, resolve_target) = match &self.msaa {
            Some(msaa) => (&msaa.view, Some(&view)),
            None => (&view, None),
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("scene-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.global_bind_group, &[]);
        for (mesh, bind_group) in self.meshes.iter().zip(bind_groups.iter()) {
            pass.set_vertex_buffer(0, mesh.vertex.slice(..));
            pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.set_bind_group(1, bind_group, &[]);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }

        drop(pass);
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

/// First format matching the requested encoding, else whatever comes first.
fn pick_format(
    formats: &[wgpu::TextureFormat],
    encoding: OutputEncoding,
) -> Option<wgpu::TextureFormat> {
    let wants_srgb = encoding == OutputEncoding::Srgb;
    formats
        .iter()
        .copied()
        .find(|format| format.is_srgb() == wants_srgb)
        .or_else(|| formats.first().copied())
}

fn uniform_layout<T>(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<T>() as u64),
            },
            count: None,
        }],
    })
}

fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    sample_count: u32,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("scene-pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: "vs_main",
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: (VERTEX_STRIDE * std::mem::size_of::<f32>()) as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3],
            }],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: RenderTarget::DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: sample_count,
            ..Default::default()
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: "fs_main",
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
    })
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &MeshData, index: usize) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("mesh-{index}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("mesh-{index}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index: index_buffer,
            index_count: mesh.indices.len() as u32,
        }
    }
}

struct RenderTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl RenderTarget {
    const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn depth(device: &wgpu::Device, width: u32, height: u32, sample_count: u32) -> Self {
        Self::create(
            device,
            "depth-target",
            width,
            height,
            Self::DEPTH_FORMAT,
            sample_count,
        )
    }

    fn color(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        sample_count: u32,
    ) -> Self {
        Self::create(
            device,
            "msaa-target",
            config.width,
            config.height,
            config.format,
            sample_count,
        )
    }

    fn create(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct GlobalUniform {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    sky_color: [f32; 4],
    ground_color: [f32; 4],
    light_direction: [f32; 4],
    light_color: [f32; 4],
    environment: [f32; 4],
}

impl GlobalUniform {
    /// Packs camera and lights; missing lights contribute nothing.
    fn from_frame(frame: &Frame<'_>) -> Self {
        let hemisphere = frame.scene.hemisphere_light().copied().unwrap_or(HemisphereLight {
            sky_color: Vec3::ZERO,
            ground_color: Vec3::ZERO,
            intensity: 0.0,
        });
        let sun = frame
            .scene
            .directional_light()
            .copied()
            .unwrap_or(DirectionalLight {
                color: Vec3::ZERO,
                intensity: 0.0,
                position: Vec3::Y,
            });
        // w flags whether an environment map is present.
        let environment = match frame.scene.environment.as_deref() {
            Some(environment) => environment.irradiance().extend(1.0),
            None => Vec3::ZERO.extend(0.0),
        };
        Self {
            view_proj: frame.camera.view_projection().to_cols_array_2d(),
            camera_position: frame.camera.position.extend(1.0).into(),
            sky_color: hemisphere.sky_color.extend(hemisphere.intensity).into(),
            ground_color: hemisphere.ground_color.extend(0.0).into(),
            light_direction: sun.direction().extend(0.0).into(),
            light_color: sun.color.extend(sun.intensity).into(),
            environment: environment.into(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ObjectConstants {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
    color: [f32; 4],
}

const SHADER: &str = r#"
struct GlobalUniform {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    sky_color: vec4<f32>,
    ground_color: vec4<f32>,
    light_direction: vec4<f32>,
    light_color: vec4<f32>,
    environment: vec4<f32>,
}

struct ObjectConstants {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: GlobalUniform;

@group(1) @binding(0)
var<uniform> object: ObjectConstants;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;

    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;

    out.normal = normalize(world_normal);
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let normal = normalize(input.normal);

    let sky_weight = 0.5 * normal.y + 0.5;
    let hemisphere = mix(globals.ground_color.rgb, globals.sky_color.rgb, sky_weight)
        * globals.sky_color.w;

    let light_dir = normalize(-globals.light_direction.xyz);
    let diffuse = max(dot(normal, light_dir), 0.0) * globals.light_color.w;
    let sun = globals.light_color.rgb * diffuse;

    let ambient = globals.environment.rgb * globals.environment.w;
    let lit_color = (hemisphere + sun + ambient) * object.color.rgb;
    return vec4<f32>(lit_color, object.color.a);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::environment::EquirectTexture;
    use crate::environment::PmremGenerator;
    use crate::scene::Light;

    #[test]
    fn picks_format_matching_encoding() {
        let formats = [
            wgpu::TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Bgra8UnormSrgb,
        ];
        assert_eq!(
            pick_format(&formats, OutputEncoding::Srgb),
            Some(wgpu::TextureFormat::Bgra8UnormSrgb)
        );
        assert_eq!(
            pick_format(&formats, OutputEncoding::Linear),
            Some(wgpu::TextureFormat::Bgra8Unorm)
        );
        assert_eq!(
            pick_format(&formats[..1], OutputEncoding::Srgb),
            Some(wgpu::TextureFormat::Bgra8Unorm)
        );
        assert_eq!(pick_format(&[], OutputEncoding::Srgb), None);
    }

    #[test]
    fn normal_matrix_is_padded_per_column() {
        let packed = mat3_to_3x4(Mat3::from_diagonal(Vec3::new(2.0, 3.0, 4.0)));
        assert_eq!(packed[0], [2.0, 0.0, 0.0, 0.0]);
        assert_eq!(packed[1], [0.0, 3.0, 0.0, 0.0]);
        assert_eq!(packed[2], [0.0, 0.0, 4.0, 0.0]);
    }

    #[test]
    fn globals_carry_lights_and_environment() {
        let mut scene = Scene::new();
        scene.add_light(Light::Hemisphere(HemisphereLight::new(0x606060, 0x404040)));
        scene.add_light(Light::Directional(
            DirectionalLight::new(0xffffff).with_position(Vec3::ONE.normalize()),
        ));
        let camera = PerspectiveCamera::new(70.0, 1.5, 0.1, 5000.0);

        let bare = GlobalUniform::from_frame(&Frame {
            scene: &scene,
            camera: &camera,
        });
        assert_eq!(bare.sky_color[3], 1.0);
        assert_eq!(bare.light_color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(bare.environment, [0.0; 4]);

        let texture = EquirectTexture::from_fn(4, 2, |_, _| Vec3::splat(0.5));
        scene.environment = Some(Arc::new(
            PmremGenerator::default().from_equirectangular(&texture),
        ));
        let lit = GlobalUniform::from_frame(&Frame {
            scene: &scene,
            camera: &camera,
        });
        assert_eq!(lit.environment[3], 1.0);
        assert!((lit.environment[0] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn unlit_scene_packs_zero_lights() {
        let scene = Scene::new();
        let camera = PerspectiveCamera::new(70.0, 1.0, 0.1, 10.0);
        let globals = GlobalUniform::from_frame(&Frame {
            scene: &scene,
            camera: &camera,
        });
        assert_eq!(globals.sky_color[3], 0.0);
        assert_eq!(globals.light_color[3], 0.0);
    }
}
