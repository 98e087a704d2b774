use std::sync::Arc;

use wgpu::*;
use winit::window::Window;

use crate::renderer::{GraphicsBackend, GraphicsSession, RenderError, SessionDescriptor};
use crate::texture::RgbaImage;
use crate::uniforms::RainUniforms;

/// wgpu backend bound to one window. Each session gets its own surface and device.
pub struct WgpuBackend {
    instance: Instance,
    window: Arc<Window>,
}

impl WgpuBackend {
    pub fn new(window: Arc<Window>) -> Self {
        let instance = Instance::new(InstanceDescriptor {
            backends: Backends::all(),
            flags: InstanceFlags::empty(),
            dx12_shader_compiler: Dx12Compiler::Fxc,
            gles_minor_version: Gles3MinorVersion::Automatic,
        });
        Self { instance, window }
    }
}

struct BoundTexture {
    texture: Texture,
    view: TextureView,
    width: u32,
    height: u32,
}

pub struct WgpuSession {
    surface: Surface<'static>,
    device: Device,
    queue: Queue,
    config: SurfaceConfiguration,
    pipeline: RenderPipeline,
    bind_group_layout: BindGroupLayout,
    bind_group: BindGroup,
    uniform_buffer: Buffer,
    sampler: Sampler,
    background: BoundTexture,
    reflection: BoundTexture,
    puddle_mask: BoundTexture,
}

impl GraphicsBackend for WgpuBackend {
    type Session = WgpuSession;

    fn create_session(&mut self, desc: &SessionDescriptor) -> Result<WgpuSession, RenderError> {
        let surface = self
            .instance
            .create_surface(self.window.clone())
            .map_err(|e| RenderError::ContextUnavailable(e.to_string()))?;

        let adapter = pollster::block_on(self.instance.request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::LowPower,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| RenderError::ContextUnavailable("no compatible adapter".to_string()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &DeviceDescriptor {
                label: Some("rain device"),
                required_features: Features::empty(),
                required_limits: Limits::downlevel_defaults(),
            },
            None,
        ))
        .map_err(|e| RenderError::ContextUnavailable(e.to_string()))?;

        let caps = surface.get_capabilities(&adapter);
        if caps.formats.is_empty() {
            return Err(RenderError::ContextUnavailable("surface reports no formats".to_string()));
        }
        // the shader does its own colour math in display space
        let format = caps.formats.iter().copied().find(|f| !f.is_srgb()).unwrap_or(caps.formats[0]);
        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: desc.width.max(1),
            height: desc.height.max(1),
            present_mode: PresentMode::Fifo,
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        device.push_error_scope(ErrorFilter::Validation);

        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("rain shader"),
            source: ShaderSource::Wgsl(include_str!("rain.wgsl").into()),
        });

        let texture_entry = |binding| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStages::FRAGMENT,
            ty: BindingType::Texture { multisampled: false, view_dimension: TextureViewDimension::D2, sample_type: TextureSampleType::Float { filterable: true } },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("rain_bg_layout"),
            entries: &[
                BindGroupLayoutEntry { binding: 0, visibility: ShaderStages::FRAGMENT, ty: BindingType::Buffer { ty: BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: None }, count: None },
                texture_entry(1),
                BindGroupLayoutEntry { binding: 2, visibility: ShaderStages::FRAGMENT, ty: BindingType::Sampler(SamplerBindingType::Filtering), count: None },
                texture_entry(3),
                texture_entry(4),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("rain pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("rain pipeline"),
            layout: Some(&pipeline_layout),
            vertex: VertexState { module: &shader, entry_point: "vs_main", buffers: &[] },
            fragment: Some(FragmentState { module: &shader, entry_point: "fs_main", targets: &[Some(ColorTargetState { format: config.format, blend: Some(BlendState::REPLACE), write_mask: ColorWrites::ALL })] }),
            primitive: PrimitiveState { topology: PrimitiveTopology::TriangleList, strip_index_format: None, front_face: FrontFace::Ccw, cull_mode: None, unclipped_depth: false, polygon_mode: PolygonMode::Fill, conservative: false },
            depth_stencil: None,
            multisample: MultisampleState::default(),
            multiview: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::ShaderCompile(err.to_string()));
        }

        let uniform_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("rain uniforms"),
            size: std::mem::size_of::<RainUniforms>() as BufferAddress,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let sampler = device.create_sampler(&SamplerDescriptor {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Nearest,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            ..Default::default()
        });

        let placeholder = RgbaImage::placeholder();
        let background = create_texture(&device, &queue, &placeholder, "background");
        let reflection = create_texture(&device, &queue, &placeholder, "reflection");
        let puddle_mask = create_texture(&device, &queue, &RgbaImage::solid(1, 1, [0, 0, 0, 255]), "puddle mask");
        let bind_group = create_bind_group(&device, &bind_group_layout, &uniform_buffer, &sampler, &background, &reflection, &puddle_mask);

        log::info!("Rain session on {} ({:?}), surface {:?}", adapter.get_info().name, adapter.get_info().backend, format);

        Ok(WgpuSession {
            surface,
            device,
            queue,
            config,
            pipeline,
            bind_group_layout,
            bind_group,
            uniform_buffer,
            sampler,
            background,
            reflection,
            puddle_mask,
        })
    }
}

fn create_texture(device: &Device, queue: &Queue, image: &RgbaImage, label: &str) -> BoundTexture {
    let size = Extent3d { width: image.width.max(1), height: image.height.max(1), depth_or_array_layers: 1 };
    let texture = device.create_texture(&TextureDescriptor {
        size,
        mip_level_count: 1, sample_count: 1, dimension: TextureDimension::D2,
        format: TextureFormat::Rgba8Unorm,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        label: Some(label), view_formats: &[],
    });
    write_texture(queue, &texture, image);
    let view = texture.create_view(&TextureViewDescriptor::default());
    BoundTexture { texture, view, width: size.width, height: size.height }
}

fn write_texture(queue: &Queue, texture: &Texture, image: &RgbaImage) {
    if image.is_empty() {
        return;
    }
    queue.write_texture(
        ImageCopyTexture { texture, mip_level: 0, origin: Origin3d::ZERO, aspect: TextureAspect::All },
        &image.data,
        ImageDataLayout { offset: 0, bytes_per_row: Some(image.bytes_per_row()), rows_per_image: Some(image.height) },
        Extent3d { width: image.width, height: image.height, depth_or_array_layers: 1 },
    );
}

fn create_bind_group(
    device: &Device,
    layout: &BindGroupLayout,
    uniforms: &Buffer,
    sampler: &Sampler,
    background: &BoundTexture,
    reflection: &BoundTexture,
    puddle_mask: &BoundTexture,
) -> BindGroup {
    device.create_bind_group(&BindGroupDescriptor {
        label: Some("rain_bg"),
        layout,
        entries: &[
            BindGroupEntry { binding: 0, resource: uniforms.as_entire_binding() },
            BindGroupEntry { binding: 1, resource: BindingResource::TextureView(&background.view) },
            BindGroupEntry { binding: 2, resource: BindingResource::Sampler(sampler) },
            BindGroupEntry { binding: 3, resource: BindingResource::TextureView(&puddle_mask.view) },
            BindGroupEntry { binding: 4, resource: BindingResource::TextureView(&reflection.view) },
        ],
    })
}

#[derive(Clone, Copy)]
enum Slot {
    Background,
    Reflection,
    PuddleMask,
}

impl WgpuSession {
    /// Writes in place when the size matches, otherwise swaps in a new texture and rebinds.
    fn replace(&mut self, slot: Slot, image: &RgbaImage, label: &str) -> Result<(), RenderError> {
        if image.is_empty() || image.data.len() != (image.width * image.height * 4) as usize {
            return Err(RenderError::Upload(format!("{} image has inconsistent size", label)));
        }
        let target = match slot {
            Slot::Background => &mut self.background,
            Slot::Reflection => &mut self.reflection,
            Slot::PuddleMask => &mut self.puddle_mask,
        };
        if target.width == image.width && target.height == image.height {
            write_texture(&self.queue, &target.texture, image);
            return Ok(());
        }

        let fresh = create_texture(&self.device, &self.queue, image, label);
        let old = std::mem::replace(target, fresh);
        old.texture.destroy();
        self.bind_group = create_bind_group(
            &self.device,
            &self.bind_group_layout,
            &self.uniform_buffer,
            &self.sampler,
            &self.background,
            &self.reflection,
            &self.puddle_mask,
        );
        Ok(())
    }
}

impl GraphicsSession for WgpuSession {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    fn upload_background(&mut self, image: &RgbaImage) -> Result<(), RenderError> {
        self.replace(Slot::Background, image, "background")
    }

    fn upload_reflection(&mut self, image: &RgbaImage) -> Result<(), RenderError> {
        self.replace(Slot::Reflection, image, "reflection")
    }

    fn upload_puddle_mask(&mut self, image: &RgbaImage) -> Result<(), RenderError> {
        self.replace(Slot::PuddleMask, image, "puddle mask")
    }

    fn draw(&mut self, uniforms: &RainUniforms) -> Result<(), RenderError> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Err(RenderError::Surface("surface outdated, reconfigured".to_string()));
            }
            Err(SurfaceError::Lost) | Err(SurfaceError::OutOfMemory) => return Err(RenderError::ContextLost),
            Err(e) => return Err(RenderError::Surface(e.to_string())),
        };

        self.queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let view = output.texture.create_view(&TextureViewDescriptor::default());
        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor { label: Some("rain encoder") });
        {
            let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("rain pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view, resolve_target: None,
                    ops: Operations { load: LoadOp::Clear(Color::BLACK), store: StoreOp::Store },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None, occlusion_query_set: None,
            });
            rpass.set_pipeline(&self.pipeline);
            rpass.set_bind_group(0, &self.bind_group, &[]);
            rpass.draw(0..6, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn release(self) {
        self.background.texture.destroy();
        self.reflection.texture.destroy();
        self.puddle_mask.texture.destroy();
        self.uniform_buffer.destroy();
    }
}
