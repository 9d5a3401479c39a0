use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::backend::{BackendError, BufferHandle, ComputeBackend, Dispatch, Frame};
use crate::rendering::camera::RenderParams;
use crate::simulation::types::{COMPUTE_WORKGROUP_SIZE, ComputeParams, POSITION_RECORD_SIZE, VELOCITY_RECORD_SIZE};

type BindGroupKey = (BufferHandle, BufferHandle, BufferHandle);

/// Names of every adapter wgpu can see, in enumeration order.
pub fn adapter_names() -> Vec<String> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    instance
        .enumerate_adapters(wgpu::Backends::all())
        .iter()
        .map(|adapter| adapter.get_info().name)
        .collect()
}

/// wgpu backend: storage buffers on one adapter, integration in WGSL.
pub struct GpuBackend {
    name: String,
    device: wgpu::Device,
    queue: wgpu::Queue,

    compute_pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    bind_groups: HashMap<BindGroupKey, wgpu::BindGroup>,

    buffers: HashMap<BufferHandle, wgpu::Buffer>,
    next_id: u64,

    // Presentation slot filled by submit_render
    present_buffer: Option<wgpu::Buffer>,
    render_params_buffer: wgpu::Buffer,
}

impl GpuBackend {
    /// Opens the adapter at `adapter_index` (see [`adapter_names`]).
    pub fn new(adapter_index: usize) -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .nth(adapter_index)
            .ok_or_else(|| BackendError::Unavailable(format!("no adapter at index {adapter_index}")))?;
        let info = adapter.get_info();

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("N-Body Device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| BackendError::Unavailable(format!("{}: {e}", info.name)))?;

        device.on_uncaptured_error(Box::new(|error: wgpu::Error| {
            log::error!("wgpu: {error}");
        }));

        log::info!(
            "opened adapter {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        // Load shader
        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("N-Body Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("N-Body Bind Group Layout"),
            entries: &[
                // positions_in
                storage_entry(0, true),
                // positions_out
                storage_entry(1, false),
                // velocities
                storage_entry(2, false),
                // compute params
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("N-Body Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let compute_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("N-Body Compute Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: Some("integrate"),
            compilation_options: Default::default(),
            cache: None,
        });

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Compute Params Buffer"),
            contents: bytemuck::bytes_of(&ComputeParams {
                body_count: 0,
                delta_time: 0.0,
                softening: 0.0,
                gravitational_constant: 0.0,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let render_params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Render Params Buffer"),
            size: std::mem::size_of::<RenderParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            name: format!("{} ({:?})", info.name, info.backend),
            device,
            queue,
            compute_pipeline,
            bind_group_layout,
            params_buffer,
            bind_groups: HashMap::new(),
            buffers: HashMap::new(),
            next_id: 0,
            present_buffer: None,
            render_params_buffer,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Copy of the last presented positions, usable as a vertex or storage buffer.
    pub fn present_buffer(&self) -> Option<&wgpu::Buffer> {
        self.present_buffer.as_ref()
    }

    /// Uniform holding the view-projection of the last presented frame.
    pub fn render_params_buffer(&self) -> &wgpu::Buffer {
        &self.render_params_buffer
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&wgpu::Buffer, BackendError> {
        self.buffers.get(&handle).ok_or(BackendError::UnknownBuffer(handle))
    }

    fn check_size(&self, handle: BufferHandle, expected: u64) -> Result<(), BackendError> {
        let actual = self.buffer(handle)?.size();
        if actual < expected {
            return Err(BackendError::SizeMismatch {
                buffer: handle,
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn create_bind_group(&self, dispatch: &Dispatch) -> Result<wgpu::BindGroup, BackendError> {
        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("N-Body Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.buffer(dispatch.positions_in)?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.buffer(dispatch.positions_out)?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.buffer(dispatch.velocities)?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.params_buffer.as_entire_binding(),
                },
            ],
        }))
    }

    fn poll_wait(&self) -> Result<(), BackendError> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|e| BackendError::Device(e.to_string()))
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl ComputeBackend for GpuBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate_buffer(&mut self, label: &str, size: u64) -> Result<BufferHandle, BackendError> {
        let allocation_error = || BackendError::Allocation {
            label: label.to_string(),
            size,
        };
        if size == 0 || size % wgpu::COPY_BUFFER_ALIGNMENT != 0 || size > self.device.limits().max_buffer_size {
            return Err(allocation_error());
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("{label}: {error}");
            return Err(allocation_error());
        }

        let handle = BufferHandle(self.next_id);
        self.next_id += 1;
        self.buffers.insert(handle, buffer);
        log::trace!("{label}: allocated {size} bytes as {handle}");
        Ok(handle)
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        self.bind_groups
            .retain(|&(a, b, c), _| a != buffer && b != buffer && c != buffer);
        if let Some(buffer) = self.buffers.remove(&buffer) {
            buffer.destroy();
        }
    }

    fn write_buffer(&mut self, buffer: BufferHandle, bytes: &[u8]) -> Result<(), BackendError> {
        let target = self.buffer(buffer)?;
        if bytes.len() as u64 > target.size() || bytes.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(BackendError::SizeMismatch {
                buffer,
                expected: target.size(),
                actual: bytes.len() as u64,
            });
        }
        self.queue.write_buffer(target, 0, bytes);
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferHandle) -> Result<Vec<u8>, BackendError> {
        let source = self.buffer(buffer)?;
        let size = source.size();

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
        self.queue.submit([encoder.finish()]);

        let (sender, receiver) = flume::bounded(1);
        let slice = staging.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.poll_wait()?;

        let readback_error = |reason: String| BackendError::Readback { buffer, reason };
        receiver
            .recv()
            .map_err(|e| readback_error(e.to_string()))?
            .map_err(|e| readback_error(e.to_string()))?;

        let bytes = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(bytes)
    }

    fn submit_compute(&mut self, dispatch: &Dispatch) -> Result<(), BackendError> {
        let count = dispatch.params.body_count;
        if count % COMPUTE_WORKGROUP_SIZE != 0 {
            return Err(BackendError::Device(format!(
                "{count} bodies do not tile into workgroups of {COMPUTE_WORKGROUP_SIZE}"
            )));
        }
        if dispatch.positions_in == dispatch.positions_out {
            return Err(BackendError::Device(format!(
                "dispatch reads and writes {}",
                dispatch.positions_in
            )));
        }
        self.check_size(dispatch.positions_in, count as u64 * POSITION_RECORD_SIZE)?;
        self.check_size(dispatch.positions_out, count as u64 * POSITION_RECORD_SIZE)?;
        self.check_size(dispatch.velocities, count as u64 * VELOCITY_RECORD_SIZE)?;

        let key = (dispatch.positions_in, dispatch.positions_out, dispatch.velocities);
        if !self.bind_groups.contains_key(&key) {
            let bind_group = self.create_bind_group(dispatch)?;
            self.bind_groups.insert(key, bind_group);
        }
        let bind_group = self
            .bind_groups
            .get(&key)
            .ok_or(BackendError::UnknownBuffer(dispatch.positions_in))?;

        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&dispatch.params));

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("N-Body Command Encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("N-Body Compute Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.compute_pipeline);
            compute_pass.set_bind_group(0, bind_group, &[]);
            compute_pass.dispatch_workgroups(count / COMPUTE_WORKGROUP_SIZE, 1, 1);
        }
        self.queue.submit([encoder.finish()]);
        Ok(())
    }

    fn submit_render(&mut self, frame: &Frame) -> Result<(), BackendError> {
        let size = frame.body_count as u64 * POSITION_RECORD_SIZE;
        self.check_size(frame.positions, size)?;

        if self.present_buffer.as_ref().map(wgpu::Buffer::size) != Some(size) {
            self.present_buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Present Buffer"),
                size,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
        let source = self.buffer(frame.positions)?;
        let Some(present) = self.present_buffer.as_ref() else {
            return Err(BackendError::Device("present buffer missing".into()));
        };

        self.queue
            .write_buffer(&self.render_params_buffer, 0, bytemuck::bytes_of(&frame.render_params));
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Present Encoder"),
        });
        encoder.copy_buffer_to_buffer(source, 0, present, 0, size);
        self.queue.submit([encoder.finish()]);
        Ok(())
    }

    fn drain(&mut self) -> Result<(), BackendError> {
        self.poll_wait()
    }
}
