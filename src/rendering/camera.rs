use glam::{Mat4, Vec3};

/// Uniform record handed to the presenter alongside the positions buffer.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RenderParams {
    pub view_projection: [f32; 16], // column-major
    pub eye: [f32; 4],
}

// Perspective camera looking at the centre of the system
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    zoom: f32,     // zoom factor
    rotation: f32, // rotation around Y in radians
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 2.0),
            target: Vec3::ZERO,
            fov_y_degrees: 55.0,
            aspect: 1600.0 / 900.0,
            near: 0.1,
            far: 50.0,
            zoom: 1.0,
            rotation: 0.0,
        }
    }
}

impl Camera {
    /// Eye position after zoom and rotation are applied.
    pub fn effective_eye(&self) -> Vec3 {
        let offset = (self.eye - self.target) / self.zoom;
        self.target + Mat4::from_rotation_y(self.rotation).transform_vector3(offset)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.effective_eye(), self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_degrees.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn render_params(&self) -> RenderParams {
        RenderParams {
            view_projection: self.view_projection().to_cols_array(),
            eye: self.effective_eye().extend(1.0).to_array(),
        }
    }

    pub fn zoom(&mut self, delta: f32) {
        // Apply zoom (delta is positive for zoom in, negative for zoom out)
        let zoom_speed = 0.1;
        self.zoom = (self.zoom * (1.0 + delta * zoom_speed)).clamp(0.1, 10.0);
    }

    pub fn rotate(&mut self, delta: f32) {
        self.rotation = (self.rotation + delta * 0.01).rem_euclid(std::f32::consts::TAU);
    }
}
