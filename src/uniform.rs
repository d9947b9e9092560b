// Per-frame uniform payload for the vertex shader (binding 0)

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use std::time::Duration;

/// Quarter turn per second around the Z axis
const ROTATION_RADIANS_PER_SECOND: f32 = std::f32::consts::FRAC_PI_2;
const CAMERA_EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);
const FOV_Y_DEGREES: f32 = 45.0;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 10.0;

/// Model/view/projection, laid out as std140 column-major matrices
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    pub const SIZE: vk::DeviceSize = std::mem::size_of::<Self>() as vk::DeviceSize;

    /// Transforms for the spinning quad `elapsed` after startup
    pub fn animated(elapsed: Duration, extent: vk::Extent2D) -> Self {
        let angle = elapsed.as_secs_f32() * ROTATION_RADIANS_PER_SECOND;
        let model = Mat4::from_rotation_z(angle);
        let view = Mat4::look_at_rh(CAMERA_EYE, Vec3::ZERO, Vec3::Z);

        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let mut proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);
        // Vulkan clip space has Y pointing down
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 1280,
        height: 720,
    };

    #[test]
    fn model_starts_unrotated() {
        let ubo = UniformBufferObject::animated(Duration::ZERO, EXTENT);
        assert_relative_eq!(ubo.model, Mat4::IDENTITY);
    }

    #[test]
    fn model_turns_a_quarter_each_second() {
        let ubo = UniformBufferObject::animated(Duration::from_secs(1), EXTENT);
        let rotated = ubo.model * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(rotated, Vec4::new(0.0, 1.0, 0.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn view_and_projection_do_not_depend_on_time() {
        let a = UniformBufferObject::animated(Duration::from_millis(10), EXTENT);
        let b = UniformBufferObject::animated(Duration::from_secs(42), EXTENT);
        assert_eq!(a.view, b.view);
        assert_eq!(a.proj, b.proj);
    }

    #[test]
    fn projection_is_flipped_vertically() {
        let ubo = UniformBufferObject::animated(Duration::ZERO, EXTENT);
        let unflipped = Mat4::perspective_rh(
            FOV_Y_DEGREES.to_radians(),
            1280.0 / 720.0,
            Z_NEAR,
            Z_FAR,
        );

        assert!(ubo.proj.y_axis.y < 0.0);
        assert_relative_eq!(ubo.proj.y_axis.y, -unflipped.y_axis.y);
        assert_relative_eq!(ubo.proj.x_axis.x, unflipped.x_axis.x);
    }

    #[test]
    fn payload_is_three_matrices() {
        assert_eq!(UniformBufferObject::SIZE, 192);
        let ubo = UniformBufferObject::animated(Duration::ZERO, EXTENT);
        assert_eq!(ubo.as_bytes().len(), 192);
    }
}
