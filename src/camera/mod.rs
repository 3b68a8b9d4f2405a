/// Camera and per-frame view state
/// Produces the view origin and the four side frustum planes the marking
/// pipeline culls against.
use glam::{Mat4, Quat, Vec3, Vec4};

use crate::vis::cull::Plane;

/// Everything the visibility pipeline needs to know about the viewpoint
/// for one frame. Built once per frame and read-only afterwards.
#[derive(Debug, Clone, Copy)]
pub struct ViewState {
    pub origin: Vec3,
    /// Inward-facing left/right/bottom/top planes. Leaf and surface culling
    /// uses the side planes only; near and far do not participate.
    pub frustum: [Plane; 4],
    /// Index of the leaf containing the view origin.
    pub view_leaf: usize,
}

pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub aspect_ratio: f32,
}

impl Camera {
    pub fn new(position: Vec3, aspect_ratio: f32) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            fov: 70.0f32.to_radians(),
            near: 0.1,
            far: 1000.0,
            aspect_ratio,
        }
    }

    /// Update camera orientation to look at a specific target point.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let view_matrix = Mat4::look_at_rh(self.position, target, up);
        let rotation_quat = Quat::from_mat4(&view_matrix.inverse());
        let (pitch, yaw, _roll) = rotation_quat.to_euler(glam::EulerRot::YXZ);
        self.yaw = yaw;
        self.pitch = pitch;
    }

    pub fn view_matrix(&self) -> Mat4 {
        let rotation = self.rotation_quat();
        let forward = rotation * Vec3::NEG_Z;
        let target = self.position + forward;
        let up = rotation * Vec3::Y;
        Mat4::look_at_rh(self.position, target, up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect_ratio, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation_quat() * Vec3::NEG_Z
    }

    fn rotation_quat(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }

    /// Extract the four side frustum planes and bundle them with the view
    /// origin into a per-frame [`ViewState`].
    pub fn view_state(&self, view_leaf: usize) -> ViewState {
        ViewState {
            origin: self.position,
            frustum: extract_side_planes(&self.view_projection_matrix()),
            view_leaf,
        }
    }
}

/// Extract the left/right/bottom/top planes from a view-projection matrix
/// using the Gribb-Hartmann method, normalized and inward-facing.
pub fn extract_side_planes(view_proj: &Mat4) -> [Plane; 4] {
    let row0 = view_proj.row(0);
    let row1 = view_proj.row(1);
    let row3 = view_proj.row(3);

    [
        normalize_plane(row3 + row0), // left
        normalize_plane(row3 - row0), // right
        normalize_plane(row3 + row1), // bottom
        normalize_plane(row3 - row1), // top
    ]
}

/// Convert an `ax + by + cz + d = 0` plane row into normal/dist form.
#[inline]
fn normalize_plane(plane: Vec4) -> Plane {
    let normal_length = plane.truncate().length();
    let plane = if normal_length > 0.0001 {
        plane / normal_length
    } else {
        plane
    };
    Plane::new(plane.truncate(), -plane.w)
}
