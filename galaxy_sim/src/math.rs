use std::f32::consts::PI;

use bevy::math::{Mat3, Quat, Vec2, Vec3};
use rand::Rng;
use serde::Deserialize;

/// Inclusive `[min, max]` range read from config as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "[f32; 2]")]
pub struct ClampRange {
    pub min: f32,
    pub max: f32,
}

impl ClampRange {
    pub const UNIT: Self = Self { min: 0.0, max: 1.0 };

    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn apply(&self, value: f32) -> f32 {
        clamp_to_range(value, *self)
    }

    pub fn as_vec2(&self) -> Vec2 {
        Vec2::new(self.min, self.max)
    }
}

impl From<[f32; 2]> for ClampRange {
    fn from([min, max]: [f32; 2]) -> Self {
        Self { min, max }
    }
}

/// Clamps without panicking on an inverted range; `max` wins in that case.
pub fn clamp_to_range(value: f32, range: ClampRange) -> f32 {
    value.max(range.min).min(range.max)
}

/// Shim for `Vec3::element_sum`, which the glam version bundled with bevy 0.13 lacks.
pub trait Vec3ElementSum {
    fn element_sum(self) -> f32;
}

impl Vec3ElementSum for Vec3 {
    fn element_sum(self) -> f32 {
        self.x + self.y + self.z
    }
}

pub fn saturate(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

pub fn remap(from_min: f32, from_max: f32, to_min: f32, to_max: f32, value: f32) -> f32 {
    let t = (value - from_min) / (from_max - from_min);
    to_min + (to_max - to_min) * t
}

/// Importance multiplier that falls off with squared distance, remapped into
/// `remap_range`.
pub fn proximity_importance(
    self_position: Vec3,
    other_position: Vec3,
    max_distance_sq: f32,
    remap_range: ClampRange,
) -> f32 {
    let distance_sq = self_position.distance_squared(other_position);
    let closeness = if max_distance_sq > 0.0 {
        1.0 - saturate(distance_sq / max_distance_sq)
    } else {
        0.0
    };
    remap(0.0, 1.0, remap_range.min, remap_range.max, closeness)
}

/// Removes the component of `vector` along `normal`; a zero normal leaves the
/// vector unchanged.
pub fn project_on_plane(vector: Vec3, normal: Vec3) -> Vec3 {
    let normal_length_sq = normal.length_squared();
    if normal_length_sq <= f32::EPSILON {
        return vector;
    }
    vector - normal * (vector.dot(normal) / normal_length_sq)
}

pub fn clamp_to_max_length(vector: Vec3, max_length: f32) -> Vec3 {
    let length_sq = vector.length_squared();
    if length_sq > max_length * max_length {
        vector / length_sq.sqrt() * max_length
    } else {
        vector
    }
}

/// Frame-rate independent lerp factor.
pub fn sharpness_interpolant(sharpness: f32, dt: f32) -> f32 {
    saturate(1.0 - (-sharpness * dt).exp())
}

pub fn segment_intersects_sphere(p1: Vec3, p2: Vec3, center: Vec3, radius: f32) -> bool {
    let segment = p2 - p1;
    let segment_length_sq = segment.length_squared();
    let distance_sq = if segment_length_sq == 0.0 {
        center.distance_squared(p1)
    } else {
        let t = ((center - p1).dot(segment) / segment_length_sq).clamp(0.0, 1.0);
        center.distance_squared(p1 + segment * t)
    };
    distance_sq <= radius * radius
}

/// Rotation whose forward axis (`-Z`) points along `direction` with `+Y` kept
/// as up where possible. `None` for a zero direction.
pub fn look_rotation(direction: Vec3) -> Option<Quat> {
    let back = (-direction).try_normalize()?;
    let right = Vec3::Y
        .cross(back)
        .try_normalize()
        .unwrap_or_else(|| back.any_orthonormal_vector());
    let up = back.cross(right);
    Some(Quat::from_mat3(&Mat3::from_cols(right, up, back)))
}

pub fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    let z: f32 = rng.gen_range(-1.0..=1.0);
    let azimuth: f32 = rng.gen_range(0.0..(2.0 * PI));
    let planar = (1.0 - z * z).max(0.0).sqrt();
    Vec3::new(planar * azimuth.cos(), planar * azimuth.sin(), z)
}

/// Uniformly distributed point inside a ball.
pub fn random_in_sphere<R: Rng + ?Sized>(rng: &mut R, radius: f32) -> Vec3 {
    let direction = random_direction(rng);
    let scale = rng.gen::<f32>().powf(1.0 / 3.0);
    direction * scale * radius
}

/// Appends `count` points spread over a sphere with a spiral layout, then
/// relaxes every point away from its nearest neighbour.
pub fn equidistant_points_on_sphere(
    points: &mut Vec<Vec3>,
    count: usize,
    radius: f32,
    repel_iterations: usize,
) {
    let initial = points.len();
    let total = initial + count;
    let angle_increment = PI * 2.0 * (1.0 + 5f32.sqrt() / 4.0);

    for i in initial..total {
        let distance = i as f32 / total as f32;
        let incline = (1.0 - 2.0 * distance).acos();
        let azimuth = angle_increment * i as f32;
        points.push(Vec3::new(
            incline.sin() * azimuth.cos() * radius,
            incline.sin() * azimuth.sin() * radius,
            incline.cos() * radius,
        ));
    }

    if points.len() < 2 {
        return;
    }

    let repel_angle = PI * 0.01;
    for _ in 0..repel_iterations {
        for a in 0..points.len() {
            let direction = points[a].normalize_or_zero();
            let mut closest_remapped_dot = 0.0;
            let mut rotation_axis = Vec3::ZERO;

            for (b, other) in points.iter().enumerate() {
                if b == a {
                    continue;
                }
                let other_direction = other.normalize_or_zero();
                let remapped_dot = remap(-1.0, 1.0, 0.0, 1.0, direction.dot(other_direction));
                if remapped_dot > closest_remapped_dot {
                    closest_remapped_dot = remapped_dot;
                    rotation_axis = -direction.cross(other_direction).normalize_or_zero();
                }
            }

            if rotation_axis != Vec3::ZERO {
                let rotated = Quat::from_axis_angle(rotation_axis, repel_angle) * direction;
                points[a] = rotated * radius;
            }
        }
    }
}
