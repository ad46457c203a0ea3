use glam::{Mat4, Vec3};

/// Slack used when checking containment, to absorb f32 rounding.
const CONTAINS_EPSILON: f32 = 1e-4;

/// Axis-aligned box. An empty box has `min > max`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub const EMPTY: Self = Self { min: Vec3::INFINITY, max: Vec3::NEG_INFINITY };

    /// Box around flat xyz triples.
    pub fn from_positions(positions: &[f32]) -> Self {
        positions
            .chunks_exact(3)
            .fold(Self::EMPTY, |b, p| b.extended(Vec3::from_slice(p)))
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extended(&self, point: Vec3) -> Self {
        Self { min: self.min.min(point), max: self.max.max(point) }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }
}

/// Sphere used for culling and camera framing. An empty sphere has a
/// negative radius.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub const EMPTY: Self = Self { center: Vec3::ZERO, radius: -1.0 };

    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Sphere centred on the box, with the radius reaching the farthest point.
    pub fn from_positions(positions: &[f32], bounds: &BoundingBox) -> Self {
        if bounds.is_empty() {
            return Self::EMPTY;
        }
        let center = bounds.center();
        let radius_sq = positions
            .chunks_exact(3)
            .map(|p| center.distance_squared(Vec3::from_slice(p)))
            .fold(0.0f32, f32::max);
        Self { center, radius: radius_sq.sqrt() }
    }

    pub fn is_empty(&self) -> bool {
        self.radius < 0.0
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        !self.is_empty() && self.center.distance(point) <= self.radius + CONTAINS_EPSILON
    }

    pub fn contains_sphere(&self, other: &BoundingSphere) -> bool {
        if other.is_empty() {
            return true;
        }
        !self.is_empty()
            && self.center.distance(other.center) + other.radius
                <= self.radius + CONTAINS_EPSILON * self.radius.max(1.0)
    }

    /// Sphere after applying `m`; the radius scales by the largest axis scale.
    pub fn transformed(&self, m: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let max_scale_sq = m
            .x_axis
            .truncate()
            .length_squared()
            .max(m.y_axis.truncate().length_squared())
            .max(m.z_axis.truncate().length_squared());
        Self {
            center: m.transform_point3(self.center),
            radius: self.radius * max_scale_sq.sqrt(),
        }
    }

    /// Smallest sphere enclosing both. Never smaller than either input.
    pub fn union(&self, other: &BoundingSphere) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let offset = other.center - self.center;
        let distance = offset.length();
        if distance + other.radius <= self.radius {
            return *self;
        }
        if distance + self.radius <= other.radius {
            return *other;
        }
        let radius = (distance + self.radius + other.radius) * 0.5;
        let center = self.center + offset * ((radius - self.radius) / distance);
        Self { center, radius }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_from_positions() {
        let b = BoundingBox::from_positions(&[1.0, -2.0, 3.0, -1.0, 4.0, 0.0]);
        assert_eq!(b.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 4.0, 3.0));
        assert_eq!(b.center(), Vec3::new(0.0, 1.0, 1.5));
        assert!(BoundingBox::from_positions(&[]).is_empty());
        assert_eq!(BoundingBox::EMPTY.size(), Vec3::ZERO);
    }

    #[test]
    fn test_sphere_from_positions() {
        let positions = [0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 1.0, 1.0, 0.0];
        let b = BoundingBox::from_positions(&positions);
        let s = BoundingSphere::from_positions(&positions, &b);
        assert_eq!(s.center, Vec3::new(1.0, 0.5, 0.0));
        for p in positions.chunks_exact(3) {
            assert!(s.contains_point(Vec3::from_slice(p)));
        }
    }

    #[test]
    fn test_transformed_sphere() {
        let s = BoundingSphere::new(Vec3::new(1.0, 0.0, 0.0), 2.0);
        let m = Mat4::from_scale_rotation_translation(
            Vec3::new(1.0, 3.0, 2.0),
            glam::Quat::IDENTITY,
            Vec3::new(0.0, 10.0, 0.0),
        );
        let t = s.transformed(&m);
        assert_eq!(t.center, Vec3::new(1.0, 10.0, 0.0));
        assert_eq!(t.radius, 6.0);
        assert!(BoundingSphere::EMPTY.transformed(&m).is_empty());
    }

    #[test]
    fn test_union_cases() {
        let a = BoundingSphere::new(Vec3::ZERO, 1.0);
        let inner = BoundingSphere::new(Vec3::new(0.25, 0.0, 0.0), 0.5);
        assert_eq!(a.union(&inner), a);
        assert_eq!(inner.union(&a), a);
        assert_eq!(BoundingSphere::EMPTY.union(&a), a);
        assert_eq!(a.union(&BoundingSphere::EMPTY), a);

        let b = BoundingSphere::new(Vec3::new(4.0, 0.0, 0.0), 1.0);
        let u = a.union(&b);
        assert_eq!(u.center, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(u.radius, 3.0);
    }

    #[test]
    fn test_union_grows_monotonically() {
        let spheres = [
            BoundingSphere::new(Vec3::new(0.0, 0.0, 0.0), 1.0),
            BoundingSphere::new(Vec3::new(5.0, 1.0, -2.0), 0.5),
            BoundingSphere::new(Vec3::new(0.5, 0.0, 0.0), 0.1),
            BoundingSphere::new(Vec3::new(-3.0, 7.0, 2.0), 2.0),
            BoundingSphere::new(Vec3::new(-3.0, 7.0, 2.0), 20.0),
            BoundingSphere::new(Vec3::new(100.0, 0.0, 0.0), 1.0),
        ];
        let mut running = BoundingSphere::EMPTY;
        for s in &spheres {
            let next = running.union(s);
            assert!(next.radius >= running.radius);
            assert!(next.contains_sphere(&running));
            assert!(next.contains_sphere(s));
            running = next;
        }
        for s in &spheres {
            assert!(running.contains_sphere(s));
        }
    }
}
