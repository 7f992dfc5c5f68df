use std::io::{self, Read, Write};

use crate::common::{BinarySerializable, FixedSize};
use crate::geometry::{Box3D, CoordType, Point3D};

/// Tolerance below which segment directions are treated as degenerate.
const EPSILON: CoordType = 1e-6;

/// A sphere, the geometry of somas and point-like synapses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Center of the sphere.
    pub centroid: Point3D,
    /// Radius, `>= 0`.
    pub radius: CoordType,
}

impl Sphere {
    /// Creates a sphere.
    pub fn new(centroid: Point3D, radius: CoordType) -> Sphere {
        debug_assert!(radius >= 0.0, "negative sphere radius");
        Sphere { centroid, radius }
    }

    /// A zero-radius sphere, the representation of point-like elements.
    pub fn from_point(point: Point3D) -> Sphere {
        Sphere {
            centroid: point,
            radius: 0.0,
        }
    }

    /// The tight axis-aligned bounding box.
    pub fn bounding_box(&self) -> Box3D {
        let r = Point3D([self.radius; 3]);
        Box3D::new(self.centroid - r, self.centroid + r)
    }

    /// Whether `point` lies inside the closed ball.
    pub fn contains(&self, point: Point3D) -> bool {
        self.centroid.dist_sq(point) <= self.radius * self.radius
    }

    /// Closed sphere-sphere intersection test.
    pub fn intersects_sphere(&self, other: &Sphere) -> bool {
        let radii_sum = self.radius + other.radius;
        radii_sum * radii_sum >= self.centroid.dist_sq(other.centroid)
    }

    /// Sphere-capsule intersection: the distance from the center to the
    /// capsule axis must not exceed the radii sum.
    pub fn intersects_cylinder(&self, cylinder: &Cylinder) -> bool {
        let radii_sum = self.radius + cylinder.radius;
        point_segment_dist_sq(self.centroid, cylinder.p1, cylinder.p2) <= radii_sum * radii_sum
    }

    /// Moves the sphere by `offset`.
    pub fn translate(&mut self, offset: Point3D) {
        self.centroid = self.centroid + offset;
    }

    /// The diameter; used by grid build-time guards.
    pub fn characteristic_length(&self) -> CoordType {
        2.0 * self.radius
    }
}

impl BinarySerializable for Sphere {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.centroid.serialize(writer)?;
        self.radius.serialize(writer)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let centroid = Point3D::deserialize(reader)?;
        let radius = CoordType::deserialize(reader)?;
        Ok(Sphere { centroid, radius })
    }
}

impl FixedSize for Sphere {
    const SIZE_IN_BYTES: usize = Point3D::SIZE_IN_BYTES + std::mem::size_of::<CoordType>();
}

/// A capped cylinder between `p1` and `p2`, semantically a capsule (the
/// caps are hemispheres). Named "cylinder" for historical reasons.
///
/// `p1 == p2` degenerates to a sphere of the same radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cylinder {
    /// First endpoint of the axis.
    pub p1: Point3D,
    /// Second endpoint of the axis.
    pub p2: Point3D,
    /// Radius, `>= 0`.
    pub radius: CoordType,
}

impl Cylinder {
    /// Creates a capsule.
    pub fn new(p1: Point3D, p2: Point3D, radius: CoordType) -> Cylinder {
        debug_assert!(radius >= 0.0, "negative cylinder radius");
        Cylinder { p1, p2, radius }
    }

    /// Length of the axis segment.
    pub fn length(&self) -> CoordType {
        (self.p2 - self.p1).norm()
    }

    /// The midpoint of the axis.
    pub fn midpoint(&self) -> Point3D {
        (self.p1 + self.p2) * 0.5
    }

    /// The tight axis-aligned bounding box of the two cap hemispheres.
    pub fn bounding_box(&self) -> Box3D {
        let v = self.p2 - self.p1;
        let v_dot_v = v.norm_sq();
        let e = if v_dot_v == 0.0 {
            Point3D([self.radius; 3])
        } else {
            Point3D([
                self.radius * (1.0 - v[0] * v[0] / v_dot_v).max(0.0).sqrt(),
                self.radius * (1.0 - v[1] * v[1] / v_dot_v).max(0.0).sqrt(),
                self.radius * (1.0 - v[2] * v[2] / v_dot_v).max(0.0).sqrt(),
            ])
        };
        Box3D::new(
            (self.p1 - e).elementwise_min(self.p2 - e),
            (self.p1 + e).elementwise_max(self.p2 + e),
        )
    }

    /// Whether `point` lies inside the closed capsule: within the radius of
    /// the axis if its projection falls inside the segment, inside one of
    /// the cap spheres otherwise.
    pub fn contains(&self, point: Point3D) -> bool {
        point_segment_dist_sq(point, self.p1, self.p2) <= self.radius * self.radius
    }

    /// Capsule-capsule intersection via the minimum distance between the
    /// two axis segments.
    pub fn intersects_cylinder(&self, other: &Cylinder) -> bool {
        let radii_sum = self.radius + other.radius;
        segment_segment_dist_sq(self.p1, self.p2, other.p1, other.p2) <= radii_sum * radii_sum
    }

    /// Moves the capsule by `offset`.
    pub fn translate(&mut self, offset: Point3D) {
        self.p1 = self.p1 + offset;
        self.p2 = self.p2 + offset;
    }

    /// The axis length; used by grid build-time guards.
    pub fn characteristic_length(&self) -> CoordType {
        self.length()
    }
}

impl BinarySerializable for Cylinder {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.p1.serialize(writer)?;
        self.p2.serialize(writer)?;
        self.radius.serialize(writer)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let p1 = Point3D::deserialize(reader)?;
        let p2 = Point3D::deserialize(reader)?;
        let radius = CoordType::deserialize(reader)?;
        Ok(Cylinder { p1, p2, radius })
    }
}

impl FixedSize for Cylinder {
    const SIZE_IN_BYTES: usize = 2 * Point3D::SIZE_IN_BYTES + std::mem::size_of::<CoordType>();
}

/// Squared distance from `point` to the segment `a..b`.
fn point_segment_dist_sq(point: Point3D, a: Point3D, b: Point3D) -> CoordType {
    let v = b - a;
    let v_dot_v = v.norm_sq();
    if v_dot_v == 0.0 {
        return point.dist_sq(a);
    }
    let t = ((point - a).dot(v) / v_dot_v).clamp(0.0, 1.0);
    point.dist_sq(a + v * t)
}

/// Squared minimum distance between the segments `p1..p2` and `q1..q2`.
///
/// The standard segment-segment closest-point algorithm over the parameter
/// square `(s, t) in [0,1]^2`; near-parallel segments (`denominator < EPSILON`)
/// force `s = 0`.
fn segment_segment_dist_sq(p1: Point3D, p2: Point3D, q1: Point3D, q2: Point3D) -> CoordType {
    let u = p2 - p1;
    let v = q2 - q1;
    let w = p1 - q1;
    let a = u.dot(u);
    let b = u.dot(v);
    let c = v.dot(v);
    let d = u.dot(w);
    let e = v.dot(w);
    let denominator = a * c - b * b;

    let mut s_num;
    let mut s_den = denominator;
    let mut t_num;
    let mut t_den = denominator;

    if denominator < EPSILON {
        // Nearly parallel: pick s = 0 and solve for t alone.
        s_num = 0.0;
        s_den = 1.0;
        t_num = e;
        t_den = c;
    } else {
        s_num = b * e - c * d;
        t_num = a * e - b * d;
        if s_num < 0.0 {
            s_num = 0.0;
            t_num = e;
            t_den = c;
        } else if s_num > s_den {
            s_num = s_den;
            t_num = e + b;
            t_den = c;
        }
    }

    if t_num < 0.0 {
        t_num = 0.0;
        if -d < 0.0 {
            s_num = 0.0;
        } else if -d > a {
            s_num = s_den;
        } else {
            s_num = -d;
            s_den = a;
        }
    } else if t_num > t_den {
        t_num = t_den;
        if -d + b < 0.0 {
            s_num = 0.0;
        } else if -d + b > a {
            s_num = s_den;
        } else {
            s_num = -d + b;
            s_den = a;
        }
    }

    let s = if s_den.abs() < EPSILON { 0.0 } else { s_num / s_den };
    let t = if t_den.abs() < EPSILON { 0.0 } else { t_num / t_den };

    let closest_diff = w + u * s - v * t;
    closest_diff.norm_sq()
}

/// The sum type over all query and element geometries.
///
/// Intersection is commutative; the dispatch below covers every ordered pair
/// so callers never have to order arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// A sphere.
    Sphere(Sphere),
    /// A capsule.
    Cylinder(Cylinder),
    /// An axis-aligned box.
    Box(Box3D),
}

impl Shape {
    /// Bounding box of the wrapped geometry.
    pub fn bounding_box(&self) -> Box3D {
        match self {
            Shape::Sphere(sphere) => sphere.bounding_box(),
            Shape::Cylinder(cylinder) => cylinder.bounding_box(),
            Shape::Box(bbox) => *bbox,
        }
    }

    /// Centroid of the wrapped geometry.
    pub fn centroid(&self) -> Point3D {
        match self {
            Shape::Sphere(sphere) => sphere.centroid,
            Shape::Cylinder(cylinder) => cylinder.midpoint(),
            Shape::Box(bbox) => bbox.center(),
        }
    }

    /// Exact intersection test between two geometries.
    ///
    /// Any pair involving a box defers to the bounding-box test, which the
    /// current contract accepts as exact enough for capsules.
    pub fn intersects(&self, other: &Shape) -> bool {
        match (self, other) {
            (Shape::Sphere(a), Shape::Sphere(b)) => a.intersects_sphere(b),
            (Shape::Sphere(a), Shape::Cylinder(b)) => a.intersects_cylinder(b),
            (Shape::Cylinder(a), Shape::Sphere(b)) => b.intersects_cylinder(a),
            (Shape::Cylinder(a), Shape::Cylinder(b)) => a.intersects_cylinder(b),
            (Shape::Box(a), other) => a.intersects(&other.bounding_box()),
            (this, Shape::Box(b)) => b.intersects(&this.bounding_box()),
        }
    }

    /// Moves the geometry by `offset`.
    pub fn translate(&mut self, offset: Point3D) {
        match self {
            Shape::Sphere(sphere) => sphere.translate(offset),
            Shape::Cylinder(cylinder) => cylinder.translate(offset),
            Shape::Box(bbox) => bbox.translate(offset),
        }
    }

    /// Characteristic length of the wrapped geometry.
    pub fn characteristic_length(&self) -> CoordType {
        match self {
            Shape::Sphere(sphere) => sphere.characteristic_length(),
            Shape::Cylinder(cylinder) => cylinder.characteristic_length(),
            Shape::Box(bbox) => (0..3).map(|d| bbox.extent(d)).fold(0.0, CoordType::max),
        }
    }
}

impl From<Sphere> for Shape {
    fn from(sphere: Sphere) -> Shape {
        Shape::Sphere(sphere)
    }
}

impl From<Cylinder> for Shape {
    fn from(cylinder: Cylinder) -> Shape {
        Shape::Cylinder(cylinder)
    }
}

impl From<Box3D> for Shape {
    fn from(bbox: Box3D) -> Shape {
        Shape::Box(bbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere(x: CoordType, y: CoordType, z: CoordType, r: CoordType) -> Sphere {
        Sphere::new(Point3D::new(x, y, z), r)
    }

    #[test]
    fn test_sphere_bounding_box() {
        let bbox = sphere(1.0, 2.0, 3.0, 0.5).bounding_box();
        assert_eq!(bbox.min_corner, Point3D::new(0.5, 1.5, 2.5));
        assert_eq!(bbox.max_corner, Point3D::new(1.5, 2.5, 3.5));
    }

    #[test]
    fn test_sphere_contains_boundary() {
        let s = sphere(0.0, 0.0, 0.0, 2.0);
        // Closed-ball semantics: the boundary is inside.
        assert!(s.contains(Point3D::new(2.0, 0.0, 0.0)));
        assert!(s.contains(Point3D::new(0.0, -2.0, 0.0)));
        assert!(!s.contains(Point3D::new(2.001, 0.0, 0.0)));
    }

    #[test]
    fn test_sphere_sphere_intersection_is_closed() {
        let a = sphere(0.0, 0.0, 0.0, 1.0);
        let b = sphere(3.0, 0.0, 0.0, 2.0);
        // Touching at x = 1 counts.
        assert!(a.intersects_sphere(&b));
        let c = sphere(3.01, 0.0, 0.0, 2.0);
        assert!(!a.intersects_sphere(&c));
    }

    #[test]
    fn test_cylinder_bounding_box_axis_aligned() {
        let c = Cylinder::new(Point3D::ZERO, Point3D::new(0.0, 5.0, 0.0), 1.0);
        let bbox = c.bounding_box();
        assert_eq!(bbox.min_corner, Point3D::new(-1.0, 0.0, -1.0));
        assert_eq!(bbox.max_corner, Point3D::new(1.0, 5.0, 1.0));
    }

    #[test]
    fn test_cylinder_degenerates_to_sphere() {
        let p = Point3D::new(1.0, 1.0, 1.0);
        let c = Cylinder::new(p, p, 2.0);
        assert_eq!(c.bounding_box(), sphere(1.0, 1.0, 1.0, 2.0).bounding_box());
        assert!(c.contains(Point3D::new(1.0, 3.0, 1.0)));
        assert!(!c.contains(Point3D::new(1.0, 3.1, 1.0)));
    }

    #[test]
    fn test_cylinder_contains_caps() {
        let c = Cylinder::new(Point3D::ZERO, Point3D::new(0.0, 5.0, 0.0), 1.0);
        // Inside the shaft.
        assert!(c.contains(Point3D::new(0.5, 2.5, 0.0)));
        // Inside the top cap hemisphere, beyond the segment.
        assert!(c.contains(Point3D::new(0.0, 5.9, 0.0)));
        assert!(!c.contains(Point3D::new(0.0, 6.1, 0.0)));
        // Outside the shaft radially.
        assert!(!c.contains(Point3D::new(1.5, 2.5, 0.0)));
    }

    #[test]
    fn test_sphere_cylinder_intersection() {
        let c = Cylinder::new(Point3D::ZERO, Point3D::new(0.0, 5.0, 0.0), 1.0);
        assert!(sphere(0.0, 6.0, 0.0, 2.0).intersects_cylinder(&c));
        assert!(!sphere(0.0, -3.0, 0.0, 1.5).intersects_cylinder(&c));
        assert!(sphere(3.0, 2.5, 0.0, 2.0).intersects_cylinder(&c));
    }

    #[test]
    fn test_cylinder_cylinder_intersection() {
        let a = Cylinder::new(Point3D::ZERO, Point3D::new(0.0, 5.0, 0.0), 1.0);
        // Crossing at right angles, separated along z.
        let b = Cylinder::new(Point3D::new(-5.0, 2.5, 1.5), Point3D::new(5.0, 2.5, 1.5), 1.0);
        assert!(a.intersects_cylinder(&b));
        let c = Cylinder::new(Point3D::new(-5.0, 2.5, 2.5), Point3D::new(5.0, 2.5, 2.5), 1.0);
        assert!(!a.intersects_cylinder(&c));
        // Parallel capsules.
        let d = Cylinder::new(Point3D::new(1.5, 0.0, 0.0), Point3D::new(1.5, 5.0, 0.0), 1.0);
        assert!(a.intersects_cylinder(&d));
    }

    #[test]
    fn test_shape_dispatch_is_commutative() {
        let shapes: Vec<Shape> = vec![
            sphere(0.0, 0.0, 0.0, 1.0).into(),
            Cylinder::new(Point3D::ZERO, Point3D::new(2.0, 0.0, 0.0), 0.5).into(),
            Box3D::new(Point3D::new(-1.0, -1.0, -1.0), Point3D::new(1.0, 1.0, 1.0)).into(),
            sphere(10.0, 10.0, 10.0, 0.1).into(),
        ];
        for a in &shapes {
            for b in &shapes {
                assert_eq!(a.intersects(b), b.intersects(a));
            }
        }
    }

    #[test]
    fn test_characteristic_length() {
        assert_eq!(sphere(0.0, 0.0, 0.0, 2.0).characteristic_length(), 4.0);
        let c = Cylinder::new(Point3D::ZERO, Point3D::new(3.0, 4.0, 0.0), 1.0);
        assert_eq!(c.characteristic_length(), 5.0);
    }
}
