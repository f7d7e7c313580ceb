//! Planar geometry primitives and their hex EWKB form
//!
//! Topology rows carry three kinds of geometry:
//! - `Point`: node positions
//! - `LineString`: edge shapes
//! - `Envelope`: face bounding rectangles, persisted as a polygon
//!
//! Everything is persisted as extended well-known binary rendered in
//! upper-case hexadecimal, with the spatial reference embedded when known.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Spatial reference identifier
pub type Srid = i32;

/// Srid of geometries with no declared spatial reference
pub const SRID_UNKNOWN: Srid = 0;

const EWKB_Z_FLAG: u32 = 0x8000_0000;
const EWKB_M_FLAG: u32 = 0x4000_0000;
const EWKB_SRID_FLAG: u32 = 0x2000_0000;

const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;

/// Distance under which two positions are considered coincident
const TOLERANCE: f64 = 1e-9;

/// A bare 2D position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(&self, other: &Coord) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A point geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub srid: Srid,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, srid: SRID_UNKNOWN }
    }

    pub fn with_srid(mut self, srid: Srid) -> Self {
        self.srid = srid;
        self
    }

    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }

    fn is_empty(&self) -> bool {
        self.x.is_nan() || self.y.is_nan()
    }
}

/// A line geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineString {
    pub points: Vec<Coord>,
    pub srid: Srid,
}

impl LineString {
    pub fn new(points: Vec<Coord>) -> Self {
        Self { points, srid: SRID_UNKNOWN }
    }

    /// Build a line from `(x, y)` pairs
    pub fn from_xy(coords: &[(f64, f64)]) -> Self {
        Self::new(coords.iter().map(|&(x, y)| Coord::new(x, y)).collect())
    }

    pub fn with_srid(mut self, srid: Srid) -> Self {
        self.srid = srid;
        self
    }

    pub fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) => self.points.len() > 1 && a == b,
            _ => false,
        }
    }

    pub fn envelope(&self) -> Option<Envelope> {
        Envelope::of_coords(&self.points)
    }

    fn segments(&self) -> impl Iterator<Item = (Coord, Coord)> + '_ {
        self.points.windows(2).map(|w| (w[0], w[1]))
    }
}

/// A polygon geometry; the first ring is the shell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub rings: Vec<Vec<Coord>>,
    pub srid: Srid,
}

impl Polygon {
    fn segments(&self) -> impl Iterator<Item = (Coord, Coord)> + '_ {
        self.rings
            .iter()
            .flat_map(|ring| ring.windows(2).map(|w| (w[0], w[1])))
    }

    /// True when `c` lies in the interior (boundary excluded)
    fn contains_strictly(&self, c: Coord) -> bool {
        if self.segments().any(|(a, b)| point_segment_distance(c, a, b) <= TOLERANCE) {
            return false;
        }
        let crossings: u32 = self.rings.iter().map(|r| ray_crossings(c, r)).sum();
        crossings % 2 == 1
    }

    fn covers(&self, c: Coord) -> bool {
        self.segments().any(|(a, b)| point_segment_distance(c, a, b) <= TOLERANCE)
            || self.contains_strictly(c)
    }
}

/// Axis-aligned minimum bounding rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Envelope {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self { xmin, ymin, xmax, ymax }
    }

    fn of_coords(coords: &[Coord]) -> Option<Self> {
        let mut iter = coords.iter().filter(|c| !c.x.is_nan() && !c.y.is_nan());
        let first = iter.next()?;
        let mut env = Envelope::new(first.x, first.y, first.x, first.y);
        for c in iter {
            env.xmin = env.xmin.min(c.x);
            env.ymin = env.ymin.min(c.y);
            env.xmax = env.xmax.max(c.x);
            env.ymax = env.ymax.max(c.y);
        }
        Some(env)
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        self.xmin <= other.xmax
            && other.xmin <= self.xmax
            && self.ymin <= other.ymax
            && other.ymin <= self.ymax
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.xmin && p.x <= self.xmax && p.y >= self.ymin && p.y <= self.ymax
    }

    /// The rectangle as a closed, counter-clockwise polygon
    pub fn to_polygon(&self, srid: Srid) -> Polygon {
        let ring = vec![
            Coord::new(self.xmin, self.ymin),
            Coord::new(self.xmax, self.ymin),
            Coord::new(self.xmax, self.ymax),
            Coord::new(self.xmin, self.ymax),
            Coord::new(self.xmin, self.ymin),
        ];
        Polygon { rings: vec![ring], srid }
    }
}

/// Any geometry the store persists
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point),
    LineString(LineString),
    Polygon(Polygon),
}

impl Geometry {
    pub fn srid(&self) -> Srid {
        match self {
            Geometry::Point(p) => p.srid,
            Geometry::LineString(l) => l.srid,
            Geometry::Polygon(p) => p.srid,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
        }
    }

    /// Bounding box, `None` for empty geometries
    pub fn envelope(&self) -> Option<Envelope> {
        match self {
            Geometry::Point(p) if p.is_empty() => None,
            Geometry::Point(p) => Some(Envelope::new(p.x, p.y, p.x, p.y)),
            Geometry::LineString(l) => l.envelope(),
            Geometry::Polygon(p) => p.rings.first().and_then(|shell| Envelope::of_coords(shell)),
        }
    }

    pub fn into_point(self) -> Result<Point> {
        match self {
            Geometry::Point(p) => Ok(p),
            other => Err(Error::Geometry(format!("expected a Point, got a {}", other.type_name()))),
        }
    }

    pub fn into_line_string(self) -> Result<LineString> {
        match self {
            Geometry::LineString(l) => Ok(l),
            other => Err(Error::Geometry(format!(
                "expected a LineString, got a {}",
                other.type_name()
            ))),
        }
    }

    // ========== EWKB ==========

    /// Encode as little-endian extended WKB
    pub fn to_ewkb(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        out.push(1u8);
        let (kind, srid) = match self {
            Geometry::Point(p) => (WKB_POINT, p.srid),
            Geometry::LineString(l) => (WKB_LINESTRING, l.srid),
            Geometry::Polygon(p) => (WKB_POLYGON, p.srid),
        };
        if srid != SRID_UNKNOWN {
            out.extend_from_slice(&(kind | EWKB_SRID_FLAG).to_le_bytes());
            out.extend_from_slice(&srid.to_le_bytes());
        } else {
            out.extend_from_slice(&kind.to_le_bytes());
        }
        let push_coord = |out: &mut Vec<u8>, c: &Coord| {
            out.extend_from_slice(&c.x.to_le_bytes());
            out.extend_from_slice(&c.y.to_le_bytes());
        };
        match self {
            Geometry::Point(p) => push_coord(&mut out, &p.coord()),
            Geometry::LineString(l) => {
                out.extend_from_slice(&(l.points.len() as u32).to_le_bytes());
                for c in &l.points {
                    push_coord(&mut out, c);
                }
            }
            Geometry::Polygon(p) => {
                out.extend_from_slice(&(p.rings.len() as u32).to_le_bytes());
                for ring in &p.rings {
                    out.extend_from_slice(&(ring.len() as u32).to_le_bytes());
                    for c in ring {
                        push_coord(&mut out, c);
                    }
                }
            }
        }
        out
    }

    pub fn to_hex_ewkb(&self) -> String {
        hex::encode_upper(self.to_ewkb())
    }

    pub fn from_ewkb(bytes: &[u8]) -> Result<Self> {
        let mut reader = WkbReader::new(bytes)?;
        let raw_type = reader.u32()?;
        let srid = if raw_type & EWKB_SRID_FLAG != 0 {
            reader.u32()? as Srid
        } else {
            SRID_UNKNOWN
        };
        let dims = 2 + usize::from(raw_type & EWKB_Z_FLAG != 0) + usize::from(raw_type & EWKB_M_FLAG != 0);
        reader.dims = dims;

        let geom = match raw_type & 0x0FFF_FFFF {
            WKB_POINT => {
                let c = reader.coord()?;
                Geometry::Point(Point { x: c.x, y: c.y, srid })
            }
            WKB_LINESTRING => Geometry::LineString(LineString { points: reader.coords()?, srid }),
            WKB_POLYGON => {
                let nrings = reader.u32()? as usize;
                let mut rings = Vec::with_capacity(nrings.min(1024));
                for _ in 0..nrings {
                    rings.push(reader.coords()?);
                }
                Geometry::Polygon(Polygon { rings, srid })
            }
            other => {
                return Err(Error::Geometry(format!("unsupported WKB geometry type {}", other)));
            }
        };
        if !reader.is_exhausted() {
            return Err(Error::Geometry("trailing bytes after WKB geometry".to_string()));
        }
        Ok(geom)
    }

    pub fn from_hex_ewkb(text: &str) -> Result<Self> {
        let bytes = hex::decode(text.trim())
            .map_err(|e| Error::Geometry(format!("invalid hex EWKB: {}", e)))?;
        Self::from_ewkb(&bytes)
    }

    // ========== Predicates ==========

    fn parts(&self) -> (Vec<Coord>, Vec<(Coord, Coord)>) {
        match self {
            Geometry::Point(p) if p.is_empty() => (Vec::new(), Vec::new()),
            Geometry::Point(p) => (vec![p.coord()], Vec::new()),
            Geometry::LineString(l) if l.points.len() == 1 => (l.points.clone(), Vec::new()),
            Geometry::LineString(l) => (Vec::new(), l.segments().collect()),
            Geometry::Polygon(p) => (Vec::new(), p.segments().collect()),
        }
    }

    fn vertices(&self) -> Vec<Coord> {
        match self {
            Geometry::Point(p) if p.is_empty() => Vec::new(),
            Geometry::Point(p) => vec![p.coord()],
            Geometry::LineString(l) => l.points.clone(),
            Geometry::Polygon(p) => p.rings.iter().flatten().copied().collect(),
        }
    }

    /// Minimum planar distance; infinite when either side is empty
    pub fn distance(&self, other: &Geometry) -> f64 {
        if let Geometry::Polygon(poly) = self {
            if other.vertices().iter().any(|c| poly.covers(*c)) {
                return 0.0;
            }
        }
        if let Geometry::Polygon(poly) = other {
            if self.vertices().iter().any(|c| poly.covers(*c)) {
                return 0.0;
            }
        }

        let (pa, sa) = self.parts();
        let (pb, sb) = other.parts();
        let mut best = f64::INFINITY;
        for a in &pa {
            for b in &pb {
                best = best.min(a.distance(b));
            }
            for (s, e) in &sb {
                best = best.min(point_segment_distance(*a, *s, *e));
            }
        }
        for (s, e) in &sa {
            for b in &pb {
                best = best.min(point_segment_distance(*b, *s, *e));
            }
            for (s2, e2) in &sb {
                best = best.min(segment_distance(*s, *e, *s2, *e2));
            }
        }
        best
    }

    /// True when the two geometries share at least one position
    pub fn intersects(&self, other: &Geometry) -> bool {
        self.distance(other) <= TOLERANCE
    }

    /// OGC "within": `self` lies in `other` and touches its interior
    pub fn within(&self, other: &Geometry) -> Result<bool> {
        match (self, other) {
            (Geometry::Point(p), _) if p.is_empty() => Ok(false),
            (Geometry::Point(p), Geometry::Point(q)) => Ok(!q.is_empty() && p.coord().distance(&q.coord()) <= TOLERANCE),
            (Geometry::Point(p), Geometry::LineString(l)) => Ok(point_in_line_interior(p.coord(), l)),
            (Geometry::Point(p), Geometry::Polygon(poly)) => Ok(poly.contains_strictly(p.coord())),
            (a, b) => Err(Error::Geometry(format!(
                "within({}, {}) is not supported",
                a.type_name(),
                b.type_name()
            ))),
        }
    }
}

impl From<Point> for Geometry {
    fn from(p: Point) -> Self {
        Geometry::Point(p)
    }
}

impl From<LineString> for Geometry {
    fn from(l: LineString) -> Self {
        Geometry::LineString(l)
    }
}

impl From<Polygon> for Geometry {
    fn from(p: Polygon) -> Self {
        Geometry::Polygon(p)
    }
}

/// Number of times a ray cast from `p` towards +x crosses the given path
pub fn ray_crossings(p: Coord, path: &[Coord]) -> u32 {
    path.windows(2)
        .filter(|w| {
            let (a, b) = (w[0], w[1]);
            if (a.y > p.y) == (b.y > p.y) {
                return false;
            }
            let x_at = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            p.x < x_at
        })
        .count() as u32
}

fn point_in_line_interior(c: Coord, line: &LineString) -> bool {
    let on_line = line
        .segments()
        .any(|(a, b)| point_segment_distance(c, a, b) <= TOLERANCE);
    if !on_line {
        return false;
    }
    if line.is_closed() {
        return true;
    }
    // Endpoints of an open line form its boundary
    let touches_end = |end: Option<&Coord>| end.is_some_and(|e| e.distance(&c) <= TOLERANCE);
    !touches_end(line.points.first()) && !touches_end(line.points.last())
}

fn point_segment_distance(p: Coord, a: Coord, b: Coord) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return p.distance(&a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    p.distance(&Coord::new(a.x + t * dx, a.y + t * dy))
}

fn orientation(a: Coord, b: Coord, c: Coord) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn segment_distance(a: Coord, b: Coord, c: Coord, d: Coord) -> f64 {
    let o1 = orientation(a, b, c);
    let o2 = orientation(a, b, d);
    let o3 = orientation(c, d, a);
    let o4 = orientation(c, d, b);
    if o1 * o2 < 0.0 && o3 * o4 < 0.0 {
        return 0.0;
    }
    point_segment_distance(a, c, d)
        .min(point_segment_distance(b, c, d))
        .min(point_segment_distance(c, a, b))
        .min(point_segment_distance(d, a, b))
}

struct WkbReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    little_endian: bool,
    dims: usize,
}

impl<'a> WkbReader<'a> {
    fn new(bytes: &'a [u8]) -> Result<Self> {
        let little_endian = match bytes.first() {
            Some(0) => false,
            Some(1) => true,
            Some(b) => return Err(Error::Geometry(format!("invalid WKB byte order marker {}", b))),
            None => return Err(Error::Geometry("empty WKB input".to_string())),
        };
        Ok(Self { bytes, pos: 1, little_endian, dims: 2 })
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| Error::Geometry("truncated WKB input".to_string()))?;
        self.pos = end;
        let mut buf = [0u8; N];
        buf.copy_from_slice(slice);
        Ok(buf)
    }

    fn u32(&mut self) -> Result<u32> {
        let buf = self.take::<4>()?;
        Ok(if self.little_endian { u32::from_le_bytes(buf) } else { u32::from_be_bytes(buf) })
    }

    fn f64(&mut self) -> Result<f64> {
        let buf = self.take::<8>()?;
        Ok(if self.little_endian { f64::from_le_bytes(buf) } else { f64::from_be_bytes(buf) })
    }

    fn coord(&mut self) -> Result<Coord> {
        let x = self.f64()?;
        let y = self.f64()?;
        for _ in 2..self.dims {
            self.f64()?;
        }
        Ok(Coord::new(x, y))
    }

    fn coords(&mut self) -> Result<Vec<Coord>> {
        let n = self.u32()? as usize;
        let mut out = Vec::with_capacity(n.min(4096));
        for _ in 0..n {
            out.push(self.coord()?);
        }
        Ok(out)
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_hex_matches_ewkb_layout() {
        let hex = Geometry::from(Point::new(0.0, 0.0)).to_hex_ewkb();
        assert_eq!(hex, "010100000000000000000000000000000000000000");

        let tagged = Geometry::from(Point::new(0.0, 0.0).with_srid(4326)).to_hex_ewkb();
        assert!(tagged.starts_with("0101000020E6100000"));
    }

    #[test]
    fn test_line_decodes_with_srid() {
        let line = LineString::from_xy(&[(0.0, 0.0), (10.0, 0.0), (10.0, 5.0)]).with_srid(3857);
        let hex = Geometry::from(line.clone()).to_hex_ewkb();
        let decoded = Geometry::from_hex_ewkb(&hex).unwrap().into_line_string().unwrap();
        assert_eq!(decoded, line);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Geometry::from_hex_ewkb("zz").is_err());
        assert!(Geometry::from_hex_ewkb("0101000000").is_err());
        assert!(Geometry::from_hex_ewkb("").is_err());
    }

    #[test]
    fn test_point_line_distance() {
        let line: Geometry = LineString::from_xy(&[(0.0, 0.0), (10.0, 0.0)]).into();
        let p: Geometry = Point::new(5.0, 3.0).into();
        assert!((p.distance(&line) - 3.0).abs() < 1e-12);
        assert_eq!(line.distance(&p), p.distance(&line));
    }

    #[test]
    fn test_point_within_line_excludes_endpoints() {
        let line: Geometry = LineString::from_xy(&[(0.0, 0.0), (10.0, 0.0)]).into();
        assert!(Geometry::from(Point::new(4.0, 0.0)).within(&line).unwrap());
        assert!(!Geometry::from(Point::new(0.0, 0.0)).within(&line).unwrap());
        assert!(!Geometry::from(Point::new(4.0, 0.1)).within(&line).unwrap());
    }

    #[test]
    fn test_point_in_envelope_polygon() {
        let square: Geometry = Envelope::new(0.0, 0.0, 10.0, 10.0).to_polygon(0).into();
        assert!(Geometry::from(Point::new(5.0, 5.0)).within(&square).unwrap());
        assert!(!Geometry::from(Point::new(0.0, 5.0)).within(&square).unwrap());
        assert_eq!(square.distance(&Geometry::from(Point::new(5.0, 5.0))), 0.0);
    }

    #[test]
    fn test_ray_crossings_square_ring() {
        let ring = [
            Coord::new(0.0, 0.0),
            Coord::new(10.0, 0.0),
            Coord::new(10.0, 10.0),
            Coord::new(0.0, 10.0),
            Coord::new(0.0, 0.0),
        ];
        assert_eq!(ray_crossings(Coord::new(5.0, 5.0), &ring), 1);
        assert_eq!(ray_crossings(Coord::new(15.0, 5.0), &ring), 0);
        assert_eq!(ray_crossings(Coord::new(-5.0, 5.0), &ring), 2);
    }

    #[test]
    fn test_envelope_intersects() {
        let a = Envelope::new(0.0, 0.0, 5.0, 5.0);
        assert!(a.intersects(&Envelope::new(5.0, 5.0, 6.0, 6.0)));
        assert!(!a.intersects(&Envelope::new(5.1, 0.0, 6.0, 1.0)));
    }
}
