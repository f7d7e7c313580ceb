//! Read operations: by identifier, by adjacency, spatial, ring traversal

use super::{FetchLimit, Fetched, TopoStore};
use crate::element::{Edge, ElemId, Face, Node};
use crate::fields::EdgeDataMode;
use crate::geometry::{Envelope, Geometry, Point};
use crate::query::{FromRow, SqlText};
use crate::{Error, Result};

/// Spatial predicates differ per element kind
pub(crate) trait SpatialRecord: FromRow {
    /// Append the within-distance predicate for `dist > 0`, or the
    /// containment predicate for `dist == 0`
    fn push_distance_predicate(store: &TopoStore<'_>, sql: &mut SqlText, pt: &Point, dist: f64);
}

impl SpatialRecord for Node {
    fn push_distance_predicate(store: &TopoStore<'_>, sql: &mut SqlText, pt: &Point, dist: f64) {
        let qb = store.builder();
        if dist > 0.0 {
            sql.push("ST_DWithin(geom, ");
            qb.push_geometry(sql, Geometry::Point(*pt));
            sql.push(", ").bind(dist).push(")");
        } else {
            sql.push("ST_Within(geom, ");
            qb.push_geometry(sql, Geometry::Point(*pt));
            sql.push(")");
        }
    }
}

impl SpatialRecord for Edge {
    fn push_distance_predicate(store: &TopoStore<'_>, sql: &mut SqlText, pt: &Point, dist: f64) {
        let qb = store.builder();
        if dist > 0.0 {
            sql.push("ST_DWithin(");
            qb.push_geometry(sql, Geometry::Point(*pt));
            sql.push(", geom, ").bind(dist).push(")");
        } else {
            sql.push("ST_Within(");
            qb.push_geometry(sql, Geometry::Point(*pt));
            sql.push(", geom)");
        }
    }
}

impl<'c> TopoStore<'c> {
    /// Projection list for a read, `1` when no field is requested
    fn projection<R: FromRow>(&self, fields: R::Fields) -> String {
        let proj = self.builder().render_projection::<R>(fields, EdgeDataMode::Plain);
        if proj.is_empty() {
            tracing::warn!("fetch from {} invoked with no fields", R::TABLE);
            "1".to_string()
        } else {
            proj
        }
    }

    /// Rows whose value in any of `columns` is one of `ids`
    pub(crate) fn fetch_by_column<R: FromRow>(&self, columns: &[&str], ids: &[ElemId], fields: R::Fields) -> Result<Vec<R>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut sql = SqlText::new(format!("SELECT {} FROM {} WHERE ", self.projection::<R>(fields), self.table::<R>()));
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                sql.push(" OR ");
            }
            sql.push(column).push(" IN (").bind_list(ids).push(")");
        }
        self.fetch_rows(&sql, |row| R::decode(row, fields, EdgeDataMode::Plain))
    }

    pub(crate) fn fetch_within_distance<R: SpatialRecord>(
        &self,
        pt: &Point,
        dist: f64,
        fields: R::Fields,
        limit: FetchLimit,
    ) -> Result<Fetched<R>> {
        if dist.is_nan() || dist < 0.0 {
            return Err(Error::InvalidInput(format!("distance must be non-negative, got {}", dist)));
        }
        let mut sql = self.limited_select::<R>(fields, limit);
        R::push_distance_predicate(self, &mut sql, pt, dist);
        self.finish_limited(sql, fields, limit)
    }

    pub(crate) fn fetch_within_box<R: FromRow>(&self, bbox: &Envelope, fields: R::Fields, limit: FetchLimit) -> Result<Fetched<R>> {
        let mut sql = self.limited_select::<R>(fields, limit);
        sql.push("ST_BBoxIntersects(geom, ");
        self.builder().push_envelope(&mut sql, bbox);
        sql.push(")");
        self.finish_limited(sql, fields, limit)
    }

    fn limited_select<R: FromRow>(&self, fields: R::Fields, limit: FetchLimit) -> SqlText {
        match limit {
            FetchLimit::ExistsOnly => SqlText::new(format!("SELECT EXISTS (SELECT 1 FROM {} WHERE ", self.table::<R>())),
            _ => SqlText::new(format!("SELECT {} FROM {} WHERE ", self.projection::<R>(fields), self.table::<R>())),
        }
    }

    fn finish_limited<R: FromRow>(&self, mut sql: SqlText, fields: R::Fields, limit: FetchLimit) -> Result<Fetched<R>> {
        match limit {
            FetchLimit::ExistsOnly => {
                sql.push(")");
                let found = self.fetch_rows(&sql, |row| Ok(row.get::<_, bool>(0)?))?;
                Ok(Fetched::Exists(found.first().copied().unwrap_or(false)))
            }
            FetchLimit::First(n) if n > 0 => {
                sql.push(" LIMIT ").bind(n as i64);
                Ok(Fetched::Rows(self.fetch_rows(&sql, |row| R::decode(row, fields, EdgeDataMode::Plain))?))
            }
            _ => Ok(Fetched::Rows(self.fetch_rows(&sql, |row| R::decode(row, fields, EdgeDataMode::Plain))?)),
        }
    }

    /// Follow next-left (positive) or next-right (negative) links from `start`
    pub(crate) fn fetch_ring(&self, start: ElemId, limit: Option<usize>) -> Result<Vec<ElemId>> {
        if start == 0 {
            return Err(Error::InvalidInput("ring traversal needs a non-zero signed edge".to_string()));
        }
        // A zero limit means no limit
        let limit = limit.filter(|n| *n > 0);
        let edges = self.table::<Edge>();
        let mut sql = SqlText::new("WITH RECURSIVE edgering(signed_edge_id, next_id, depth) AS (SELECT ");
        sql.bind(start);
        sql.push(", CASE WHEN ").bind(start).push(" < 0 THEN next_right_edge ELSE next_left_edge END, 1");
        sql.push(&format!(" FROM {} WHERE edge_id = ", edges)).bind(start.abs());
        sql.push(" UNION ALL SELECT p.next_id, CASE WHEN p.next_id < 0 THEN e.next_right_edge ELSE e.next_left_edge END, p.depth + 1");
        sql.push(&format!(" FROM edgering p JOIN {} e ON e.edge_id = abs(p.next_id)", edges));
        sql.push(" WHERE p.next_id <> ").bind(start);
        // Every edge side is visited at most once in a well-formed ring
        sql.push(&format!(" AND p.depth <= (SELECT 2 * count(*) FROM {})", edges));
        sql.push(") SELECT signed_edge_id, next_id FROM edgering ORDER BY depth");
        if let Some(limit) = limit {
            sql.push(" LIMIT ").bind(limit as i64 + 1);
        }

        let rows = self.fetch_rows(&sql, |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<i64>>(1)?)))?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(limit) = limit {
            if rows.len() > limit {
                return Err(Error::LimitExceeded(limit));
            }
        }

        let mut ring = Vec::with_capacity(rows.len());
        for (signed, _) in &rows {
            match signed {
                Some(id) => ring.push(*id),
                None => return Err(Error::Integrity("Found edge with NULL edge_id".to_string())),
            }
        }
        match rows.last() {
            Some((_, Some(next))) if *next == start => Ok(ring),
            _ => Err(Error::Integrity(format!("ring of edge {} does not close", start))),
        }
    }

    /// Face whose interior holds `pt`
    ///
    /// A point is inside a face when a ray cast from it crosses the face's
    /// boundary an odd number of times and it lies on none of those edges.
    pub(crate) fn fetch_containing_face(&self, pt: &Point) -> Result<Option<ElemId>> {
        let faces = self.table::<Face>();
        let edges = self.table::<Edge>();
        let qb = self.builder();
        let point = Geometry::Point(*pt);

        let mut sql = SqlText::new(format!(
            "SELECT f.face_id FROM {} f WHERE f.face_id <> 0 AND f.mbr IS NOT NULL AND ST_BBoxIntersects(f.mbr, ",
            faces
        ));
        qb.push_geometry(&mut sql, point.clone());
        sql.push(") AND (SELECT sum(ST_RayCrossings(e.geom, ");
        qb.push_geometry(&mut sql, point.clone());
        sql.push(&format!(
            ")) FROM {} e WHERE (e.left_face = f.face_id) <> (e.right_face = f.face_id)) % 2 = 1",
            edges
        ));
        sql.push(&format!(
            " AND NOT EXISTS (SELECT 1 FROM {} e WHERE (e.left_face = f.face_id) <> (e.right_face = f.face_id) AND ST_Intersects(e.geom, ",
            edges
        ));
        qb.push_geometry(&mut sql, point);
        sql.push(")) LIMIT 1");

        let rows = self.fetch_rows(&sql, |row| Ok(row.get::<_, Option<i64>>(0)?))?;
        match rows.first() {
            None => Ok(None),
            Some(Some(face_id)) => Ok(Some(*face_id)),
            Some(None) => Err(Error::Integrity("face with NULL face_id".to_string())),
        }
    }
}
