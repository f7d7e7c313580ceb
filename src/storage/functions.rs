//! Spatial SQL functions registered on every connection
//!
//! Geometries travel through SQL as hex EWKB text. All functions are
//! deterministic and return NULL when a geometry argument is NULL.

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::Connection;

use crate::geometry::{ray_crossings, Envelope, Geometry};
use crate::Result;

fn flags() -> FunctionFlags {
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC
}

fn geometry_arg(ctx: &Context<'_>, idx: usize) -> rusqlite::Result<Option<Geometry>> {
    let text: Option<String> = ctx.get(idx)?;
    text.map(|t| Geometry::from_hex_ewkb(&t))
        .transpose()
        .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))
}

fn geometry_pair(ctx: &Context<'_>) -> rusqlite::Result<Option<(Geometry, Geometry)>> {
    Ok(geometry_arg(ctx, 0)?.zip(geometry_arg(ctx, 1)?))
}

/// Register the spatial functions used by the store's queries
pub fn register(conn: &Connection) -> Result<()> {
    // ST_DWithin(a, b, distance)
    conn.create_scalar_function("ST_DWithin", 3, flags(), |ctx| {
        let dist: f64 = ctx.get(2)?;
        Ok(geometry_pair(ctx)?.map(|(a, b)| a.distance(&b) <= dist))
    })?;

    // ST_Within(a, b): a lies inside b, boundary excluded
    conn.create_scalar_function("ST_Within", 2, flags(), |ctx| {
        geometry_pair(ctx)?
            .map(|(a, b)| a.within(&b))
            .transpose()
            .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))
    })?;

    // ST_Intersects(a, b)
    conn.create_scalar_function("ST_Intersects", 2, flags(), |ctx| {
        Ok(geometry_pair(ctx)?.map(|(a, b)| a.intersects(&b)))
    })?;

    // ST_BBoxIntersects(a, b): bounding boxes overlap
    conn.create_scalar_function("ST_BBoxIntersects", 2, flags(), |ctx| {
        Ok(geometry_pair(ctx)?.map(|(a, b)| match (a.envelope(), b.envelope()) {
            (Some(ea), Some(eb)) => ea.intersects(&eb),
            _ => false,
        }))
    })?;

    // ST_MakeEnvelope(xmin, ymin, xmax, ymax, srid)
    conn.create_scalar_function("ST_MakeEnvelope", 5, flags(), |ctx| {
        let env = Envelope::new(ctx.get(0)?, ctx.get(1)?, ctx.get(2)?, ctx.get(3)?);
        let srid: i32 = ctx.get(4)?;
        Ok(Geometry::Polygon(env.to_polygon(srid)).to_hex_ewkb())
    })?;

    // ST_RayCrossings(line, point): crossings of a +x ray from point with line
    conn.create_scalar_function("ST_RayCrossings", 2, flags(), |ctx| {
        let Some((line, point)) = geometry_pair(ctx)? else {
            return Ok(None);
        };
        match (line, point) {
            (Geometry::LineString(l), Geometry::Point(p)) => Ok(Some(i64::from(ray_crossings(p.coord(), &l.points)))),
            (a, b) => Err(rusqlite::Error::UserFunctionError(
                format!("ST_RayCrossings({}, {}) is not supported", a.type_name(), b.type_name()).into(),
            )),
        }
    })?;

    Ok(())
}
