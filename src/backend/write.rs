//! Write operations: insert, update, delete, identifier allocation

use bitflags::Flags;

use super::{FieldMatch, TopoStore};
use crate::element::{Edge, ElemId};
use crate::fields::EdgeDataMode;
use crate::query::{ElementRecord, SqlText, UpdateMode};
use crate::{Error, Result};

const INSERT_SAVEPOINT: &str = "topostore_insert";

impl<'c> TopoStore<'c> {
    /// Insert every record in one statement and write assigned keys back.
    ///
    /// Rows are only kept, and keys only written back, once the row count
    /// matched; a failed insert leaves neither store nor records changed.
    pub(crate) fn insert_records<R: ElementRecord>(&mut self, records: &mut [R]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(bad) = records.iter().filter_map(|r| r.key()).find(|id| *id < 0) {
            return Err(Error::InvalidInput(format!("cannot insert into {} with negative identifier {}", R::TABLE, bad)));
        }
        let qb = self.builder();
        let all = R::Fields::all();
        let mut sql = SqlText::new(format!(
            "INSERT INTO {} ({}) VALUES ",
            self.table::<R>(),
            qb.render_projection::<R>(all, EdgeDataMode::Full)
        ));
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                sql.push(",");
            }
            qb.render_insert_values(&mut sql, record, all, EdgeDataMode::Full);
        }
        sql.push(&format!(" RETURNING {}", R::KEY));

        let expected = records.len();
        let returned = self.atomically(INSERT_SAVEPOINT, |store| {
            let returned = store.write_returning(&sql, |row| Ok(row.get::<_, ElemId>(0)?))?;
            if returned.len() != expected {
                return Err(Error::Cardinality { processed: returned.len(), expected });
            }
            Ok(returned)
        })?;

        // Rows inserted with a NULL key draw increasing identifiers in VALUES order
        let mut assigned = returned;
        for explicit in records.iter().filter_map(|r| r.key()) {
            if let Some(pos) = assigned.iter().position(|id| *id == explicit) {
                assigned.swap_remove(pos);
            }
        }
        assigned.sort_unstable();
        let mut fresh = assigned.into_iter();
        for record in records.iter_mut().filter(|r| r.key().is_none()) {
            match fresh.next() {
                Some(id) => record.set_key(id),
                None => return Err(Error::Integrity(format!("insert into {} returned too few identifiers", R::TABLE))),
            }
        }
        Ok(())
    }

    /// `UPDATE .. SET upd WHERE sel AND exc`; no selector and no excluder updates every row
    pub(crate) fn update_matching<R: ElementRecord>(
        &mut self,
        sel: Option<FieldMatch<'_, R>>,
        upd: FieldMatch<'_, R>,
        exc: Option<FieldMatch<'_, R>>,
    ) -> Result<usize> {
        if upd.fields.is_empty() {
            return Err(Error::InvalidInput(format!("update of {} called with no update fields", R::TABLE)));
        }
        let qb = self.builder();
        let mut sql = SqlText::new(format!("UPDATE {} SET ", self.table::<R>()));
        qb.render_update_clause(&mut sql, upd.record, upd.fields, EdgeDataMode::Full, UpdateMode::Set);

        let mut has_where = false;
        if let Some(sel) = sel.filter(|m| !m.fields.is_empty()) {
            sql.push(" WHERE ");
            qb.render_update_clause(&mut sql, sel.record, sel.fields, EdgeDataMode::Full, UpdateMode::Match);
            has_where = true;
        }
        if let Some(exc) = exc.filter(|m| !m.fields.is_empty()) {
            sql.push(if has_where { " AND " } else { " WHERE " });
            qb.render_update_clause(&mut sql, exc.record, exc.fields, EdgeDataMode::Full, UpdateMode::Exclude);
        }
        self.execute(&sql)
    }

    /// Update many records at once through a VALUES table joined on the key
    pub(crate) fn update_records_by_id<R: ElementRecord>(&mut self, records: &[R], fields: R::Fields) -> Result<usize> {
        let fields = fields.difference(R::KEY_FIELD);
        if fields.is_empty() {
            return Err(Error::InvalidInput(format!("update of {} by id called with no update fields", R::TABLE)));
        }
        if records.is_empty() {
            return Ok(0);
        }
        if records.iter().any(|r| r.key().is_none()) {
            return Err(Error::InvalidInput(format!("update of {} by id needs every record's identifier", R::TABLE)));
        }

        let qb = self.builder();
        let with_key = fields.union(R::KEY_FIELD);
        let mut sql = SqlText::new(format!(
            "WITH newvals({}) AS (VALUES ",
            qb.render_projection::<R>(with_key, EdgeDataMode::Plain)
        ));
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                sql.push(",");
            }
            qb.render_insert_values(&mut sql, record, with_key, EdgeDataMode::Plain);
        }
        sql.push(&format!(") UPDATE {} AS t SET ", self.table::<R>()));

        let set: Vec<String> = R::default()
            .columns(fields, EdgeDataMode::Full)
            .into_iter()
            .map(|col| match col.shadow_of {
                Some(signed) => format!("{} = abs(o.{})", col.name, signed),
                None => format!("{} = o.{}", col.name, col.name),
            })
            .collect();
        sql.push(&set.join(","));
        sql.push(&format!(" FROM newvals AS o WHERE t.{} = o.{}", R::KEY, R::KEY));
        self.execute(&sql)
    }

    /// Delete edges matching a non-empty selector
    pub(crate) fn delete_matching(&mut self, sel: FieldMatch<'_, Edge>) -> Result<usize> {
        if sel.fields.is_empty() {
            return Err(Error::InvalidInput("delete of edge_data called with no selector fields".to_string()));
        }
        let mut sql = SqlText::new(format!("DELETE FROM {} WHERE ", self.table::<Edge>()));
        self.builder()
            .render_update_clause(&mut sql, sel.record, sel.fields, EdgeDataMode::Plain, UpdateMode::Match);
        self.execute(&sql)
    }

    pub(crate) fn delete_by_id<R: ElementRecord>(&mut self, ids: &[ElemId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut sql = SqlText::new(format!("DELETE FROM {} WHERE {} IN (", self.table::<R>(), R::KEY));
        sql.bind_list(ids).push(")");
        self.execute(&sql)
    }

    /// Consume the next value of the edge identifier counter
    pub(crate) fn allocate_edge_id(&mut self) -> Result<ElemId> {
        let sql = SqlText::new(format!(
            "UPDATE {}.sqlite_sequence SET seq = seq + 1 WHERE name = 'edge_data' RETURNING seq",
            crate::query::quote_ident(&self.topo.name)
        ));
        let ids = self.write_returning(&sql, |row| Ok(row.get::<_, Option<ElemId>>(0)?))?;
        match ids.first() {
            Some(Some(id)) => Ok(*id),
            Some(None) => Err(Error::Integrity("next value for edge_id returned null".to_string())),
            None => Err(Error::Integrity(format!("edge_id counter of topology '{}' is missing", self.topo.name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::backend;
    use super::super::{FieldMatch, TopoStore, TopologyBackend};
    use crate::element::{Edge, Face, Node, UNIVERSE_FACE};
    use crate::fields::{EdgeFields, FaceFields, NodeFields};
    use crate::geometry::{Envelope, LineString, Point};
    use crate::Error;

    fn line(coords: &[(f64, f64)]) -> LineString {
        LineString::from_xy(coords)
    }

    fn two_nodes(store: &mut TopoStore<'_>) {
        let mut nodes = vec![
            Node::new(Point::new(0.0, 0.0)).with_id(1),
            Node::new(Point::new(10.0, 0.0)).with_id(2),
        ];
        store.insert_nodes(&mut nodes).unwrap();
    }

    #[test]
    fn test_insert_assigns_identifiers() {
        let (backend, topo) = backend();
        let mut store = TopoStore::new(backend.connection(), topo);
        let mut nodes = vec![
            Node::new(Point::new(0.0, 0.0)),
            Node::new(Point::new(1.0, 0.0)).with_id(10),
            Node::new(Point::new(2.0, 0.0)),
        ];
        store.insert_nodes(&mut nodes).unwrap();

        assert_eq!(nodes[1].node_id, Some(10));
        let a = nodes[0].node_id.unwrap();
        let b = nodes[2].node_id.unwrap();
        assert!(a > 0 && b > a);
        assert_ne!(a, 10);
        assert_ne!(b, 10);

        let stored = store.get_nodes_by_id(&[b], NodeFields::all()).unwrap();
        assert_eq!(stored[0].geom, Some(Point::new(2.0, 0.0)));
    }

    #[test]
    fn test_failed_insert_leaves_records_unassigned() {
        let (backend, topo) = backend();
        let mut store = TopoStore::new(backend.connection(), topo);
        let mut nodes = vec![Node::new(Point::new(0.0, 0.0)).with_id(1)];
        store.insert_nodes(&mut nodes).unwrap();

        // Duplicate key makes the whole statement fail
        let mut batch = vec![Node::new(Point::new(5.0, 5.0)), Node::new(Point::new(6.0, 6.0)).with_id(1)];
        let err = store.insert_nodes(&mut batch).unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));
        assert_eq!(batch[0].node_id, None);
        assert!(store.last_error_message().unwrap().contains("INSERT INTO"));
    }

    #[test]
    fn test_short_insert_is_rolled_back() {
        let (backend, topo) = backend();
        backend
            .connection()
            .execute_batch(
                r#"CREATE TRIGGER "tp".skip_universe_nodes BEFORE INSERT ON node
                   WHEN NEW.containing_face = 0 BEGIN SELECT RAISE(IGNORE); END"#,
            )
            .unwrap();
        let mut store = TopoStore::new(backend.connection(), topo);

        let mut batch = vec![Node::new(Point::new(0.0, 0.0)), Node::new(Point::new(1.0, 0.0)).isolated_in(UNIVERSE_FACE)];
        let err = store.insert_nodes(&mut batch).unwrap_err();
        assert!(matches!(err, Error::Cardinality { processed: 1, expected: 2 }));
        assert!(batch.iter().all(|n| n.node_id.is_none()));

        let stored: i64 = backend
            .connection()
            .query_row(r#"SELECT count(*) FROM "tp".node"#, [], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, 0);
    }

    #[test]
    fn test_insert_rejects_negative_identifier() {
        let (backend, topo) = backend();
        let mut store = TopoStore::new(backend.connection(), topo);
        let mut nodes = vec![Node::new(Point::new(0.0, 0.0)), Node::new(Point::new(1.0, 0.0)).with_id(-1)];
        let err = store.insert_nodes(&mut nodes).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(nodes[0].node_id.is_none());
        assert!(store.get_nodes_by_id(&[-1], NodeFields::all()).unwrap().is_empty());
    }

    #[test]
    fn test_insert_edges_fills_shadow_columns() {
        let (backend, topo) = backend();
        let mut store = TopoStore::new(backend.connection(), topo);
        two_nodes(&mut store);
        let mut edges = vec![Edge::new(1, 2, line(&[(0.0, 0.0), (10.0, 0.0)])).with_faces(0, 0).with_next(-7, 7)];
        store.insert_edges(&mut edges).unwrap();
        let id = edges[0].edge_id.unwrap();

        let (abs_left, abs_right): (i64, i64) = backend
            .connection()
            .query_row(
                "SELECT abs_next_left_edge, abs_next_right_edge FROM \"tp\".edge_data WHERE edge_id = ?1",
                [id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((abs_left, abs_right), (7, 7));
    }

    #[test]
    fn test_next_edge_id_is_consumed() {
        let (backend, topo) = backend();
        let mut store = TopoStore::new(backend.connection(), topo);
        two_nodes(&mut store);
        let first = store.next_edge_id().unwrap();
        let second = store.next_edge_id().unwrap();
        assert_eq!(second, first + 1);

        let mut edges = vec![Edge::new(1, 2, line(&[(0.0, 0.0), (10.0, 0.0)])).with_faces(0, 0).with_next(1, -1)];
        store.insert_edges(&mut edges).unwrap();
        assert!(edges[0].edge_id.unwrap() > second);
    }

    #[test]
    fn test_update_with_selector_and_excluder() {
        let (backend, topo) = backend();
        let mut store = TopoStore::new(backend.connection(), topo);
        let mut faces = vec![Face::new(Envelope::new(0.0, 0.0, 1.0, 1.0))];
        store.insert_faces(&mut faces).unwrap();
        let face = faces[0].face_id.unwrap();

        let mut nodes = vec![
            Node::new(Point::new(0.0, 0.0)).isolated_in(face),
            Node::new(Point::new(1.0, 0.0)).isolated_in(face),
            Node::new(Point::new(2.0, 0.0)),
        ];
        store.insert_nodes(&mut nodes).unwrap();

        let sel = Node::default().isolated_in(face);
        let upd = Node::default().isolated_in(UNIVERSE_FACE);
        let exc = Node::default().with_id(nodes[0].node_id.unwrap());
        let n = store
            .update_nodes(
                Some(FieldMatch::new(&sel, NodeFields::CONTAINING_FACE)),
                FieldMatch::new(&upd, NodeFields::CONTAINING_FACE),
                Some(FieldMatch::new(&exc, NodeFields::NODE_ID)),
            )
            .unwrap();
        assert_eq!(n, 1);
        let moved = store.get_nodes_by_id(&[nodes[1].node_id.unwrap()], NodeFields::CONTAINING_FACE).unwrap();
        assert_eq!(moved[0].containing_face, Some(UNIVERSE_FACE));
    }

    #[test]
    fn test_excluder_keeps_rows_holding_null() {
        let (backend, topo) = backend();
        let mut store = TopoStore::new(backend.connection(), topo);
        let mut nodes = vec![
            Node::new(Point::new(0.0, 0.0)),
            Node::new(Point::new(1.0, 0.0)).isolated_in(UNIVERSE_FACE),
        ];
        store.insert_nodes(&mut nodes).unwrap();

        let upd = Node { geom: Some(Point::new(5.0, 5.0)), ..Node::default() };
        let exc = Node::default().isolated_in(5);
        let n = store
            .update_nodes(
                None,
                FieldMatch::new(&upd, NodeFields::GEOM),
                Some(FieldMatch::new(&exc, NodeFields::CONTAINING_FACE)),
            )
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn test_update_without_selector_touches_every_row() {
        let (backend, topo) = backend();
        let mut store = TopoStore::new(backend.connection(), topo);
        let mut nodes = vec![
            Node::new(Point::new(0.0, 0.0)),
            Node::new(Point::new(1.0, 0.0)).isolated_in(UNIVERSE_FACE),
            Node::new(Point::new(2.0, 0.0)),
        ];
        store.insert_nodes(&mut nodes).unwrap();

        let upd = Node::default().isolated_in(UNIVERSE_FACE);
        let empty = Node::default();
        let n = store
            .update_nodes(
                Some(FieldMatch::new(&empty, NodeFields::empty())),
                FieldMatch::new(&upd, NodeFields::CONTAINING_FACE),
                None,
            )
            .unwrap();
        assert_eq!(n, 3);

        let err = store.update_nodes(None, FieldMatch::new(&upd, NodeFields::empty()), None).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_update_edges_matches_on_signed_and_shadow_columns() {
        let (backend, topo) = backend();
        let mut store = TopoStore::new(backend.connection(), topo);
        two_nodes(&mut store);
        let mut edges = vec![
            Edge::new(1, 2, line(&[(0.0, 0.0), (10.0, 0.0)])).with_id(1).with_faces(0, 0).with_next(-1, 1),
            Edge::new(2, 1, line(&[(10.0, 0.0), (0.0, 0.0)])).with_id(2).with_faces(0, 0).with_next(2, -2),
        ];
        store.insert_edges(&mut edges).unwrap();

        let sel = Edge::default().with_next(-1, 0);
        let upd = Edge::default().with_next(-5, 0);
        let n = store
            .update_edges(
                Some(FieldMatch::new(&sel, EdgeFields::NEXT_LEFT)),
                FieldMatch::new(&upd, EdgeFields::NEXT_LEFT),
                None,
            )
            .unwrap();
        assert_eq!(n, 1);

        let abs: i64 = backend
            .connection()
            .query_row("SELECT abs_next_left_edge FROM \"tp\".edge_data WHERE edge_id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(abs, 5);
    }

    #[test]
    fn test_update_by_id() {
        let (backend, topo) = backend();
        let mut store = TopoStore::new(backend.connection(), topo);
        two_nodes(&mut store);
        let mut edges = vec![
            Edge::new(1, 2, line(&[(0.0, 0.0), (10.0, 0.0)])).with_faces(0, 0).with_next(1, -1),
            Edge::new(2, 1, line(&[(10.0, 0.0), (5.0, 5.0), (0.0, 0.0)])).with_faces(0, 0).with_next(2, -2),
        ];
        store.insert_edges(&mut edges).unwrap();

        let patched: Vec<Edge> = edges
            .iter()
            .map(|e| {
                let mut p = e.clone();
                p.next_right = -e.next_right * 3;
                p.geom = Some(line(&[(0.0, 0.0), (5.0, -5.0), (10.0, 0.0)]));
                p
            })
            .collect();
        let n = store.update_edges_by_id(&patched, EdgeFields::NEXT_RIGHT).unwrap();
        assert_eq!(n, 2);

        let ids: Vec<_> = edges.iter().filter_map(|e| e.edge_id).collect();
        let stored = store.get_edges_by_id(&ids, EdgeFields::all()).unwrap();
        for edge in stored {
            let original = edges.iter().find(|e| e.edge_id == edge.edge_id).unwrap();
            assert_eq!(edge.next_right, -original.next_right * 3);
            // Fields outside the update set are untouched
            assert_eq!(edge.geom, original.geom);
        }

        let err = store.update_edges_by_id(&[Edge::default()], EdgeFields::GEOM).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        let err = store.update_edges_by_id(&patched, EdgeFields::EDGE_ID).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_update_faces_by_id() {
        let (backend, topo) = backend();
        let mut store = TopoStore::new(backend.connection(), topo);
        let mut faces = vec![Face::new(Envelope::new(0.0, 0.0, 1.0, 1.0))];
        store.insert_faces(&mut faces).unwrap();

        let grown = Face::new(Envelope::new(-1.0, -1.0, 3.0, 3.0)).with_id(faces[0].face_id.unwrap());
        assert_eq!(store.update_faces_by_id(&[grown.clone()], FaceFields::MBR).unwrap(), 1);
        let stored = store.get_faces_by_id(&[grown.face_id.unwrap()], FaceFields::all()).unwrap();
        assert_eq!(stored, vec![grown]);
    }

    #[test]
    fn test_delete_edges_and_faces() {
        let (backend, topo) = backend();
        let mut store = TopoStore::new(backend.connection(), topo);
        two_nodes(&mut store);
        let mut edges = vec![
            Edge::new(1, 2, line(&[(0.0, 0.0), (10.0, 0.0)])).with_faces(0, 0).with_next(1, -1),
            Edge::new(2, 1, line(&[(10.0, 0.0), (0.0, 0.0)])).with_faces(0, 0).with_next(2, -2),
        ];
        store.insert_edges(&mut edges).unwrap();

        let sel = Edge::default().with_id(edges[0].edge_id.unwrap());
        assert_eq!(store.delete_edges(FieldMatch::new(&sel, EdgeFields::EDGE_ID)).unwrap(), 1);
        let empty = Edge::default();
        assert!(store.delete_edges(FieldMatch::new(&empty, EdgeFields::empty())).is_err());
        assert_eq!(store.get_edges_by_node(&[1], EdgeFields::EDGE_ID).unwrap().len(), 1);

        let mut faces = vec![Face::new(Envelope::new(0.0, 0.0, 1.0, 1.0)), Face::new(Envelope::new(2.0, 2.0, 3.0, 3.0))];
        store.insert_faces(&mut faces).unwrap();
        let ids: Vec<_> = faces.iter().filter_map(|f| f.face_id).collect();
        assert_eq!(store.delete_faces_by_id(&ids).unwrap(), 2);
        assert_eq!(store.delete_faces_by_id(&[]).unwrap(), 0);
        assert!(store.get_faces_by_id(&ids, FaceFields::all()).unwrap().is_empty());
    }
}
