//! Handle on one registered topology

use crate::geometry::Srid;
use crate::query::quote_ident;
use serde::Serialize;

/// A topology as recorded in the registry.
///
/// The topology's tables live in an attached schema carrying its name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Topology {
    pub id: i64,
    pub name: String,
    pub srid: Srid,
    pub precision: f64,
}

impl Topology {
    /// Quoted schema-qualified name of one of this topology's tables
    pub fn table(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.name), quote_ident(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_is_quoted() {
        let topo = Topology { id: 1, name: "my \"topo\"".to_string(), srid: 0, precision: 0.0 };
        assert_eq!(topo.table("edge_data"), "\"my \"\"topo\"\"\".\"edge_data\"");
    }
}
