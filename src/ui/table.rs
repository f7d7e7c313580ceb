use tabled::{settings::Style, Table, Tabled};

use crate::element::Edge;
use crate::storage::{Layer, TopologyStats};
use crate::topology::Topology;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn stats_table(stats: &TopologyStats) -> String {
    let mut builder = TableBuilder::new();
    builder.add_row("Nodes", &stats.nodes.to_string());
    builder.add_row("Edges", &stats.edges.to_string());
    builder.add_row("Faces", &stats.faces.to_string());
    builder.add_row("Relations", &stats.relations.to_string());
    builder.add_row("Layers", &stats.layers.to_string());
    builder.build()
}

#[derive(Tabled)]
struct TopologyRow {
    #[tabled(rename = "Id")]
    id: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "SRID")]
    srid: i32,
    #[tabled(rename = "Precision")]
    precision: f64,
}

pub fn topology_table(topologies: &[Topology]) -> String {
    let rows: Vec<TopologyRow> = topologies
        .iter()
        .map(|t| TopologyRow { id: t.id, name: t.name.clone(), srid: t.srid, precision: t.precision })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct LayerRow {
    #[tabled(rename = "Layer")]
    layer_id: i64,
    #[tabled(rename = "Feature table")]
    table: String,
    #[tabled(rename = "Type")]
    feature_type: i64,
    #[tabled(rename = "Level")]
    level: i64,
}

pub fn layer_table(layers: &[Layer]) -> String {
    let rows: Vec<LayerRow> = layers
        .iter()
        .map(|l| LayerRow {
            layer_id: l.layer_id,
            table: format!("{}.{}.{}", l.schema_name, l.table_name, l.feature_column),
            feature_type: l.feature_type,
            level: l.level,
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct EdgeRow {
    #[tabled(rename = "Edge")]
    edge_id: String,
    #[tabled(rename = "Start")]
    start_node: i64,
    #[tabled(rename = "End")]
    end_node: i64,
    #[tabled(rename = "Left face")]
    face_left: String,
    #[tabled(rename = "Right face")]
    face_right: String,
    #[tabled(rename = "Next left")]
    next_left: i64,
    #[tabled(rename = "Next right")]
    next_right: i64,
}

fn id_cell(id: Option<i64>) -> String {
    id.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn edge_table(edges: &[Edge]) -> String {
    let rows: Vec<EdgeRow> = edges
        .iter()
        .map(|e| EdgeRow {
            edge_id: id_cell(e.edge_id),
            start_node: e.start_node,
            end_node: e.end_node,
            face_left: id_cell(e.face_left),
            face_right: id_cell(e.face_right),
            next_left: e.next_left,
            next_right: e.next_right,
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_builder_renders_nothing() {
        assert!(TableBuilder::new().build().is_empty());
    }

    #[test]
    fn test_edge_table_marks_missing_faces() {
        let edge = Edge { edge_id: Some(3), start_node: 1, end_node: 2, next_left: -3, next_right: 3, ..Edge::default() };
        let table = edge_table(&[edge]);
        assert!(table.contains("Next left"));
        assert!(table.contains(" - "));
    }
}
