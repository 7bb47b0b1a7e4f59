//! Chart construction: rows in, serialized Plotly-shaped spec out.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MARKER_COLOR: &str = "#2563eb";
pub const LAYOUT_TEMPLATE: &str = "plotly_white";
pub const DEFAULT_KIND: &str = "bar";
pub const DEFAULT_TITLE: &str = "Chart";

/// Immutable once built; the serialized form is the wire format renderers
/// consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub data: Vec<Series>,
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub x: Vec<Value>,
    pub y: Vec<Value>,
    /// Open set: bar, line, scatter, pie, or whatever the renderer accepts.
    #[serde(rename = "type")]
    pub kind: String,
    pub marker: Marker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub title: String,
    pub xaxis: AxisTitle,
    pub yaxis: AxisTitle,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisTitle {
    pub title: String,
}

/// Soft-fails on empty input. A key missing from a row resolves to null so
/// the x and y arrays stay aligned with the input rows.
pub fn create_plot(data: &[Map<String, Value>], x: &str, y: &str, kind: &str, title: &str) -> String {
    if data.is_empty() {
        return r#"{"error":"no data"}"#.to_string();
    }
    let pick = |key: &str| -> Vec<Value> {
        data.iter()
            .map(|row| row.get(key).cloned().unwrap_or(Value::Null))
            .collect()
    };
    let spec = ChartSpec {
        data: vec![Series {
            x: pick(x),
            y: pick(y),
            kind: kind.to_string(),
            marker: Marker {
                color: MARKER_COLOR.to_string(),
            },
        }],
        layout: Layout {
            title: title.to_string(),
            xaxis: AxisTitle { title: x.to_string() },
            yaxis: AxisTitle { title: y.to_string() },
            template: LAYOUT_TEMPLATE.to_string(),
        },
    };
    serde_json::to_string(&spec).unwrap_or_else(|_| r#"{"error":"no data"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(values: &[(&str, i64)]) -> Vec<Map<String, Value>> {
        values
            .iter()
            .map(|(name, total)| {
                let mut m = Map::new();
                m.insert("name".into(), json!(name));
                m.insert("total".into(), json!(total));
                m
            })
            .collect()
    }

    #[test]
    fn empty_data_soft_fails() {
        assert_eq!(create_plot(&[], "name", "total", "bar", "Chart"), r#"{"error":"no data"}"#);
    }

    #[test]
    fn series_lengths_match_row_count_in_input_order() {
        let data = rows(&[("Widget", 8), ("Gadget", 2), ("Doohickey", 5)]);
        let out = create_plot(&data, "name", "total", "bar", "Sales by product");
        let spec: ChartSpec = serde_json::from_str(&out).unwrap();
        assert_eq!(spec.data.len(), 1);
        assert_eq!(spec.data[0].x.len(), 3);
        assert_eq!(spec.data[0].y.len(), 3);
        assert_eq!(spec.data[0].x[0], json!("Widget"));
        assert_eq!(spec.data[0].y[2], json!(5));
    }

    #[test]
    fn unknown_keys_resolve_to_null_keeping_alignment() {
        let data = rows(&[("Widget", 8), ("Gadget", 2)]);
        let out = create_plot(&data, "name", "missing_column", "bar", "Chart");
        let spec: ChartSpec = serde_json::from_str(&out).unwrap();
        assert_eq!(spec.data[0].y, vec![Value::Null, Value::Null]);
        assert_eq!(spec.data[0].x.len(), 2);
    }

    #[test]
    fn unrecognized_kind_passes_through() {
        let data = rows(&[("Widget", 8)]);
        let out = create_plot(&data, "name", "total", "sunburst", "Chart");
        let spec: ChartSpec = serde_json::from_str(&out).unwrap();
        assert_eq!(spec.data[0].kind, "sunburst");
    }

    #[test]
    fn layout_carries_title_axes_and_constants() {
        let data = rows(&[("Widget", 8)]);
        let out = create_plot(&data, "name", "total", "line", "Totals");
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["layout"]["title"], "Totals");
        assert_eq!(v["layout"]["xaxis"]["title"], "name");
        assert_eq!(v["layout"]["yaxis"]["title"], "total");
        assert_eq!(v["layout"]["template"], LAYOUT_TEMPLATE);
        assert_eq!(v["data"][0]["marker"]["color"], MARKER_COLOR);
    }

    #[test]
    fn spec_roundtrips_through_serialization() {
        let data = rows(&[("Widget", 8), ("Gadget", 2)]);
        let out = create_plot(&data, "name", "total", "scatter", "Roundtrip");
        let spec: ChartSpec = serde_json::from_str(&out).unwrap();
        let again: ChartSpec = serde_json::from_str(&serde_json::to_string(&spec).unwrap()).unwrap();
        assert_eq!(spec, again);
        assert_eq!(again.data[0].x.len(), again.data[0].y.len());
        assert_eq!(again.layout.title, "Roundtrip");
    }
}
