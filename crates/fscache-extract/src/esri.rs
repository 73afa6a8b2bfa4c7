//! Esri JSON geometry to GeoJSON geometry
//!
//! Used when window queries request `f=json`. Esri polygons list outer rings
//! clockwise and holes counter-clockwise without grouping them; GeoJSON wants
//! each polygon's exterior first, counter-clockwise, followed by its holes.

use serde_json::{json, Map, Value};

type Ring = Vec<Value>;

/// Convert an Esri geometry object. Returns `None` for null, empty or
/// unrecognized geometries.
pub fn to_geojson_geometry(geometry: &Value) -> Option<Value> {
    let obj = geometry.as_object()?;

    if obj.contains_key("x") {
        return point(obj);
    }
    if let Some(points) = obj.get("points").and_then(Value::as_array) {
        let coords = coordinate_list(points);
        if coords.is_empty() {
            return None;
        }
        return Some(json!({ "type": "MultiPoint", "coordinates": coords }));
    }
    if let Some(paths) = obj.get("paths").and_then(Value::as_array) {
        let mut lines: Vec<Ring> = paths
            .iter()
            .filter_map(Value::as_array)
            .map(|p| coordinate_list(p))
            .filter(|p| p.len() >= 2)
            .collect();
        return match lines.len() {
            0 => None,
            1 => Some(json!({ "type": "LineString", "coordinates": lines.remove(0) })),
            _ => Some(json!({ "type": "MultiLineString", "coordinates": lines })),
        };
    }
    if let Some(rings) = obj.get("rings").and_then(Value::as_array) {
        let rings: Vec<Ring> = rings
            .iter()
            .filter_map(Value::as_array)
            .map(|r| coordinate_list(r))
            .filter(|r| r.len() >= 4)
            .collect();
        return polygon(rings);
    }
    if obj.contains_key("xmin") {
        return envelope(obj);
    }
    None
}

fn point(obj: &Map<String, Value>) -> Option<Value> {
    let x = obj.get("x").and_then(Value::as_f64)?;
    let y = obj.get("y").and_then(Value::as_f64)?;
    let mut coords = vec![json!(x), json!(y)];
    if let Some(z) = obj.get("z").and_then(Value::as_f64) {
        coords.push(json!(z));
    }
    Some(json!({ "type": "Point", "coordinates": coords }))
}

fn envelope(obj: &Map<String, Value>) -> Option<Value> {
    let get = |key: &str| obj.get(key).and_then(Value::as_f64);
    let (xmin, ymin, xmax, ymax) = (get("xmin")?, get("ymin")?, get("xmax")?, get("ymax")?);
    Some(json!({
        "type": "Polygon",
        "coordinates": [[[xmin, ymin], [xmax, ymin], [xmax, ymax], [xmin, ymax], [xmin, ymin]]]
    }))
}

/// Keep positions with at least two numeric ordinates
fn coordinate_list(values: &[Value]) -> Ring {
    values
        .iter()
        .filter(|v| xy(v).is_some())
        .cloned()
        .collect()
}

fn xy(position: &Value) -> Option<(f64, f64)> {
    let arr = position.as_array()?;
    Some((arr.first()?.as_f64()?, arr.get(1)?.as_f64()?))
}

/// Twice the signed area; negative for clockwise rings
fn signed_area(ring: &[Value]) -> f64 {
    let points: Vec<(f64, f64)> = ring.iter().filter_map(xy).collect();
    points
        .windows(2)
        .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
        .sum()
}

/// Ray casting test of `point` against a closed ring
fn contains(ring: &[Value], point: (f64, f64)) -> bool {
    let points: Vec<(f64, f64)> = ring.iter().filter_map(xy).collect();
    let (px, py) = point;
    let mut inside = false;
    for w in points.windows(2) {
        let ((x1, y1), (x2, y2)) = (w[0], w[1]);
        if (y1 > py) != (y2 > py) && px < (x2 - x1) * (py - y1) / (y2 - y1) + x1 {
            inside = !inside;
        }
    }
    inside
}

fn polygon(rings: Vec<Ring>) -> Option<Value> {
    let mut polygons: Vec<Vec<Ring>> = Vec::new();
    let mut holes: Vec<Ring> = Vec::new();

    for mut ring in rings {
        if signed_area(&ring) < 0.0 {
            ring.reverse();
            polygons.push(vec![ring]);
        } else {
            holes.push(ring);
        }
    }

    for mut hole in holes {
        let probe = hole.first().and_then(xy);
        let owner = probe.and_then(|p| polygons.iter().position(|poly| contains(&poly[0], p)));
        match owner {
            Some(index) => {
                hole.reverse();
                polygons[index].push(hole);
            },
            // counter-clockwise ring outside every exterior: its own polygon
            None => polygons.push(vec![hole]),
        }
    }

    match polygons.len() {
        0 => None,
        1 => Some(json!({ "type": "Polygon", "coordinates": polygons.remove(0) })),
        _ => Some(json!({ "type": "MultiPolygon", "coordinates": polygons })),
    }
}
