use crate::utils::error::Result;
use crate::utils::geometry::{Point3, Shape};

/// Emit every vertex of `shape` depth-first, members in order.
///
/// Polygons emit the exterior ring then each hole. Traversal uses an explicit
/// work list so nesting depth is bounded by memory, not the call stack.
pub fn flatten_shape<F>(shape: &Shape, mut emit: F) -> Result<()>
where
    F: FnMut(Point3) -> Result<()>,
{
    let mut pending: Vec<&Shape> = vec![shape];
    while let Some(current) = pending.pop() {
        match current {
            Shape::Point(point) => emit(*point)?,
            Shape::Line(vertices) => {
                for vertex in vertices {
                    emit(*vertex)?;
                }
            }
            Shape::Polygon(rings) => {
                for vertex in rings.iter().flatten() {
                    emit(*vertex)?;
                }
            }
            Shape::Collection(members) => pending.extend(members.iter().rev()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::Value;

    fn collect(shape: &Shape) -> Vec<Point3> {
        let mut points = Vec::new();
        flatten_shape(shape, |p| {
            points.push(p);
            Ok(())
        })
        .unwrap();
        points
    }

    fn p(x: f64) -> Point3 {
        Point3::new(x, x, x)
    }

    #[test]
    fn test_single_point() {
        assert_eq!(collect(&Shape::Point(p(1.0))), vec![p(1.0)]);
    }

    #[test]
    fn test_line_in_order() {
        let line = Shape::Line(vec![p(1.0), p(2.0), p(3.0)]);
        assert_eq!(collect(&line), vec![p(1.0), p(2.0), p(3.0)]);
    }

    #[test]
    fn test_polygon_exterior_then_holes() {
        let polygon = Shape::Polygon(vec![
            vec![p(0.0), p(1.0), p(0.0)],
            vec![p(0.2), p(0.3)],
            vec![p(0.5)],
        ]);
        assert_eq!(
            collect(&polygon),
            vec![p(0.0), p(1.0), p(0.0), p(0.2), p(0.3), p(0.5)]
        );
    }

    #[test]
    fn test_nested_collection_depth_first() {
        let shape = Shape::Collection(vec![
            Shape::Point(p(1.0)),
            Shape::Collection(vec![
                Shape::Line(vec![p(2.0), p(3.0)]),
                Shape::Collection(vec![Shape::Point(p(4.0))]),
            ]),
            Shape::Polygon(vec![vec![p(5.0)]]),
        ]);
        assert_eq!(
            collect(&shape),
            vec![p(1.0), p(2.0), p(3.0), p(4.0), p(5.0)]
        );
    }

    #[test]
    fn test_empty_geometries_emit_nothing() {
        assert!(collect(&Shape::Collection(vec![])).is_empty());
        assert!(collect(&Shape::Line(vec![])).is_empty());
        assert!(collect(&Shape::Polygon(vec![vec![], vec![]])).is_empty());
    }

    #[test]
    fn test_duplicates_are_kept() {
        let shape = Shape::Collection(vec![Shape::Point(p(1.0)), Shape::Point(p(1.0))]);
        assert_eq!(collect(&shape), vec![p(1.0), p(1.0)]);
    }

    #[test]
    fn test_deep_nesting() {
        let mut shape = Shape::Point(p(7.0));
        for _ in 0..10_000 {
            shape = Shape::Collection(vec![shape]);
        }
        assert_eq!(collect(&shape), vec![p(7.0)]);
        // Dismantle iteratively; the derived Drop would recurse
        let mut current = shape;
        while let Shape::Collection(mut members) = current {
            match members.pop() {
                Some(inner) => current = inner,
                None => break,
            }
        }
    }

    #[test]
    fn test_multipolygon_from_geojson() {
        let value = Value::MultiPolygon(vec![
            vec![vec![vec![0.0, 0.0, 1.0], vec![1.0, 0.0, 1.0], vec![0.0, 0.0, 1.0]]],
            vec![
                vec![vec![5.0, 5.0, 2.0], vec![6.0, 5.0, 2.0]],
                vec![vec![5.5, 5.5, 3.0]],
            ],
        ]);
        let points = collect(&Shape::from(&value));
        assert_eq!(points.len(), 6);
        assert_eq!(points[3], Point3::new(5.0, 5.0, 2.0));
        assert_eq!(points[5], Point3::new(5.5, 5.5, 3.0));
    }
}
