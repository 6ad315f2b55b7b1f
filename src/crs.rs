use geo::algorithm::map_coords::MapCoords;
use geo::{Coord, Geometry};
use log::warn;
use proj::Proj;

use crate::dataset::{Crs, VectorDataset, WGS84};
use crate::error::Result;

/// Bring a geometry collection into WGS84.
///
/// Declared-and-already-WGS84 passes through untouched; a declared foreign
/// CRS is reprojected coordinate by coordinate; an undeclared CRS is assumed
/// to already be WGS84 (logged, not verified) and tagged as such.
pub fn normalize_to_wgs84(
    geometries: Vec<Geometry<f64>>,
    declared: Option<&Crs>,
    context: &str,
) -> Result<Vec<Geometry<f64>>> {
    match declared {
        Some(crs) if crs.is_wgs84() => Ok(geometries),
        Some(crs) => reproject(geometries, crs),
        None => {
            warn!("CRS not defined for {context}. Assuming WGS84.");
            Ok(geometries)
        }
    }
}

/// Normalize a whole vector dataset, re-tagging it as WGS84.
pub fn normalize_dataset(dataset: VectorDataset, context: &str) -> Result<VectorDataset> {
    let VectorDataset { records, crs } = dataset;
    let (mut geometries, attributes): (Vec<_>, Vec<_>) = records
        .into_iter()
        .map(|record| (record.geometry, record.attributes))
        .unzip();
    geometries = normalize_to_wgs84(geometries, crs.as_ref(), context)?;

    let records = geometries
        .into_iter()
        .zip(attributes)
        .map(|(geometry, attributes)| crate::dataset::VectorRecord {
            geometry,
            attributes,
        })
        .collect();
    Ok(VectorDataset {
        records,
        crs: Some(Crs::wgs84()),
    })
}

fn reproject(geometries: Vec<Geometry<f64>>, from: &Crs) -> Result<Vec<Geometry<f64>>> {
    let proj = Proj::new_known_crs(from.as_str(), WGS84, None)?;
    geometries
        .into_iter()
        .map(|geometry| {
            let out = geometry.try_map_coords(|Coord { x, y }| {
                let (x, y) = proj.convert((x, y))?;
                Ok::<_, proj::ProjError>(Coord { x, y })
            })?;
            Ok(out)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    fn points(coords: &[(f64, f64)]) -> Vec<Geometry<f64>> {
        coords
            .iter()
            .map(|&(x, y)| Geometry::Point(Point::new(x, y)))
            .collect()
    }

    fn coord_of(geometry: &Geometry<f64>) -> (f64, f64) {
        match geometry {
            Geometry::Point(p) => (p.x(), p.y()),
            other => panic!("expected point, got {other:?}"),
        }
    }

    #[test]
    fn wgs84_input_passes_through_unchanged() {
        let input = points(&[(10.5, 59.9)]);
        let out = normalize_to_wgs84(input, Some(&Crs::wgs84()), "test").unwrap();
        assert_eq!(coord_of(&out[0]), (10.5, 59.9));
    }

    #[test]
    fn undeclared_crs_is_assumed_wgs84() {
        let input = points(&[(-70.0, 42.0)]);
        let out = normalize_to_wgs84(input, None, "test").unwrap();
        assert_eq!(coord_of(&out[0]), (-70.0, 42.0));
    }

    #[test]
    fn web_mercator_reprojects_into_wgs84_bounds() {
        // (0, 0) and a point near Boston, in EPSG:3857 meters.
        let input = points(&[(0.0, 0.0), (-7910240.0, 5215074.0)]);
        let crs = Crs("EPSG:3857".to_string());
        let out = normalize_to_wgs84(input, Some(&crs), "test").unwrap();

        let (x0, y0) = coord_of(&out[0]);
        assert!(x0.abs() < 1e-9 && y0.abs() < 1e-9);
        for geometry in &out {
            let (x, y) = coord_of(geometry);
            assert!((-180.0..=180.0).contains(&x), "lon out of range: {x}");
            assert!((-90.0..=90.0).contains(&y), "lat out of range: {y}");
        }
    }
}
