//! Coordinate arrays per grid definition, computed once and shared.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ndarray::Array2;
use nwp_common::{normalize_longitude, GridCoordinates, GridDefinition, GridProjection};
use rayon::prelude::*;
use tracing::debug;

use crate::error::{ProjectionError, ProjectionResult};
use crate::rotated::RotatedPole;

/// Computes true latitude/longitude arrays for grids and caches them by
/// definition, so every caller asking for the same grid shares one `Arc`.
#[derive(Debug, Default)]
pub struct GridProjector {
    cache: Mutex<HashMap<GridDefinition, Arc<GridCoordinates>>>,
}

impl GridProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coordinates of every cell of `grid`, shape (nj, ni).
    pub fn project(&self, grid: &GridDefinition) -> ProjectionResult<Arc<GridCoordinates>> {
        if let Some(coordinates) = self.lock().get(grid) {
            return Ok(Arc::clone(coordinates));
        }

        // Computed outside the lock; a concurrent caller for the same grid
        // produces identical arrays and the first insert is kept.
        let computed = Arc::new(compute_coordinates(grid)?);
        let mut cache = self.lock();
        let coordinates = cache.entry(grid.clone()).or_insert(computed);
        Ok(Arc::clone(coordinates))
    }

    /// Number of distinct grids projected so far.
    pub fn cached_grids(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<GridDefinition, Arc<GridCoordinates>>> {
        // The map is only ever inserted into, so a poisoned lock still
        // holds consistent entries
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Compute coordinates without caching.
pub fn compute_coordinates(grid: &GridDefinition) -> ProjectionResult<GridCoordinates> {
    let rotation = match &grid.projection {
        GridProjection::LatLon => None,
        GridProjection::RotatedLatLon { .. } => RotatedPole::from_projection(&grid.projection),
        GridProjection::Unsupported { template } => {
            return Err(ProjectionError::UnsupportedProjection {
                template: *template,
            })
        }
    };
    let (nj, ni) = grid.shape();
    if ni == 0 || nj == 0 {
        return Err(ProjectionError::InvalidGrid(format!(
            "grid has {} columns and {} rows",
            ni, nj
        )));
    }

    let native_latitudes: Vec<f64> = (0..nj).map(|j| grid.native_latitude(j)).collect();
    let native_longitudes: Vec<f64> = (0..ni).map(|i| grid.native_longitude(i)).collect();

    let mut points = vec![(0.0, 0.0); ni * nj];
    points
        .par_chunks_mut(ni)
        .enumerate()
        .for_each(|(j, row)| {
            let lat = native_latitudes[j];
            for (point, lon) in row.iter_mut().zip(&native_longitudes) {
                *point = match &rotation {
                    Some(pole) => pole.unrotate(lat, *lon),
                    None => (lat, normalize_longitude(*lon)),
                };
            }
        });

    let (latitudes, longitudes): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
    let shape_error = |e: ndarray::ShapeError| ProjectionError::InvalidGrid(e.to_string());
    let latitude = Array2::from_shape_vec((nj, ni), latitudes).map_err(shape_error)?;
    let longitude = Array2::from_shape_vec((nj, ni), longitudes).map_err(shape_error)?;

    debug!(
        projection = grid.projection.short_name(),
        rows = nj,
        columns = ni,
        "Projected grid"
    );

    Ok(GridCoordinates {
        native_latitudes,
        native_longitudes,
        latitude,
        longitude,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nwp_common::ScanMode;

    fn latlon_grid() -> GridDefinition {
        GridDefinition {
            ni: 4,
            nj: 3,
            first_lat: 55_000_000,
            first_lon: 358_000_000,
            last_lat: 53_000_000,
            last_lon: 1_000_000,
            di: 1_000_000,
            dj: 1_000_000,
            scan_mode: ScanMode::standard(),
            projection: GridProjection::LatLon,
        }
    }

    #[test]
    fn test_latlon_grid_projects_to_itself() {
        let coords = compute_coordinates(&latlon_grid()).unwrap();
        assert_eq!(coords.shape(), (3, 4));
        assert_eq!(coords.latitude[[0, 0]], 55.0);
        assert_eq!(coords.latitude[[2, 3]], 53.0);
        // Longitudes wrap across the prime meridian
        assert_eq!(coords.longitude[[0, 0]], -2.0);
        assert_eq!(coords.longitude[[1, 3]], 1.0);
        assert_eq!(coords.native_longitudes[3], 361.0);
    }

    #[test]
    fn test_rotated_grid_is_unrotated() {
        let mut grid = latlon_grid();
        grid.first_lat = 0;
        grid.first_lon = 0;
        grid.scan_mode = ScanMode::from_grib_flag(0x40);
        grid.projection = GridProjection::RotatedLatLon {
            south_pole_lat: -40_000_000,
            south_pole_lon: 10_000_000,
            rotation_angle: 0,
        };
        let coords = compute_coordinates(&grid).unwrap();
        assert!((coords.latitude[[0, 0]] - 50.0).abs() < 1e-9);
        assert!((coords.longitude[[0, 0]] - 10.0).abs() < 1e-9);
        // Rows go north in rotated space
        assert!(coords.latitude[[2, 0]] > coords.latitude[[0, 0]]);
    }

    #[test]
    fn test_unsupported_grid_is_rejected() {
        let mut grid = latlon_grid();
        grid.projection = GridProjection::Unsupported { template: 30 };
        assert!(matches!(
            compute_coordinates(&grid),
            Err(ProjectionError::UnsupportedProjection { template: 30 })
        ));
    }

    #[test]
    fn test_cache_shares_coordinates() {
        let projector = GridProjector::new();
        let a = projector.project(&latlon_grid()).unwrap();
        let b = projector.project(&latlon_grid()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(projector.cached_grids(), 1);

        let mut other = latlon_grid();
        other.first_lat = 56_000_000;
        let c = projector.project(&other).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(projector.cached_grids(), 2);
    }
}
