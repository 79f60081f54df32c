//! Shade field estimation from static obstruction footprints.
//!
//! Footprints are projected once into a local metric plane and indexed by
//! centroid. Each route segment is sampled at a fixed spacing; from every
//! sample a ray is marched along the ground toward the sun azimuth, and the
//! sample is shaded when an obstruction at the ray's ground point is taller
//! than the ray at that distance.

use std::sync::atomic::{AtomicBool, Ordering};

use geo::{BoundingRect, Centroid, Contains};
use geo_types::{Coord, LineString, Point, Polygon, Rect};
use kdtree::KdTree;
use kdtree::distance::squared_euclidean;

use crate::{
    config::ShadeConfig,
    dataset::{Coverage, ObstructionFile, ObstructionKind, ObstructionRecord},
    models::{Coordinate, ShadedSegment, SunPosition},
    routing::{LocalProjection, haversine_m, midpoint},
};

const MIN_SAMPLE_SPACING_M: f64 = 0.5;
const MIN_RAY_STEP_M: f64 = 0.1;

#[derive(Debug, Clone)]
struct Obstruction {
    footprint: Polygon<f64>,
    bounds: Rect<f64>,
    height_m: f64,
    opacity: f64,
}

impl Obstruction {
    fn blocks(&self, ground: Point<f64>, ray_height_m: f64) -> bool {
        self.height_m > ray_height_m
            && ground.x() >= self.bounds.min().x
            && ground.x() <= self.bounds.max().x
            && ground.y() >= self.bounds.min().y
            && ground.y() <= self.bounds.max().y
            && self.footprint.contains(&ground)
    }
}

pub struct ObstructionLayer {
    config: ShadeConfig,
    projection: LocalProjection,
    obstructions: Vec<Obstruction>,
    /// Footprint centroids in projected metres.
    index: KdTree<f64, usize, [f64; 2]>,
    coverage: Option<Coverage>,
    max_height_m: f64,
    /// Largest centroid-to-vertex distance over all footprints.
    max_radius_m: f64,
}

impl ObstructionLayer {
    pub fn new(file: &ObstructionFile, config: ShadeConfig) -> Self {
        let projection = LocalProjection::centred_on(
            file.obstructions
                .iter()
                .flat_map(|o| o.footprint.iter())
                .map(|&[lng, lat]| Coordinate { lat, lng }),
        );

        let mut obstructions = Vec::with_capacity(file.obstructions.len());
        let mut index = KdTree::new(2);
        let mut max_height_m: f64 = 0.0;
        let mut max_radius_m: f64 = 0.0;

        for record in &file.obstructions {
            let Some((obstruction, centroid, radius)) = project_record(record, &projection, &config)
            else {
                tracing::warn!("skipping degenerate {:?} footprint", record.kind);
                continue;
            };
            if index.add(centroid, obstructions.len()).is_err() {
                continue;
            }
            max_height_m = max_height_m.max(obstruction.height_m);
            max_radius_m = max_radius_m.max(radius);
            obstructions.push(obstruction);
        }

        tracing::debug!(
            "obstruction layer ready: {} footprints, tallest {:.1}m",
            obstructions.len(),
            max_height_m
        );

        Self {
            config,
            projection,
            obstructions,
            index,
            coverage: file.coverage,
            max_height_m,
            max_radius_m,
        }
    }

    pub fn len(&self) -> usize {
        self.obstructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstructions.is_empty()
    }

    /// Shade every consecutive pair of `points` under `sun`.
    pub fn estimate(&self, points: &[Coordinate], sun: SunPosition) -> Vec<ShadedSegment> {
        points
            .windows(2)
            .map(|pair| self.shade_segment(pair[0], pair[1], sun))
            .collect()
    }

    /// Like [`estimate`](Self::estimate), but gives up with `None` as soon as
    /// `cancel` is raised. The flag is checked before each segment.
    pub fn estimate_cancellable(
        &self,
        points: &[Coordinate],
        sun: SunPosition,
        cancel: &AtomicBool,
    ) -> Option<Vec<ShadedSegment>> {
        points
            .windows(2)
            .map(|pair| {
                if cancel.load(Ordering::Relaxed) {
                    None
                } else {
                    Some(self.shade_segment(pair[0], pair[1], sun))
                }
            })
            .collect()
    }

    fn shade_segment(&self, from: Coordinate, to: Coordinate, sun: SunPosition) -> ShadedSegment {
        let length_m = haversine_m(from, to);
        ShadedSegment {
            from,
            to,
            length_m,
            shade_fraction: self.segment_fraction(from, to, length_m, sun),
        }
    }

    fn segment_fraction(
        &self,
        from: Coordinate,
        to: Coordinate,
        length_m: f64,
        sun: SunPosition,
    ) -> f64 {
        // No direct sun: everything is in shade.
        if !sun.is_up() {
            return 1.0;
        }

        let centre = midpoint(from, to);
        let covered = self
            .coverage
            .map_or(true, |c| c.contains(centre.lat, centre.lng));
        if !covered {
            return self.config.baseline_shade;
        }

        let tan_altitude = sun.altitude_deg.to_radians().tan();
        let reach_m = (self.max_height_m / tan_altitude).min(self.config.max_shadow_reach_m);

        let nearby = self.nearby(
            self.projection.project(centre),
            length_m / 2.0 + reach_m + self.max_radius_m,
        );
        if nearby.is_empty() {
            return self.config.baseline_shade;
        }

        let a = self.projection.project(from);
        let b = self.projection.project(to);
        let azimuth = sun.azimuth_deg.to_radians();
        let direction = [azimuth.sin(), azimuth.cos()];

        let spacing = self.config.sample_spacing_m.max(MIN_SAMPLE_SPACING_M);
        let samples = ((length_m / spacing).ceil() as usize).max(1);

        let total: f64 = (0..samples)
            .map(|i| {
                let t = (i as f64 + 0.5) / samples as f64;
                let origin = [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t];
                self.sample_shade(origin, direction, tan_altitude, reach_m, &nearby)
            })
            .sum();

        (total / samples as f64).clamp(0.0, 1.0)
    }

    /// March from `origin` toward the sun; opacity of the first blocker, else 0.
    fn sample_shade(
        &self,
        origin: [f64; 2],
        direction: [f64; 2],
        tan_altitude: f64,
        reach_m: f64,
        nearby: &[usize],
    ) -> f64 {
        let step = self.config.ray_step_m.max(MIN_RAY_STEP_M);
        let steps = (reach_m / step).floor() as usize;

        for k in 0..=steps {
            let distance = k as f64 * step;
            let ground = Point::new(
                origin[0] + direction[0] * distance,
                origin[1] + direction[1] * distance,
            );
            let ray_height_m = distance * tan_altitude;

            // Overlapping blockers at the same step: the densest one wins.
            let blocking = nearby
                .iter()
                .map(|&i| &self.obstructions[i])
                .filter(|o| o.blocks(ground, ray_height_m))
                .map(|o| o.opacity)
                .reduce(f64::max);
            if let Some(opacity) = blocking {
                return opacity;
            }
        }

        0.0
    }

    /// Obstruction indices whose centroid lies within `radius_m`, in load order.
    fn nearby(&self, point: [f64; 2], radius_m: f64) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .index
            .within(&point, radius_m * radius_m, &squared_euclidean)
            .map(|found| found.into_iter().map(|(_, &idx)| idx).collect())
            .unwrap_or_default();
        hits.sort_unstable();
        hits
    }
}

fn project_record(
    record: &ObstructionRecord,
    projection: &LocalProjection,
    config: &ShadeConfig,
) -> Option<(Obstruction, [f64; 2], f64)> {
    let ring: Vec<Coord<f64>> = record
        .footprint
        .iter()
        .map(|&[lng, lat]| {
            let [x, y] = projection.project(Coordinate { lat, lng });
            Coord { x, y }
        })
        .collect();
    let footprint = Polygon::new(LineString::from(ring), vec![]);

    let bounds = footprint.bounding_rect()?;
    let centroid = footprint.centroid()?;
    let radius = footprint
        .exterior()
        .coords()
        .map(|c| (c.x - centroid.x()).hypot(c.y - centroid.y()))
        .fold(0.0, f64::max);

    let opacity = record
        .opacity
        .unwrap_or(match record.kind {
            ObstructionKind::Building => 1.0,
            ObstructionKind::Canopy => config.canopy_opacity,
        })
        .clamp(0.0, 1.0);

    Some((
        Obstruction {
            footprint,
            bounds,
            height_m: record.height_m,
            opacity,
        },
        [centroid.x(), centroid.y()],
        radius,
    ))
}
