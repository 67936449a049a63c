//! Worker endpoints and their request/response models

use crate::normalize::ServiceFailure;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Liveness endpoint polled during startup
pub const HEALTH: &str = "/health";
/// Grid generation
pub const GRID_BUILD: &str = "/grid/build";
/// Mission compilation
pub const MISSION_COMPILE: &str = "/mission/compile";
/// Boundary cache warm-up
pub const BOUNDARY_CACHE: &str = "/boundary/cache";

/// Default waypoint spacing used by the worker, in metres
pub const DEFAULT_STEP_METRES: f64 = 5.0;
/// Default grid cell size used by the worker, in metres
pub const DEFAULT_CELL_SIZE: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridBuildRequest {
    pub cell_size: f64,
}

impl GridBuildRequest {
    pub fn new(cell_size: f64) -> Self {
        Self { cell_size }
    }

    /// Reject requests the worker would refuse anyway
    pub fn validate(&self) -> Result<(), ServiceFailure> {
        if !is_positive(self.cell_size) {
            return Err(ServiceFailure::rejected_locally("Cell size must be positive"));
        }
        Ok(())
    }
}

impl Default for GridBuildRequest {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridFiles {
    pub grid_geojson: String,
    pub grid_centroids: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridOrigin {
    pub x: f64,
    pub y: f64,
}

/// Result of `POST /grid/build`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSummary {
    pub cell_size: f64,
    pub cells: u64,
    pub centroids: u64,
    /// `[min_x, min_y, max_x, max_y]`
    pub bounds: [f64; 4],
    /// GeoJSON feature of the grid lines
    pub grid_lines: JsonValue,
    /// GeoJSON of the boundary in WGS84
    pub boundary: JsonValue,
    pub files: GridFiles,
    pub origin: GridOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionCompileRequest {
    pub mission_text: String,
    pub step: f64,
    pub snap_to_grid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_cell_size: Option<f64>,
}

impl MissionCompileRequest {
    pub fn new(mission_text: impl Into<String>) -> Self {
        Self {
            mission_text: mission_text.into(),
            step: DEFAULT_STEP_METRES,
            snap_to_grid: false,
            grid_cell_size: None,
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    /// Snap waypoints to the centroids of a grid with the given cell size
    pub fn snapped_to_grid(mut self, grid_cell_size: f64) -> Self {
        self.snap_to_grid = true;
        self.grid_cell_size = Some(grid_cell_size);
        self
    }

    /// Reject requests the worker would refuse anyway
    pub fn validate(&self) -> Result<(), ServiceFailure> {
        if self.mission_text.trim().is_empty() {
            return Err(ServiceFailure::rejected_locally("mission_text is required"));
        }
        if !is_positive(self.step) {
            return Err(ServiceFailure::rejected_locally("Step must be positive"));
        }
        if let Some(cell_size) = self.grid_cell_size {
            if !is_positive(cell_size) {
                return Err(ServiceFailure::rejected_locally("Cell size must be positive"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionInfo {
    pub name: String,
    /// Absent until the mission sets a speed
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionTotals {
    pub distance_m: f64,
    pub step_m: f64,
    pub waypoints: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub seq: u64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub lat: f64,
    pub lon: f64,
    /// Mission source line that produced this waypoint
    #[serde(default)]
    pub line: Option<u32>,
    pub in_florida: bool,
    pub snapped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DwellEvent {
    /// Index into the waypoint list
    pub index: u64,
    /// Seconds
    pub duration: f64,
}

/// Result of `POST /mission/compile`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledMission {
    pub mission: MissionInfo,
    pub totals: MissionTotals,
    pub waypoints: Vec<Waypoint>,
    /// Export kind to written file path
    #[serde(default)]
    pub exports: BTreeMap<String, String>,
    #[serde(default)]
    pub dwell_events: Vec<DwellEvent>,
    #[serde(default)]
    pub surface_index: Option<u64>,
}

/// Result of `POST /boundary/cache`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryInfo {
    pub source: String,
    pub bounds: Vec<f64>,
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compile_request_validation() {
        assert!(MissionCompileRequest::new("MISSION demo\nWAYPOINT 27.9 -82.4 0")
            .validate()
            .is_ok());

        let err = MissionCompileRequest::new("   ").validate().unwrap_err();
        assert_eq!(err.message, "mission_text is required");

        let err = MissionCompileRequest::new("MISSION demo")
            .snapped_to_grid(0.0)
            .validate()
            .unwrap_err();
        assert_eq!(err.message, "Cell size must be positive");

        assert!(MissionCompileRequest::new("MISSION demo")
            .with_step(-1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_grid_request_validation() {
        assert!(GridBuildRequest::default().validate().is_ok());
        assert!(GridBuildRequest::new(0.0).validate().is_err());
        assert!(GridBuildRequest::new(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_compile_request_wire_shape() {
        let request = MissionCompileRequest::new("MISSION demo");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"mission_text": "MISSION demo", "step": 5.0, "snap_to_grid": false})
        );

        let value = serde_json::to_value(request.snapped_to_grid(250.0)).unwrap();
        assert_eq!(value["grid_cell_size"], json!(250.0));
        assert_eq!(value["snap_to_grid"], json!(true));
    }

    #[test]
    fn test_compiled_mission_parses() {
        let body = json!({
            "mission": {"name": "survey", "speed": 1.5},
            "totals": {"distance_m": 42.0, "step_m": 5.0, "waypoints": 2},
            "waypoints": [
                {"seq": 1, "x": 1.0, "y": 2.0, "z": 0.0, "lat": 27.9, "lon": -82.4,
                 "line": 2, "in_florida": true, "snapped": false},
                {"seq": 2, "x": 3.0, "y": 4.0, "z": -1.0, "lat": 27.91, "lon": -82.41,
                 "line": null, "in_florida": true, "snapped": true}
            ],
            "exports": {"mission_path": "/data/missions/survey_path.geojson"},
            "dwell_events": [{"index": 1, "duration": 30.0}],
            "surface_index": null
        });

        let mission: CompiledMission = serde_json::from_value(body).unwrap();
        assert_eq!(mission.mission.name, "survey");
        assert_eq!(mission.mission.speed, Some(1.5));
        assert_eq!(mission.waypoints.len(), 2);
        assert_eq!(mission.waypoints[1].line, None);
        assert_eq!(mission.dwell_events[0].duration, 30.0);
        assert!(mission.surface_index.is_none());
    }

    #[test]
    fn test_mission_without_speed_parses() {
        let body = json!({
            "mission": {"name": "survey", "speed": null},
            "totals": {"distance_m": 0.0, "step_m": 5.0, "waypoints": 0},
            "waypoints": [],
            "exports": {},
            "dwell_events": [],
            "surface_index": null
        });

        let mission: CompiledMission = serde_json::from_value(body).unwrap();
        assert_eq!(mission.mission.name, "survey");
        assert_eq!(mission.mission.speed, None);

        let info: MissionInfo = serde_json::from_value(json!({"name": "drift"})).unwrap();
        assert_eq!(info.speed, None);
    }

    #[test]
    fn test_grid_summary_parses() {
        let body = json!({
            "cell_size": 1000.0,
            "cells": 12,
            "centroids": 12,
            "bounds": [0.0, 1.0, 2.0, 3.0],
            "grid_lines": {"type": "Feature", "geometry": null, "properties": {"type": "grid"}},
            "boundary": {"type": "FeatureCollection", "features": []},
            "files": {"grid_geojson": "/data/grid_1000m.geojson", "grid_centroids": "/data/grid_1000m_centroids.csv"},
            "origin": {"x": 100.0, "y": 200.0}
        });

        let grid: GridSummary = serde_json::from_value(body).unwrap();
        assert_eq!(grid.cells, 12);
        assert_eq!(grid.origin, GridOrigin { x: 100.0, y: 200.0 });
    }
}
