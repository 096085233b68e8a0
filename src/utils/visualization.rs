//! Plotting of planning scenes with gnuplot
//!
//! A scene is the reference line, the road polygon, obstacle footprints and the
//! planned trajectories of one or more cycles.

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};

use crate::common::{DiscretizedTrajectory, PathPoint, Point2D, TrajectoryPoint};
use crate::geometry::Box2d;
use crate::obstacles::Obstacle;
use crate::planner::{RoadBoundaries, VehicleConfig};

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const RED: &str = "#FF0000";
    pub const BLUE: &str = "#0000FF";
    pub const ORANGE: &str = "#FFA500";
    pub const GRAY: &str = "#808080";

    pub const REFERENCE: &str = GRAY;
    pub const ROAD: &str = BLACK;
    pub const STATIC_OBSTACLE: &str = "#8B4513";
    pub const DYNAMIC_OBSTACLE: &str = ORANGE;
    pub const ENGINE_TRAJECTORY: &str = BLUE;
    pub const SMOOTHED_TRAJECTORY: &str = RED;
    pub const EGO: &str = "#35C788";
}

/// Style for line rendering
#[derive(Debug, Clone)]
pub struct PathStyle {
    pub color: String,
    pub line_width: f64,
    pub caption: String,
}

impl PathStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            line_width: 2.0,
            caption: caption.to_string(),
        }
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }
}

impl Default for PathStyle {
    fn default() -> Self {
        Self::new(colors::SMOOTHED_TRAJECTORY, "Trajectory")
    }
}

pub struct Visualizer {
    figure: Figure,
    title: String,
    x_label: String,
    y_label: String,
    x_range: Option<(f64, f64)>,
    y_range: Option<(f64, f64)>,
    aspect_ratio: Option<f64>,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            figure: Figure::new(),
            title: String::new(),
            x_label: "X [m]".to_string(),
            y_label: "Y [m]".to_string(),
            x_range: None,
            y_range: None,
            aspect_ratio: Some(1.0),
        }
    }

    /// Visualizer for quantities over time, without a fixed aspect ratio
    pub fn time_series(y_label: &str) -> Self {
        let mut vis = Self::new();
        vis.x_label = "t [s]".to_string();
        vis.y_label = y_label.to_string();
        vis.aspect_ratio = None;
        vis
    }

    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    pub fn set_x_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.x_range = Some((min, max));
        self
    }

    pub fn set_y_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.y_range = Some((min, max));
        self
    }

    fn lines(&mut self, x: &[f64], y: &[f64], style: &PathStyle) {
        self.figure.axes2d().lines(
            x,
            y,
            &[
                Caption(&style.caption),
                Color(&style.color),
                LineWidth(style.line_width),
            ],
        );
    }

    /// Closed outline; only the first outline of a kind carries a caption
    fn outline(&mut self, points: &[Point2D], color: &str, caption: Option<&str>) {
        if points.is_empty() {
            return;
        }
        let x: Vec<f64> = points.iter().chain(points.first()).map(|p| p.x).collect();
        let y: Vec<f64> = points.iter().chain(points.first()).map(|p| p.y).collect();
        let axes = self.figure.axes2d();
        match caption {
            Some(caption) => axes.lines(&x, &y, &[Caption(caption), Color(color), LineWidth(1.5)]),
            None => axes.lines(&x, &y, &[Color(color), LineWidth(1.5)]),
        };
    }

    pub fn plot_reference_line(&mut self, reference: &[PathPoint]) -> &mut Self {
        let x: Vec<f64> = reference.iter().map(|p| p.x).collect();
        let y: Vec<f64> = reference.iter().map(|p| p.y).collect();
        self.lines(&x, &y, &PathStyle::new(colors::REFERENCE, "Reference").with_line_width(1.0));
        self
    }

    pub fn plot_road(&mut self, road: &RoadBoundaries) -> &mut Self {
        self.outline(&road.to_polygon(), colors::ROAD, Some("Road"));
        self
    }

    /// Obstacle footprints at `relative_time`
    pub fn plot_obstacles(&mut self, obstacles: &[Obstacle], relative_time: f64) -> &mut Self {
        let mut static_captioned = false;
        let mut dynamic_captioned = false;
        for obstacle in obstacles.iter().filter(|o| !o.is_virtual) {
            let corners = obstacle.box_at_time(relative_time).corners();
            let (color, captioned, caption) = if obstacle.has_trajectory() {
                (colors::DYNAMIC_OBSTACLE, &mut dynamic_captioned, "Dynamic obstacle")
            } else {
                (colors::STATIC_OBSTACLE, &mut static_captioned, "Static obstacle")
            };
            let caption = if *captioned { None } else { Some(caption) };
            *captioned = true;
            self.outline(&corners, color, caption);
        }
        self
    }

    pub fn plot_trajectory(&mut self, trajectory: &DiscretizedTrajectory, style: &PathStyle) -> &mut Self {
        self.lines(&trajectory.x_coords(), &trajectory.y_coords(), style);
        self
    }

    /// Trajectory points as markers, e.g. the coarse engine samples
    pub fn plot_trajectory_points(&mut self, trajectory: &DiscretizedTrajectory, color: &str, caption: &str) -> &mut Self {
        self.figure.axes2d().points(
            &trajectory.x_coords(),
            &trajectory.y_coords(),
            &[Caption(caption), Color(color), PointSymbol('O'), PointSize(0.6)],
        );
        self
    }

    /// Ego footprint at a trajectory point
    pub fn plot_ego(&mut self, point: &TrajectoryPoint, vehicle: &VehicleConfig) -> &mut Self {
        let shift = vehicle.length / 2.0 - vehicle.back_edge_to_center;
        let center = point.position() + Point2D::from_heading(point.theta()) * shift;
        let footprint = Box2d::new(center, point.theta(), vehicle.length, vehicle.width);
        self.outline(&footprint.corners(), colors::EGO, Some("Ego"));
        self
    }

    /// Speed over relative time
    pub fn plot_speed_profile(&mut self, trajectory: &DiscretizedTrajectory, style: &PathStyle) -> &mut Self {
        let t: Vec<f64> = trajectory.iter().map(|p| p.relative_time).collect();
        let v: Vec<f64> = trajectory.iter().map(|p| p.v).collect();
        self.lines(&t, &v, style);
        self
    }

    pub fn show(&mut self) -> Result<(), String> {
        self.apply_settings();
        self.figure.show().map_err(|e| e.to_string()).map(|_| ())
    }

    pub fn save_png(&mut self, path: &str, width: u32, height: u32) -> Result<(), String> {
        self.apply_settings();
        self.figure.save_to_png(path, width, height).map_err(|e| e.to_string())
    }

    fn apply_settings(&mut self) {
        let axes = self.figure.axes2d();

        if !self.title.is_empty() {
            axes.set_title(&self.title, &[]);
        }
        axes.set_x_label(&self.x_label, &[]);
        axes.set_y_label(&self.y_label, &[]);

        if let Some((min, max)) = self.x_range {
            axes.set_x_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }
        if let Some((min, max)) = self.y_range {
            axes.set_y_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }
        if let Some(ratio) = self.aspect_ratio {
            axes.set_aspect_ratio(AutoOption::Fix(ratio));
        }
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visualizer_creation() {
        let vis = Visualizer::new();
        assert!(vis.aspect_ratio.is_some());
        let series = Visualizer::time_series("v [m/s]");
        assert!(series.aspect_ratio.is_none());
        assert_eq!(series.x_label, "t [s]");
    }

    #[test]
    fn test_path_style() {
        let style = PathStyle::new(colors::ENGINE_TRAJECTORY, "Engine").with_line_width(3.0);
        assert_eq!(style.line_width, 3.0);
        assert_eq!(style.color, colors::BLUE);
        assert_eq!(PathStyle::default().color, colors::SMOOTHED_TRAJECTORY);
    }
}
