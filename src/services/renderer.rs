//! Pure scene construction for the main surface and the zone preview
//!
//! `render` turns the sensor model into an ordered list of `DrawCommand`s in
//! pixel space. Painting them is the terminal backend's job; nothing here
//! touches the terminal.

use crate::domain::types::ZoneKind;
use crate::domain::zone::{Target, TargetTrail, Zone};
use crate::services::editor::Draft;
use crate::services::reconstructor::ZoneSet;
use crate::services::transform::{CoordinateTransform, Millimeters, Pixel, PixelRect};

/// Fill alpha of active detection zones
pub const DETECTION_ALPHA: f64 = 0.3;
/// Fill alpha of active exclusion zones
pub const EXCLUSION_ALPHA: f64 = 0.2;
/// Fill alpha of the draft, the trail and the preview zone
pub const OVERLAY_ALPHA: f64 = 0.25;
/// Target marker radius in pixels
pub const TARGET_RADIUS: f64 = 6.0;
pub const SENSOR_LABEL: &str = "LD2450";

/// Semantic color slot, resolved to a concrete color by the active theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorRole {
    Background,
    Border,
    Primary,
    Secondary,
    Error,
    Accent,
    Text,
    TextInverse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Fill the whole surface
    Clear { color: ColorRole },
    Line { from: Pixel, to: Pixel, color: ColorRole, dashed: bool },
    /// Closed, filled polygon
    Polygon { points: Vec<Pixel>, color: ColorRole },
    Rect { rect: PixelRect, color: ColorRole, fill_alpha: f64, dashed: bool },
    Circle { center: Pixel, radius: f64, color: ColorRole },
    Polyline { points: Vec<Pixel>, color: ColorRole, alpha: f64 },
    Text { at: Pixel, text: String, color: ColorRole },
}

/// Everything a main surface frame depends on
#[derive(Debug, Clone, Copy)]
pub struct Scene<'a> {
    pub zones: &'a ZoneSet,
    pub targets: &'a [Target],
    pub trail: &'a TargetTrail,
    pub draft: Option<Draft>,
    pub show_grid: bool,
    pub show_trail: bool,
}

/// Build the main surface frame
///
/// Layers, back to front: background, grid, sensor, detection zones,
/// exclusion zones, targets, trail, edit draft.
pub fn render(scene: &Scene<'_>, view: &CoordinateTransform) -> Vec<DrawCommand> {
    let mut out = vec![DrawCommand::Clear { color: ColorRole::Background }];

    if scene.show_grid {
        grid(view, &mut out);
    }
    sensor(view, 20.0, 15.0, 5.0, &mut out);
    out.push(DrawCommand::Text {
        at: Pixel { px: view.center_x(), py: view.center_y() + 40.0 },
        text: SENSOR_LABEL.to_string(),
        color: ColorRole::Text,
    });

    for zone in scene.zones.detection.values().filter(|z| z.active) {
        zone_rect(view, ZoneKind::Detection, zone, &mut out);
    }
    for zone in scene.zones.exclusion.values().filter(|z| z.active) {
        zone_rect(view, ZoneKind::Exclusion, zone, &mut out);
    }

    for target in scene.targets.iter().filter(|t| t.active) {
        let center = view.to_canvas(Millimeters { x: target.x, y: target.y });
        out.push(DrawCommand::Circle { center, radius: TARGET_RADIUS, color: ColorRole::Secondary });
        out.push(DrawCommand::Text {
            at: Pixel { px: center.px, py: center.py + 3.0 },
            text: target.id.to_string(),
            color: ColorRole::TextInverse,
        });
    }

    if scene.show_trail && scene.trail.len() >= 2 {
        let points =
            scene.trail.iter().map(|p| view.to_canvas(Millimeters { x: p.x, y: p.y })).collect();
        out.push(DrawCommand::Polyline { points, color: ColorRole::Secondary, alpha: OVERLAY_ALPHA });
    }

    if let Some(draft) = scene.draft {
        let z = draft.zone;
        out.push(DrawCommand::Rect {
            rect: view.rect(z.x1, z.y1, z.x2, z.y2),
            color: ColorRole::Accent,
            fill_alpha: OVERLAY_ALPHA,
            dashed: true,
        });
    }

    out
}

/// Small frame for the zone form: background, sensor and the draft rectangle
pub fn render_preview(draft: &Draft, view: &CoordinateTransform) -> Vec<DrawCommand> {
    let mut out = vec![DrawCommand::Clear { color: ColorRole::Background }];
    sensor(view, 10.0, 8.0, 0.0, &mut out);

    let z = draft.zone;
    out.push(DrawCommand::Rect {
        rect: view.rect(z.x1, z.y1, z.x2, z.y2),
        color: kind_color(draft.kind),
        fill_alpha: OVERLAY_ALPHA,
        dashed: false,
    });
    out
}

pub fn kind_color(kind: ZoneKind) -> ColorRole {
    match kind {
        ZoneKind::Detection => ColorRole::Primary,
        ZoneKind::Exclusion => ColorRole::Error,
    }
}

/// Dashed 1 m grid; vertical lines are aligned on the sensor axis
fn grid(view: &CoordinateTransform, out: &mut Vec<DrawCommand>) {
    let step = view.grid_step();
    if step <= 0.0 || !step.is_finite() {
        return;
    }
    let (width, height) = (view.width(), view.height());

    let mut x = view.center_x().rem_euclid(step);
    while x < width {
        out.push(DrawCommand::Line {
            from: Pixel { px: x, py: 0.0 },
            to: Pixel { px: x, py: height },
            color: ColorRole::Border,
            dashed: true,
        });
        x += step;
    }

    let mut y = 0.0;
    while y < height {
        out.push(DrawCommand::Line {
            from: Pixel { px: 0.0, py: y },
            to: Pixel { px: width, py: y },
            color: ColorRole::Border,
            dashed: true,
        });
        y += step;
    }
}

/// Triangle below the origin with its apex pointing down at the mounting edge
fn sensor(view: &CoordinateTransform, depth: f64, half_width: f64, inset: f64, out: &mut Vec<DrawCommand>) {
    let (cx, cy) = (view.center_x(), view.center_y());
    out.push(DrawCommand::Polygon {
        points: vec![
            Pixel { px: cx, py: cy + depth },
            Pixel { px: cx - half_width, py: cy + inset },
            Pixel { px: cx + half_width, py: cy + inset },
        ],
        color: ColorRole::Primary,
    });
}

fn zone_rect(view: &CoordinateTransform, kind: ZoneKind, zone: &Zone, out: &mut Vec<DrawCommand>) {
    let rect = view.rect(zone.x1, zone.y1, zone.x2, zone.y2);
    let color = kind_color(kind);
    let fill_alpha = match kind {
        ZoneKind::Detection => DETECTION_ALPHA,
        ZoneKind::Exclusion => EXCLUSION_ALPHA,
    };
    out.push(DrawCommand::Rect { rect, color, fill_alpha, dashed: false });
    out.push(DrawCommand::Text { at: rect.center(), text: format!("{} {}", kind.label(), zone.id), color });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::zone::TrailPoint;

    fn view() -> CoordinateTransform {
        CoordinateTransform::main_view(800.0, 600.0)
    }

    fn target(id: u8, x: f64, y: f64) -> Target {
        Target { id, x, y, speed: 0.0, distance: 0.0, angle: 0.0, active: true }
    }

    /// Discriminant of each command, for checking layer order
    fn layer(cmd: &DrawCommand) -> &'static str {
        match cmd {
            DrawCommand::Clear { .. } => "clear",
            DrawCommand::Line { .. } => "line",
            DrawCommand::Polygon { .. } => "polygon",
            DrawCommand::Rect { dashed: true, .. } => "draft",
            DrawCommand::Rect { color: ColorRole::Primary, .. } => "zone",
            DrawCommand::Rect { .. } => "exclusion",
            DrawCommand::Circle { .. } => "target",
            DrawCommand::Polyline { .. } => "trail",
            DrawCommand::Text { .. } => "text",
        }
    }

    #[test]
    fn test_empty_scene() {
        let zones = ZoneSet::default();
        let trail = TargetTrail::new();
        let scene =
            Scene { zones: &zones, targets: &[], trail: &trail, draft: None, show_grid: false, show_trail: true };

        let layers: Vec<_> = render(&scene, &view()).iter().map(layer).collect();
        assert_eq!(layers, vec!["clear", "polygon", "text"]);
    }

    #[test]
    fn test_layer_order() {
        let mut zones = ZoneSet::default();
        zones.detection.insert(1, Zone::new(1, -500.0, 500.0, 500.0, 1500.0));
        zones.exclusion.insert(1, Zone::new(1, 0.0, 0.0, 100.0, 100.0));
        let mut trail = TargetTrail::new();
        trail.push(TrailPoint { x: 0.0, y: 1000.0, timestamp_ms: 1 });
        trail.push(TrailPoint { x: 10.0, y: 1010.0, timestamp_ms: 2 });
        let targets = [target(1, 0.0, 1000.0)];
        let draft = Draft { kind: ZoneKind::Detection, zone: Zone::new(2, 0.0, 0.0, 1.0, 1.0) };

        let scene = Scene {
            zones: &zones,
            targets: &targets,
            trail: &trail,
            draft: Some(draft),
            show_grid: true,
            show_trail: true,
        };
        let layers: Vec<_> = render(&scene, &view())
            .iter()
            .map(layer)
            .filter(|l| *l != "line" && *l != "text")
            .collect();
        assert_eq!(layers, vec!["clear", "polygon", "zone", "exclusion", "target", "trail", "draft"]);
    }

    #[test]
    fn test_inactive_zones_skipped() {
        let mut zones = ZoneSet::default();
        zones.detection.insert(1, Zone::empty(1));
        zones.exclusion.insert(2, Zone::empty(2));
        let trail = TargetTrail::new();
        let scene =
            Scene { zones: &zones, targets: &[], trail: &trail, draft: None, show_grid: false, show_trail: false };

        assert!(!render(&scene, &view()).iter().any(|c| matches!(c, DrawCommand::Rect { .. })));
    }

    #[test]
    fn test_zone_geometry_and_label() {
        let mut zones = ZoneSet::default();
        zones.detection.insert(3, Zone::new(3, 1000.0, 2000.0, -1000.0, 0.0));
        let trail = TargetTrail::new();
        let scene =
            Scene { zones: &zones, targets: &[], trail: &trail, draft: None, show_grid: false, show_trail: false };

        let commands = render(&scene, &view());
        assert!(commands.contains(&DrawCommand::Rect {
            rect: PixelRect { x: 300.0, y: 350.0, width: 200.0, height: 200.0 },
            color: ColorRole::Primary,
            fill_alpha: DETECTION_ALPHA,
            dashed: false,
        }));
        assert!(commands.contains(&DrawCommand::Text {
            at: Pixel { px: 400.0, py: 450.0 },
            text: "Zone 3".to_string(),
            color: ColorRole::Primary,
        }));
    }

    #[test]
    fn test_trail_needs_two_samples_and_persistence() {
        let zones = ZoneSet::default();
        let mut trail = TargetTrail::new();
        trail.push(TrailPoint { x: 0.0, y: 0.0, timestamp_ms: 1 });

        let has_trail = |trail: &TargetTrail, show_trail: bool| {
            let scene = Scene { zones: &zones, targets: &[], trail, draft: None, show_grid: false, show_trail };
            render(&scene, &view()).iter().any(|c| matches!(c, DrawCommand::Polyline { .. }))
        };

        assert!(!has_trail(&trail, true));
        trail.push(TrailPoint { x: 1.0, y: 1.0, timestamp_ms: 2 });
        assert!(has_trail(&trail, true));
        assert!(!has_trail(&trail, false));
    }

    #[test]
    fn test_grid_spacing() {
        let zones = ZoneSet::default();
        let trail = TargetTrail::new();
        let scene =
            Scene { zones: &zones, targets: &[], trail: &trail, draft: None, show_grid: true, show_trail: false };

        let lines: Vec<_> = render(&scene, &view())
            .into_iter()
            .filter_map(|c| match c {
                DrawCommand::Line { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect();

        // 100 px step: verticals at 0, 100, ..., 700 and horizontals at 0, 100, ..., 500
        let vertical: Vec<_> = lines.iter().filter(|(a, b)| a.px == b.px).map(|(a, _)| a.px).collect();
        let horizontal: Vec<_> = lines.iter().filter(|(a, b)| a.py == b.py).map(|(a, _)| a.py).collect();
        assert_eq!(vertical, vec![0.0, 100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0]);
        assert_eq!(horizontal, vec![0.0, 100.0, 200.0, 300.0, 400.0, 500.0]);
    }

    #[test]
    fn test_preview_uses_kind_color() {
        let preview = CoordinateTransform::preview(300.0, 200.0);
        let draft = Draft { kind: ZoneKind::Exclusion, zone: Zone::new(1, -1000.0, 0.0, 1000.0, 2000.0) };

        let commands = render_preview(&draft, &preview);
        assert_eq!(
            commands.last(),
            Some(&DrawCommand::Rect {
                rect: PixelRect { x: 100.0, y: 80.0, width: 100.0, height: 100.0 },
                color: ColorRole::Error,
                fill_alpha: OVERLAY_ALPHA,
                dashed: false,
            })
        );
    }
}
