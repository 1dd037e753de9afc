/// Scrub bar under the video: playhead, saved mark, click or drag to seek.
///
/// Returns the time the user clicked or dragged to, if any.
pub fn show_timeline(
    ui: &mut egui::Ui,
    current_time: f64,
    duration: f64,
    mark_time: Option<f64>,
) -> Option<f64> {
    let available_width = ui.available_width() - 20.0;
    let timeline_height = 50.0;

    let (rect, response) = ui.allocate_exact_size(
        egui::Vec2::new(available_width.max(100.0), timeline_height),
        egui::Sense::click_and_drag(),
    );

    let track_rect = egui::Rect::from_min_size(
        rect.min + egui::Vec2::new(10.0, 18.0),
        egui::Vec2::new(rect.width() - 20.0, 16.0),
    );

    if ui.is_rect_visible(rect) && duration > 0.0 {
        let painter = ui.painter();

        painter.rect_filled(rect, egui::Rounding::same(4.0), ui.visuals().extreme_bg_color);
        painter.rect_stroke(
            track_rect,
            egui::Rounding::same(2.0),
            egui::Stroke::new(1.0, ui.visuals().text_color()),
        );

        let marker_interval = calculate_marker_interval(duration / track_rect.width() as f64);
        for i in 0..((duration / marker_interval) as i32 + 1) {
            let time = i as f64 * marker_interval;
            let x = time_to_x(time, duration, track_rect.min.x, track_rect.width());
            painter.line_segment(
                [egui::Pos2::new(x, track_rect.min.y), egui::Pos2::new(x, track_rect.max.y)],
                egui::Stroke::new(0.5, ui.visuals().weak_text_color()),
            );
            painter.text(
                egui::Pos2::new(x, track_rect.min.y - 3.0),
                egui::Align2::CENTER_BOTTOM,
                format_time(time),
                egui::FontId::monospace(10.0),
                ui.visuals().weak_text_color(),
            );
        }

        if let Some(mark) = mark_time {
            let x = time_to_x(mark, duration, track_rect.min.x, track_rect.width());
            painter.line_segment(
                [egui::Pos2::new(x, track_rect.min.y - 2.0), egui::Pos2::new(x, track_rect.max.y + 2.0)],
                egui::Stroke::new(3.0, egui::Color32::from_rgb(80, 200, 120)),
            );
        }

        let current_x = time_to_x(current_time, duration, track_rect.min.x, track_rect.width());
        painter.line_segment(
            [egui::Pos2::new(current_x, track_rect.min.y - 4.0), egui::Pos2::new(current_x, track_rect.max.y + 4.0)],
            egui::Stroke::new(2.0, egui::Color32::RED),
        );

        painter.text(
            rect.max - egui::Vec2::new(10.0, 2.0),
            egui::Align2::RIGHT_BOTTOM,
            format!("{} / {}", format_time(current_time), format_time(duration)),
            egui::FontId::monospace(12.0),
            ui.visuals().text_color(),
        );
    }

    if response.clicked() || response.dragged() {
        response
            .interact_pointer_pos()
            .map(|pos| x_to_time(pos.x, duration, track_rect.min.x, track_rect.width()))
    } else {
        None
    }
}

pub fn time_to_x(time: f64, duration: f64, left: f32, width: f32) -> f32 {
    if duration <= 0.0 {
        return left;
    }
    left + ((time / duration).clamp(0.0, 1.0) * width as f64) as f32
}

pub fn x_to_time(x: f32, duration: f64, left: f32, width: f32) -> f64 {
    if width <= 0.0 {
        return 0.0;
    }
    (((x - left) / width) as f64).clamp(0.0, 1.0) * duration
}

/// Spacing between time labels, rounded to a readable interval.
pub fn calculate_marker_interval(time_per_pixel: f64) -> f64 {
    let target_pixel_spacing = 60.0;
    let base_interval = time_per_pixel * target_pixel_spacing;

    if base_interval <= 1.0 {
        1.0
    } else if base_interval <= 5.0 {
        5.0
    } else if base_interval <= 10.0 {
        10.0
    } else if base_interval <= 30.0 {
        30.0
    } else {
        60.0
    }
}

pub fn format_time(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let mins = (seconds / 60.0) as u32;
    let secs = seconds % 60.0;
    format!("{}:{:05.2}", mins, secs)
}
