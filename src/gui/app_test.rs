#[cfg(test)]
mod tests {

    use crate::core::Mark;
    use crate::gui::app::{mark_text, progress_text, trial_label};
    use crate::gui::timeline::{calculate_marker_interval, format_time, time_to_x, x_to_time};

    #[test]
    fn test_progress_text() {
        assert_eq!(progress_text(0, 10, 0), "Trial 1/10  (0 marked)");
        assert_eq!(progress_text(3, 10, 3), "Trial 4/10  (3 marked)");
        assert_eq!(progress_text(0, 0, 0), "No trials");
    }

    #[test]
    fn test_mark_text() {
        assert_eq!(mark_text(Some(Mark::Frame(60))), "frame 60");
        assert_eq!(mark_text(Some(Mark::NoFrame)), "no frame");
        assert_eq!(mark_text(None), "not marked");
    }

    #[test]
    fn test_trial_label_hides_path_in_blind_mode() {
        let blind = trial_label(2, "349/hab/a.mp4", true, None);
        assert!(!blind.contains("349"));
        assert!(blind.ends_with("Trial 3"));

        let open = trial_label(2, "349/hab/a.mp4", false, Some(Mark::Frame(4)));
        assert!(open.contains("349/hab/a.mp4"));
        assert!(open.starts_with('✔'));
    }

    #[test]
    fn test_timeline_position_mapping() {
        assert_eq!(time_to_x(5.0, 10.0, 100.0, 200.0), 200.0);
        assert_eq!(time_to_x(20.0, 10.0, 100.0, 200.0), 300.0);
        assert_eq!(time_to_x(1.0, 0.0, 100.0, 200.0), 100.0);
        assert_eq!(x_to_time(200.0, 10.0, 100.0, 200.0), 5.0);
        assert_eq!(x_to_time(50.0, 10.0, 100.0, 200.0), 0.0);
        assert_eq!(x_to_time(400.0, 10.0, 100.0, 200.0), 10.0);
    }

    #[test]
    fn test_timeline_labels() {
        assert_eq!(calculate_marker_interval(0.01), 1.0);
        assert_eq!(calculate_marker_interval(0.05), 5.0);
        assert_eq!(calculate_marker_interval(10.0), 60.0);
        assert_eq!(format_time(0.0), "0:00.00");
        assert_eq!(format_time(65.5), "1:05.50");
        assert_eq!(format_time(-3.0), "0:00.00");
    }
}
