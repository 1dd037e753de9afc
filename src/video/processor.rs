use crate::core::VideoError;
use image::RgbaImage;
use std::path::Path;
use std::process::{Command, Output};

pub struct VideoProcessor;

impl VideoProcessor {
    /// Reads duration, frame rate and frame count of the first video stream.
    pub fn probe(file_path: &Path) -> Result<VideoInfo, VideoError> {
        if !file_path.is_file() {
            return Err(VideoError::Missing(file_path.to_path_buf()));
        }

        let mut cmd = Command::new("ffprobe");
        cmd.arg("-v").arg("quiet")
            .arg("-print_format").arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg("-select_streams").arg("v:0")
            .arg(file_path);
        let output = run("ffprobe", &mut cmd, file_path)?;

        let json_str = String::from_utf8_lossy(&output.stdout);
        VideoInfo::from_ffprobe_json(file_path, &json_str)
    }

    /// Decodes one frame as RGBA, scaled down to `max_width` if it is wider.
    pub fn extract_frame(
        file_path: &Path,
        frame: u64,
        fps: f64,
        max_width: Option<u32>,
    ) -> Result<RgbaImage, VideoError> {
        if !file_path.is_file() {
            return Err(VideoError::Missing(file_path.to_path_buf()));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-v").arg("error")
            .arg("-ss").arg(format!("{:.6}", frame_seek_time(frame, fps)))
            .arg("-i").arg(file_path)
            .arg("-frames:v").arg("1");
        if let Some(width) = max_width {
            cmd.arg("-vf").arg(format!("scale='min({},iw)':-2", width));
        }
        cmd.arg("-f").arg("image2pipe")
            .arg("-vcodec").arg("png")
            .arg("-");
        let output = run("ffmpeg", &mut cmd, file_path)?;

        if output.stdout.is_empty() {
            return Err(VideoError::Decode {
                path: file_path.to_path_buf(),
                frame,
                reason: "no frame at this position".to_string(),
            });
        }

        image::load_from_memory(&output.stdout)
            .map(|img| img.to_rgba8())
            .map_err(|e| VideoError::Decode {
                path: file_path.to_path_buf(),
                frame,
                reason: e.to_string(),
            })
    }
}

fn run(tool: &'static str, cmd: &mut Command, file_path: &Path) -> Result<Output, VideoError> {
    let output = cmd.output().map_err(|source| VideoError::Spawn { tool, source })?;
    if !output.status.success() {
        return Err(VideoError::ToolFailed {
            tool,
            path: file_path.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub duration: f64,
    pub frame_rate: f64,
    pub frame_count: Option<u64>,
    pub width: u32,
    pub height: u32,
}

impl VideoInfo {
    pub fn from_ffprobe_json(file_path: &Path, json_str: &str) -> Result<Self, VideoError> {
        let probe_error = |reason: &str| VideoError::Probe {
            path: file_path.to_path_buf(),
            reason: reason.to_string(),
        };

        let info: serde_json::Value =
            serde_json::from_str(json_str).map_err(|e| probe_error(&e.to_string()))?;
        let stream = info["streams"]
            .as_array()
            .and_then(|streams| streams.iter().find(|s| s["codec_type"].as_str() == Some("video")))
            .ok_or_else(|| probe_error("no video stream"))?;

        let frame_rate = ["r_frame_rate", "avg_frame_rate"]
            .iter()
            .filter_map(|key| stream[*key].as_str().and_then(parse_frame_rate))
            .next()
            .ok_or_else(|| probe_error("no usable frame rate"))?;

        let duration = stream["duration"]
            .as_str()
            .or_else(|| info["format"]["duration"].as_str())
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(0.0);

        let frame_count = stream["nb_frames"]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .or_else(|| {
                let estimate = (duration * frame_rate).round();
                (estimate >= 1.0).then_some(estimate as u64)
            });

        Ok(VideoInfo {
            duration,
            frame_rate,
            frame_count,
            width: stream["width"].as_u64().unwrap_or(0) as u32,
            height: stream["height"].as_u64().unwrap_or(0) as u32,
        })
    }

    /// Index of the last decodable frame.
    pub fn last_frame(&self) -> u64 {
        self.frame_count.map(|n| n.saturating_sub(1)).unwrap_or(0)
    }
}

/// Parses ffprobe rates such as `30000/1001` or `25`.
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let rate = rate.trim();
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then(|| fps.clamp(1.0, 1000.0))
}

/// Seek target that lands on `frame` with ffmpeg's accurate seeking: half a
/// frame early, so timestamp rounding never skips to the next frame.
pub fn frame_seek_time(frame: u64, fps: f64) -> f64 {
    if fps <= 0.0 {
        return 0.0;
    }
    ((frame as f64 - 0.5) / fps).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE: &str = r#"{
        "streams": [{
            "codec_type": "video",
            "width": 1920,
            "height": 1080,
            "r_frame_rate": "30000/1001",
            "avg_frame_rate": "30000/1001",
            "duration": "10.010000",
            "nb_frames": "300"
        }],
        "format": { "duration": "10.050000" }
    }"#;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_probe_json() {
        let info = VideoInfo::from_ffprobe_json(Path::new("a.mp4"), PROBE).unwrap();
        assert_eq!(info.frame_count, Some(300));
        assert_eq!(info.last_frame(), 299);
        assert_eq!((info.width, info.height), (1920, 1080));
        assert!((info.duration - 10.01).abs() < 1e-9);
    }

    #[test]
    fn test_probe_estimates_missing_frame_count() {
        let json = r#"{
            "streams": [{ "codec_type": "video", "r_frame_rate": "0/0", "avg_frame_rate": "25/1" }],
            "format": { "duration": "4.0" }
        }"#;
        let info = VideoInfo::from_ffprobe_json(Path::new("a.avi"), json).unwrap();
        assert_eq!(info.frame_rate, 25.0);
        assert_eq!(info.frame_count, Some(100));
    }

    #[test]
    fn test_probe_without_video_stream_fails() {
        let json = r#"{ "streams": [{ "codec_type": "audio" }], "format": {} }"#;
        assert!(matches!(
            VideoInfo::from_ffprobe_json(Path::new("a.mkv"), json),
            Err(VideoError::Probe { .. })
        ));
    }

    #[test]
    fn test_frame_seek_time() {
        assert_eq!(frame_seek_time(0, 30.0), 0.0);
        assert!((frame_seek_time(60, 30.0) - 59.5 / 30.0).abs() < 1e-12);
        assert_eq!(frame_seek_time(10, 0.0), 0.0);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let missing = Path::new("/definitely/not/here.mp4");
        assert!(matches!(VideoProcessor::probe(missing), Err(VideoError::Missing(_))));
        assert!(matches!(
            VideoProcessor::extract_frame(missing, 0, 30.0, None),
            Err(VideoError::Missing(_))
        ));
    }
}
