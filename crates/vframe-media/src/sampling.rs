//! Uniform frame subsampling.

use vframe_models::{FrameNumber, Support};

/// Frame numbers that uniformly sample a video at a target rate.
///
/// The sampled range is `support` if given, else `[1, total_frame_count]`.
/// The output rate is `fps` (or the input rate), capped at `max_fps`.
///
/// Returns `None` when every frame of the video should be used: the frame
/// count is unknown without a support window, the frame rate is unknown
/// without a support window, or the output rate would not be below the input
/// rate without a support window. In the same cases with a support window the
/// whole window is returned instead.
pub fn sample_frames_uniform(
    frame_rate: Option<f64>,
    total_frame_count: Option<u64>,
    support: Option<Support>,
    fps: Option<f64>,
    max_fps: Option<f64>,
) -> Option<Vec<FrameNumber>> {
    let (first, last) = match (support, total_frame_count) {
        (Some(support), _) => (support.first(), support.last()),
        (None, Some(total)) => (1, u32::try_from(total).unwrap_or(u32::MAX)),
        (None, None) => return None,
    };

    let Some(ifps) = frame_rate.filter(|r| *r > 0.0) else {
        return support.map(|s| s.frame_numbers());
    };

    if last < first {
        return Some(Vec::new());
    }

    let mut ofps = fps.unwrap_or(ifps);
    if let Some(max_fps) = max_fps {
        ofps = ofps.min(max_fps);
    }

    if ofps >= ifps {
        return support.map(|s| s.frame_numbers());
    }

    let beta = ifps / ofps;
    let mut frames = vec![first];
    let mut x = first as f64;
    let mut fn_last = first;

    while x <= last as f64 {
        x += beta;
        let fnum = x.round_ties_even();
        if fnum > fn_last as f64 && fnum <= last as f64 {
            fn_last = fnum as FrameNumber;
            frames.push(fn_last);
        }
    }

    Some(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downsample_full_video() {
        let frames = sample_frames_uniform(Some(10.0), Some(100), None, Some(2.0), None).unwrap();
        assert_eq!(frames.len(), 20);
        assert_eq!(frames[0], 1);
        assert_eq!(frames[1], 6);
        assert_eq!(frames[19], 96);
    }

    #[test]
    fn test_max_fps_caps_rate() {
        let frames = sample_frames_uniform(Some(30.0), Some(90), None, None, Some(10.0)).unwrap();
        assert_eq!(frames, (0..30).map(|i| 1 + 3 * i).collect::<Vec<_>>());
    }

    #[test]
    fn test_rate_not_below_input_means_all() {
        assert_eq!(sample_frames_uniform(Some(10.0), Some(100), None, Some(30.0), None), None);
        assert_eq!(
            sample_frames_uniform(Some(10.0), Some(100), Some(Support::new(5, 8)), Some(30.0), None),
            Some(vec![5, 6, 7, 8])
        );
    }

    #[test]
    fn test_unknown_inputs() {
        assert_eq!(sample_frames_uniform(Some(10.0), None, None, Some(2.0), None), None);
        assert_eq!(sample_frames_uniform(None, Some(100), None, Some(2.0), None), None);
        assert_eq!(
            sample_frames_uniform(None, None, Some(Support::new(3, 5)), Some(2.0), None),
            Some(vec![3, 4, 5])
        );
    }

    #[test]
    fn test_support_window() {
        let frames =
            sample_frames_uniform(Some(10.0), Some(100), Some(Support::new(11, 30)), Some(5.0), None).unwrap();
        assert_eq!(frames, vec![11, 13, 15, 17, 19, 21, 23, 25, 27, 29]);
    }

    #[test]
    fn test_empty_window() {
        assert_eq!(
            sample_frames_uniform(Some(10.0), Some(100), Some(Support::new(9, 3)), Some(2.0), None),
            Some(vec![])
        );
    }
}
